#![allow(dead_code)]

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use caseiter::io::CaseIo;
use caseiter::{BatchTable, FileRole};

/// In-memory IO that loads whatever exists on disk and records every call.
#[derive(Debug, Default)]
pub struct MockIo {
    next: u32,
    pub live: BTreeSet<u32>,
    pub loads: Vec<(PathBuf, FileRole)>,
    pub creates: Vec<FileRole>,
    pub saves: Vec<(u32, PathBuf)>,
    pub released: Vec<u32>,
    pub unreadable: HashSet<PathBuf>,
    pub failing_saves: HashSet<PathBuf>,
}

impl MockIo {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> u32 {
        self.next += 1;
        self.live.insert(self.next);
        self.next
    }

    pub fn saved_paths(&self) -> Vec<PathBuf> {
        self.saves.iter().map(|(_, p)| p.clone()).collect()
    }
}

impl CaseIo for MockIo {
    type Handle = u32;

    fn load(&mut self, path: &Path, role: &FileRole) -> io::Result<Option<u32>> {
        self.loads.push((path.to_path_buf(), role.clone()));
        if self.unreadable.contains(path) {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "corrupt volume"));
        }
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(self.allocate()))
    }

    fn create(&mut self, role: &FileRole) -> io::Result<u32> {
        self.creates.push(role.clone());
        Ok(self.allocate())
    }

    fn save(&mut self, handle: &u32, path: &Path) -> io::Result<()> {
        if self.failing_saves.contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        self.saves.push((*handle, path.to_path_buf()));
        Ok(())
    }

    fn release(&mut self, handle: u32) {
        assert!(self.live.remove(&handle), "handle {} released twice", handle);
        self.released.push(handle);
    }
}

/// Creates one case folder per name with an image volume, and a table listing them.
pub fn write_cases(root: &Path, cases: &[&str]) -> BatchTable {
    let mut csv = String::from("path,patient\n");
    for (i, case) in cases.iter().enumerate() {
        write_file(&root.join(case).join("ct.nii.gz"), b"ct");
        csv.push_str(&format!("{},P{:03}\n", case, i + 1));
    }
    BatchTable::from_csv_str(&csv)
        .expect("valid table")
        .with_base_dir(root)
}

/// Writes `csv` to `root/batch.csv` and returns the path.
pub fn write_table(root: &Path, csv: &str) -> PathBuf {
    let path = root.join("batch.csv");
    write_file(&path, csv.as_bytes());
    path
}

pub fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bytes).expect("write file");
}
