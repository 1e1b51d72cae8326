//! The active case: what is loaded, where it came from, what changed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::CaseIterError;
use crate::naming::FileRole;
use crate::reader::ReaderContext;
use crate::table::CaseRecord;

/// Whether a file existed before the session or was created in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    PreExisting,
    NewlyCreated,
}

/// A volume held by the session.
#[derive(Clone, Debug)]
pub struct LoadedFile<H> {
    pub handle: H,
    /// Where the file was loaded from; `None` for created masks.
    pub source: Option<PathBuf>,
    pub provenance: Provenance,
    /// Edited since it was loaded or last persisted.
    pub modified: bool,
    /// Already written by an earlier, partially failed close attempt.
    pub persisted: bool,
}

impl<H> LoadedFile<H> {
    pub fn pre_existing(handle: H, source: impl Into<PathBuf>) -> Self {
        Self {
            handle,
            source: Some(source.into()),
            provenance: Provenance::PreExisting,
            modified: false,
            persisted: false,
        }
    }

    pub fn newly_created(handle: H) -> Self {
        Self {
            handle,
            source: None,
            provenance: Provenance::NewlyCreated,
            modified: false,
            persisted: false,
        }
    }
}

/// State of the case currently open in the controller.
#[derive(Debug)]
pub struct CaseSession<H> {
    record: CaseRecord,
    root: PathBuf,
    files: BTreeMap<FileRole, LoadedFile<H>>,
}

impl<H> CaseSession<H> {
    pub fn new(record: CaseRecord, root: impl Into<PathBuf>) -> Self {
        Self {
            record,
            root: root.into(),
            files: BTreeMap::new(),
        }
    }

    pub fn record(&self) -> &CaseRecord {
        &self.record
    }

    /// The case folder.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> usize {
        self.record.index
    }

    pub fn insert(&mut self, role: FileRole, file: LoadedFile<H>) {
        self.files.insert(role, file);
    }

    pub fn contains(&self, role: &FileRole) -> bool {
        self.files.contains_key(role)
    }

    pub fn file(&self, role: &FileRole) -> Option<&LoadedFile<H>> {
        self.files.get(role)
    }

    /// All files in role order.
    pub fn files(&self) -> impl Iterator<Item = (&FileRole, &LoadedFile<H>)> {
        self.files.iter()
    }

    /// Loaded and created masks, in role order.
    pub fn masks(&self) -> impl Iterator<Item = (&FileRole, &LoadedFile<H>)> {
        self.files.iter().filter(|(role, _)| role.is_mask())
    }

    /// Records an edit of `role`.
    pub fn mark_modified(&mut self, role: &FileRole) -> Result<(), CaseIterError> {
        let file = self
            .files
            .get_mut(role)
            .ok_or_else(|| CaseIterError::UnknownRole { role: role.clone() })?;
        file.modified = true;
        file.persisted = false;
        Ok(())
    }

    pub(crate) fn mark_persisted(&mut self, role: &FileRole) {
        if let Some(file) = self.files.get_mut(role) {
            file.persisted = true;
            file.modified = false;
        }
    }

    /// Returns true if any file has edits that were not written.
    pub fn is_dirty(&self) -> bool {
        self.files.values().any(|f| f.modified && !f.persisted)
    }

    /// Masks that closing the case should write, given the reader's flags.
    ///
    /// Pre-existing masks are written when `save_loaded_masks` is set, new
    /// ones when `save_new_masks` is set and the annotator actually drew on
    /// them; an untouched placeholder is empty. Masks already written by an
    /// earlier attempt are left out.
    pub fn pending_saves(&self, reader: &ReaderContext) -> Vec<FileRole> {
        if !reader.saves_anything() {
            return Vec::new();
        }

        self.masks()
            .filter(|(_, file)| !file.persisted)
            .filter(|(_, file)| match file.provenance {
                Provenance::PreExisting => reader.save_loaded_masks,
                Provenance::NewlyCreated => reader.save_new_masks && file.modified,
            })
            .map(|(role, _)| role.clone())
            .collect()
    }

    /// Modified files that closing the case will not write.
    pub fn unsaved_edits(&self, reader: &ReaderContext) -> Vec<FileRole> {
        let pending = self.pending_saves(reader);
        self.files
            .iter()
            .filter(|(role, file)| file.modified && !file.persisted && !pending.contains(role))
            .map(|(role, _)| role.clone())
            .collect()
    }

    /// Consumes the session, yielding every handle for release.
    pub fn into_handles(self) -> Vec<H> {
        self.files.into_values().map(|f| f.handle).collect()
    }
}
