//! Filesystem-backed case IO.
//!
//! Stands in for a host application when caseiter runs on its own: volumes
//! are tracked as files on disk and annotation happens in an external
//! editor. The editor's output is tied to a handle with [`FsCaseIo::attach`];
//! saving copies whatever file currently backs the handle.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::CaseIo;
use crate::naming::FileRole;

/// Identifier of a volume tracked by [`FsCaseIo`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VolumeId(u64);

impl VolumeId {
    /// Returns the underlying u64 value.
    #[inline]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VolumeId({})", self.0)
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct FsVolume {
    role: FileRole,
    content: Option<PathBuf>,
}

/// A [`CaseIo`] whose volumes are plain files.
#[derive(Debug, Default)]
pub struct FsCaseIo {
    next_id: u64,
    volumes: HashMap<VolumeId, FsVolume>,
}

impl FsCaseIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backs `id` with `path`, typically a file written by an external editor.
    pub fn attach(&mut self, id: VolumeId, path: &Path) -> io::Result<()> {
        if !path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a file", path.display()),
            ));
        }
        let volume = self.volumes.get_mut(&id).ok_or_else(|| unknown_volume(id))?;
        volume.content = Some(path.to_path_buf());
        Ok(())
    }

    /// The file currently backing `id`, if any.
    pub fn content(&self, id: VolumeId) -> Option<&Path> {
        self.volumes.get(&id).and_then(|v| v.content.as_deref())
    }

    /// The role `id` was loaded or created for.
    pub fn role(&self, id: VolumeId) -> Option<&FileRole> {
        self.volumes.get(&id).map(|v| &v.role)
    }

    /// Number of volumes currently held.
    pub fn live_volumes(&self) -> usize {
        self.volumes.len()
    }

    fn insert(&mut self, role: &FileRole, content: Option<PathBuf>) -> VolumeId {
        self.next_id += 1;
        let id = VolumeId(self.next_id);
        self.volumes.insert(
            id,
            FsVolume {
                role: role.clone(),
                content,
            },
        );
        id
    }
}

impl CaseIo for FsCaseIo {
    type Handle = VolumeId;

    fn load(&mut self, path: &Path, role: &FileRole) -> io::Result<Option<VolumeId>> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Ok(Some(self.insert(role, Some(path.to_path_buf())))),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&mut self, role: &FileRole) -> io::Result<VolumeId> {
        Ok(self.insert(role, None))
    }

    fn save(&mut self, handle: &VolumeId, path: &Path) -> io::Result<()> {
        let volume = self.volumes.get(handle).ok_or_else(|| unknown_volume(*handle))?;
        let source = volume.content.as_deref().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} volume {} has no content", volume.role, handle),
            )
        })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Copying a file onto itself would truncate it.
        if path.exists() && fs::canonicalize(source)? == fs::canonicalize(path)? {
            return Ok(());
        }

        fs::copy(source, path)?;
        Ok(())
    }

    fn release(&mut self, handle: VolumeId) {
        self.volumes.remove(&handle);
    }
}

fn unknown_volume(id: VolumeId) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("unknown volume {}", id))
}
