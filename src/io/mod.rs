//! The case IO boundary.
//!
//! Decoding, encoding and in-memory scene management belong to the host
//! environment. The controller only sees opaque handles through [`CaseIo`];
//! it decides which files are loaded and where masks are written, never what
//! is inside them.

mod fs;

pub use fs::{FsCaseIo, VolumeId};

use std::io;
use std::path::Path;

use crate::naming::FileRole;

/// Host adapter for loading and saving case volumes.
pub trait CaseIo {
    /// Host-side reference to a volume in memory.
    type Handle: Clone + std::fmt::Debug;

    /// Loads the file at `path` as `role`.
    ///
    /// Returns `Ok(None)` when the file does not exist, and an error when it
    /// exists but cannot be loaded.
    fn load(&mut self, path: &Path, role: &FileRole) -> io::Result<Option<Self::Handle>>;

    /// Creates an empty volume for a mask that has no file yet.
    fn create(&mut self, role: &FileRole) -> io::Result<Self::Handle>;

    /// Writes the volume behind `handle` to `path`.
    fn save(&mut self, handle: &Self::Handle, path: &Path) -> io::Result<()>;

    /// Drops the volume from memory. Called once per handle when a case closes.
    fn release(&mut self, handle: Self::Handle);
}
