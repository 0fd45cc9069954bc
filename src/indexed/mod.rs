//! Hierarchical key/value storage backing scene containers.
//!
//! An [`IndexedIo`] is a tree of named directories holding named data
//! entries, addressed by [`Path`](crate::core::Path). Two backends exist:
//! - [`MemoryIndexedIo`] - in-process tree, used directly for scratch scenes
//! - [`FileIndexedIo`] - the same tree persisted as one compressed file,
//!   replaced atomically on flush

mod codec;
mod compression;
mod file;
mod format;
mod memory;
mod tree;

use bitflags::bitflags;

use crate::core::Value;
use crate::util::{Error, Name, Result};

pub use codec::{decode_tree, encode_tree};
pub use compression::{compress, decompress};
pub use file::FileIndexedIo;
pub use format::{ContainerHeader, CURRENT_VERSION, HEADER_SIZE, MAGIC};
pub use memory::MemoryIndexedIo;
pub use tree::{Directory, Entry};

bitflags! {
    /// Container open mode.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct OpenMode: u8 {
        const READ = 1;
        const WRITE = 2;
        const APPEND = 4;
        const SHARED = 8;
        const EXCLUSIVE = 16;
    }
}

impl OpenMode {
    /// Exactly one of READ, WRITE and APPEND, and not both SHARED and EXCLUSIVE.
    pub fn validate(self) -> Result<()> {
        let access = self & (Self::READ | Self::WRITE | Self::APPEND);
        if access.bits().count_ones() != 1 {
            return Err(Error::invalid_arg(format!(
                "open mode {self:?} must contain exactly one of READ, WRITE, APPEND"
            )));
        }
        if self.contains(Self::SHARED | Self::EXCLUSIVE) {
            return Err(Error::invalid_arg(format!(
                "open mode {self:?} cannot be both SHARED and EXCLUSIVE"
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_writable(self) -> bool {
        self.intersects(Self::WRITE | Self::APPEND)
    }

    /// The READ / WRITE / APPEND part of the mode.
    #[inline]
    pub fn access(self) -> Self {
        self & (Self::READ | Self::WRITE | Self::APPEND)
    }
}

/// Kind of entry stored under a name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Data,
}

/// Hierarchical key/value store.
///
/// Paths are absolute within the store; the empty path is the top
/// directory. Writing data creates missing parent directories.
pub trait IndexedIo: Send + Sync {
    /// Name of the store (the file name for file-backed stores).
    fn file_name(&self) -> &str;

    fn open_mode(&self) -> OpenMode;

    /// Kind of the entry at `path`, if any.
    fn entry_kind(&self, path: &[Name]) -> Option<EntryKind>;

    fn has_entry(&self, path: &[Name]) -> bool {
        self.entry_kind(path).is_some()
    }

    /// Names in directory `dir` in insertion order, optionally filtered by kind.
    fn entry_ids(&self, dir: &[Name], kind: Option<EntryKind>) -> Result<Vec<Name>>;

    /// Read the data entry at `path`.
    fn read(&self, path: &[Name]) -> Result<Value>;

    /// Write (or replace) the data entry at `path`.
    fn write(&self, path: &[Name], value: Value) -> Result<()>;

    /// Create `path` and any missing parents. Existing directories are kept.
    fn create_directory(&self, path: &[Name]) -> Result<()>;

    /// Remove the entry at `path` with everything below it.
    fn remove(&self, path: &[Name]) -> Result<()>;

    /// Copy of the whole tree as it is now.
    fn copy_tree(&self) -> Result<Directory>;

    /// Persist pending changes.
    fn flush(&self) -> Result<()>;

    /// Flush and release the store. Later calls fail with `Closed`.
    fn close(&self) -> Result<()>;

    fn is_closed(&self) -> bool;
}
