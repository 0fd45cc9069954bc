//! In-memory store.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use super::tree::{Directory, Entry};
use super::{EntryKind, IndexedIo, OpenMode};
use crate::core::{path_to_string, Value};
use crate::util::{Error, Name, Result};

/// [`IndexedIo`] over a tree held in memory.
pub struct MemoryIndexedIo {
    name: String,
    mode: OpenMode,
    root: RwLock<Directory>,
    closed: AtomicBool,
    dirty: AtomicBool,
}

impl MemoryIndexedIo {
    /// Empty store.
    pub fn new(name: impl Into<String>, mode: OpenMode) -> Result<Self> {
        Self::with_tree(name, mode, Directory::new())
    }

    /// Store over an existing tree.
    pub fn with_tree(name: impl Into<String>, mode: OpenMode, root: Directory) -> Result<Self> {
        mode.validate()?;
        Ok(Self {
            name: name.into(),
            mode,
            root: RwLock::new(root),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        })
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Directory {
        self.root.read().clone()
    }

    /// Run `f` over the tree without copying it.
    pub fn with_root<R>(&self, f: impl FnOnce(&Directory) -> R) -> R {
        f(&self.root.read())
    }

    /// `true` if something was written since the last [`mark_clean`](Self::mark_clean).
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed(self.name.clone()));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if !self.mode.is_writable() {
            return Err(Error::ReadOnly(self.name.clone()));
        }
        Ok(())
    }
}

impl IndexedIo for MemoryIndexedIo {
    fn file_name(&self) -> &str {
        &self.name
    }

    fn open_mode(&self) -> OpenMode {
        self.mode
    }

    fn entry_kind(&self, path: &[Name]) -> Option<EntryKind> {
        if self.is_closed() {
            return None;
        }
        let root = self.root.read();
        if path.is_empty() {
            return Some(EntryKind::Directory);
        }
        root.lookup(path).map(Entry::kind)
    }

    fn entry_ids(&self, dir: &[Name], kind: Option<EntryKind>) -> Result<Vec<Name>> {
        self.check_open()?;
        let root = self.root.read();
        let Some(d) = root.dir(dir) else {
            return Err(Error::not_found(format!(
                "{}: no directory {}",
                self.name,
                path_to_string(dir)
            )));
        };
        Ok(d.iter()
            .filter(|(_, e)| kind.map_or(true, |k| e.kind() == k))
            .map(|(n, _)| n.clone())
            .collect())
    }

    fn read(&self, path: &[Name]) -> Result<Value> {
        self.check_open()?;
        match self.root.read().lookup(path) {
            Some(Entry::Data(v)) => Ok(v.clone()),
            Some(Entry::Dir(_)) => Err(Error::invalid_arg(format!(
                "{}: {} is a directory",
                self.name,
                path_to_string(path)
            ))),
            None => Err(Error::not_found(format!(
                "{}: no entry {}",
                self.name,
                path_to_string(path)
            ))),
        }
    }

    fn write(&self, path: &[Name], value: Value) -> Result<()> {
        self.check_writable()?;
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::invalid_arg("cannot write data at the top directory"));
        };
        let mut root = self.root.write();
        let dir = root.dir_mut_or_create(parents)?;
        if let Some(Entry::Dir(_)) = dir.get(last) {
            return Err(Error::invalid_arg(format!(
                "{}: {} is a directory",
                self.name,
                path_to_string(path)
            )));
        }
        dir.insert(last.clone(), Entry::Data(value));
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn create_directory(&self, path: &[Name]) -> Result<()> {
        self.check_writable()?;
        self.root.write().dir_mut_or_create(path)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn remove(&self, path: &[Name]) -> Result<()> {
        self.check_writable()?;
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::invalid_arg("cannot remove the top directory"));
        };
        let mut root = self.root.write();
        let removed = root.dir_mut(parents).and_then(|d| d.remove(last));
        if removed.is_none() {
            return Err(Error::not_found(format!(
                "{}: no entry {}",
                self.name,
                path_to_string(path)
            )));
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn copy_tree(&self) -> Result<Directory> {
        self.check_open()?;
        Ok(self.snapshot())
    }

    fn flush(&self) -> Result<()> {
        self.check_open()
    }

    fn close(&self) -> Result<()> {
        self.mark_closed();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::string_to_path;

    fn p(s: &str) -> Vec<Name> {
        string_to_path(s)
    }

    #[test]
    fn test_write_read() {
        let io = MemoryIndexedIo::new("mem", OpenMode::WRITE).expect("new");
        io.write(&p("/a/b/x"), Value::Int(7)).expect("write");
        assert_eq!(io.read(&p("/a/b/x")).expect("read"), Value::Int(7));
        assert_eq!(io.entry_kind(&p("/a")), Some(EntryKind::Directory));
        assert_eq!(io.entry_kind(&p("/a/b/x")), Some(EntryKind::Data));
        assert!(io.is_dirty());
    }

    #[test]
    fn test_entry_ids_filter() {
        let io = MemoryIndexedIo::new("mem", OpenMode::WRITE).expect("new");
        io.create_directory(&p("/d/sub")).expect("mkdir");
        io.write(&p("/d/data"), Value::Bool(true)).expect("write");
        let all = io.entry_ids(&p("/d"), None).expect("ids");
        assert_eq!(all.len(), 2);
        let dirs = io.entry_ids(&p("/d"), Some(EntryKind::Directory)).expect("ids");
        assert_eq!(dirs, vec![Name::new("sub")]);
        assert!(matches!(
            io.entry_ids(&p("/missing"), None),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn test_read_only() {
        let io = MemoryIndexedIo::new("mem", OpenMode::READ).expect("new");
        assert!(matches!(
            io.write(&p("/x"), Value::Int(1)),
            Err(Error::ReadOnly(_))
        ));
    }

    #[test]
    fn test_closed() {
        let io = MemoryIndexedIo::new("mem", OpenMode::WRITE).expect("new");
        io.close().expect("close");
        assert!(matches!(io.read(&p("/x")), Err(Error::Closed(_))));
        assert!(!io.has_entry(&p("/x")));
    }

    #[test]
    fn test_remove() {
        let io = MemoryIndexedIo::new("mem", OpenMode::WRITE).expect("new");
        io.write(&p("/a/x"), Value::Int(1)).expect("write");
        io.remove(&p("/a")).expect("remove");
        assert!(!io.has_entry(&p("/a/x")));
        assert!(io.remove(&p("/a")).is_err());
    }
}
