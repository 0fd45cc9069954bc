//! File-backed store.
//!
//! The whole tree is loaded on open and kept in a [`MemoryIndexedIo`].
//! Flushing encodes it, writes `<file>.tmp` and renames it over the target,
//! so readers never observe a partially written container.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path as FsPath, PathBuf};

use memmap2::Mmap;
use tracing::{debug, warn};

use super::codec::{decode_tree, encode_tree};
use super::compression::{compress, decompress};
use super::format::{ContainerHeader, HEADER_SIZE};
use super::memory::MemoryIndexedIo;
use super::tree::Directory;
use super::{EntryKind, IndexedIo, OpenMode};
use crate::config::CacheConfig;
use crate::core::Value;
use crate::util::{Error, Name, Result};

/// [`IndexedIo`] persisted to a single file.
pub struct FileIndexedIo {
    path: PathBuf,
    store: MemoryIndexedIo,
    compression_level: u32,
}

impl FileIndexedIo {
    /// Open `path`.
    ///
    /// - READ loads an existing file (memory-mapped when `config.use_mmap`)
    /// - WRITE starts empty and replaces the file on flush
    /// - APPEND loads the file if it exists, otherwise starts empty
    pub fn open(path: impl AsRef<FsPath>, mode: OpenMode, config: &CacheConfig) -> Result<Self> {
        mode.validate()?;
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy().into_owned();

        let tree = if mode.contains(OpenMode::READ) {
            load(&path, config.use_mmap)?
        } else if mode.contains(OpenMode::APPEND) && path.exists() {
            load(&path, config.use_mmap)?
        } else {
            Directory::new()
        };

        debug!(file = %name, ?mode, "opened container");
        let io = Self {
            path,
            store: MemoryIndexedIo::with_tree(name, mode, tree)?,
            compression_level: config.compression_level,
        };
        // A fresh WRITE container must produce a file even if nothing is written
        if mode.contains(OpenMode::WRITE) {
            io.store.create_directory(&[])?;
        }
        Ok(io)
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let body = self.store.with_root(encode_tree)?;
        let (payload, compressed) = match compress(&body, self.compression_level)? {
            Some(c) => (c, true),
            None => (body.clone(), false),
        };
        let header = ContainerHeader::new(compressed, body.len() as u64);

        let tmp = tmp_path(&self.path);
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&header.to_bytes())?;
            f.write_all(&payload)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.store.mark_clean();
        debug!(
            file = %self.path.display(),
            bytes = HEADER_SIZE + payload.len(),
            compressed,
            "container flushed"
        );
        Ok(())
    }
}

fn tmp_path(path: &FsPath) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".tmp");
    PathBuf::from(os)
}

fn load(path: &FsPath, use_mmap: bool) -> Result<Directory> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(format!("scene file {}", path.display()))
        } else {
            Error::Io(e)
        }
    })?;
    let size = file.metadata()?.len();
    if size < HEADER_SIZE as u64 {
        return Err(Error::corrupted(format!(
            "{}: file too short ({size} bytes)",
            path.display()
        )));
    }
    if use_mmap {
        // Safety: the file is only ever replaced by rename, never modified in place
        let mmap = unsafe { Mmap::map(&file) }?;
        parse(&mmap)
    } else {
        parse(&fs::read(path)?)
    }
}

fn parse(data: &[u8]) -> Result<Directory> {
    let header = ContainerHeader::parse(data)?;
    let payload = &data[HEADER_SIZE..];
    let expected = usize::try_from(header.body_len)
        .map_err(|_| Error::corrupted("body length does not fit in memory"))?;
    if header.compressed {
        decode_tree(&decompress(payload, expected)?)
    } else {
        if payload.len() != expected {
            return Err(Error::corrupted(format!(
                "body is {} bytes, header says {expected}",
                payload.len()
            )));
        }
        decode_tree(payload)
    }
}

impl IndexedIo for FileIndexedIo {
    fn file_name(&self) -> &str {
        self.store.file_name()
    }

    fn open_mode(&self) -> OpenMode {
        self.store.open_mode()
    }

    fn entry_kind(&self, path: &[Name]) -> Option<EntryKind> {
        self.store.entry_kind(path)
    }

    fn entry_ids(&self, dir: &[Name], kind: Option<EntryKind>) -> Result<Vec<Name>> {
        self.store.entry_ids(dir, kind)
    }

    fn read(&self, path: &[Name]) -> Result<Value> {
        self.store.read(path)
    }

    fn write(&self, path: &[Name], value: Value) -> Result<()> {
        self.store.write(path, value)
    }

    fn create_directory(&self, path: &[Name]) -> Result<()> {
        self.store.create_directory(path)
    }

    fn remove(&self, path: &[Name]) -> Result<()> {
        self.store.remove(path)
    }

    fn copy_tree(&self) -> Result<Directory> {
        self.store.copy_tree()
    }

    fn flush(&self) -> Result<()> {
        self.store.flush()?;
        if self.open_mode().is_writable() && self.store.is_dirty() {
            self.persist()?;
        }
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.store.is_closed() {
            return Ok(());
        }
        let flushed = self.flush();
        self.store.mark_closed();
        debug!(file = %self.path.display(), "container closed");
        flushed
    }

    fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

impl Drop for FileIndexedIo {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(file = %self.path.display(), error = %e, "failed to close container");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::string_to_path;
    use tempfile::tempdir;

    fn p(s: &str) -> Vec<Name> {
        string_to_path(s)
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("a.scc");
        let cfg = CacheConfig::default();

        let io = FileIndexedIo::open(&file, OpenMode::WRITE, &cfg).expect("open");
        io.write(&p("/root/x"), Value::from("hello".repeat(50))).expect("write");
        io.close().expect("close");
        assert!(!tmp_path(&file).exists());

        for use_mmap in [true, false] {
            let cfg = CacheConfig { use_mmap, ..CacheConfig::default() };
            let io = FileIndexedIo::open(&file, OpenMode::READ, &cfg).expect("reopen");
            assert_eq!(io.read(&p("/root/x")).expect("read"), Value::from("hello".repeat(50)));
        }
    }

    #[test]
    fn test_uncompressed() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("raw.scc");
        let cfg = CacheConfig { compression_level: 0, ..CacheConfig::default() };
        let io = FileIndexedIo::open(&file, OpenMode::WRITE, &cfg).expect("open");
        io.write(&p("/v"), Value::Int(3)).expect("write");
        drop(io);

        let io = FileIndexedIo::open(&file, OpenMode::READ, &cfg).expect("reopen");
        assert_eq!(io.read(&p("/v")).expect("read"), Value::Int(3));
    }

    #[test]
    fn test_append_keeps_data() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("b.scc");
        let cfg = CacheConfig::default();

        let io = FileIndexedIo::open(&file, OpenMode::WRITE, &cfg).expect("open");
        io.write(&p("/a"), Value::Int(1)).expect("write");
        io.close().expect("close");

        let io = FileIndexedIo::open(&file, OpenMode::APPEND, &cfg).expect("append");
        io.write(&p("/b"), Value::Int(2)).expect("write");
        io.close().expect("close");

        let io = FileIndexedIo::open(&file, OpenMode::READ, &cfg).expect("read");
        assert_eq!(io.entry_ids(&[], None).expect("ids"), vec![Name::new("a"), Name::new("b")]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().expect("tempdir");
        let err = FileIndexedIo::open(dir.path().join("none.scc"), OpenMode::READ, &CacheConfig::default());
        assert!(matches!(err, Err(Error::PathNotFound(_))));
    }

    #[test]
    fn test_garbage_file() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("junk.scc");
        fs::write(&file, vec![7u8; 64]).expect("write junk");
        let err = FileIndexedIo::open(&file, OpenMode::READ, &CacheConfig::default());
        assert!(matches!(err, Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_closed_rejects_reads() {
        let dir = tempdir().expect("tempdir");
        let io = FileIndexedIo::open(dir.path().join("c.scc"), OpenMode::WRITE, &CacheConfig::default())
            .expect("open");
        io.close().expect("close");
        assert!(matches!(io.read(&p("/x")), Err(Error::Closed(_))));
        io.close().expect("second close is a no-op");
    }
}
