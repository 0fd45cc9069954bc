//! In-memory directory tree shared by all store backends.

use std::collections::HashMap;

use crate::core::{path_to_string, Value};
use crate::util::{Error, Name, Result};

use super::EntryKind;

/// A stored entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Dir(Directory),
    Data(Value),
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Dir(_) => EntryKind::Directory,
            Self::Data(_) => EntryKind::Data,
        }
    }
}

/// Directory with entries kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Directory {
    order: Vec<Name>,
    entries: HashMap<Name, Entry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Name, &Entry)> {
        self.order
            .iter()
            .filter_map(move |n| self.entries.get(n).map(|e| (n, e)))
    }

    pub fn get(&self, name: &Name) -> Option<&Entry> {
        self.entries.get(name)
    }

    /// Insert or replace. A replaced entry keeps its position.
    pub fn insert(&mut self, name: Name, entry: Entry) {
        if self.entries.insert(name.clone(), entry).is_none() {
            self.order.push(name);
        }
    }

    pub fn remove(&mut self, name: &Name) -> Option<Entry> {
        let removed = self.entries.remove(name);
        if removed.is_some() {
            self.order.retain(|n| n != name);
        }
        removed
    }

    /// Entry at a path below this directory. The empty path has no entry.
    pub fn lookup(&self, path: &[Name]) -> Option<&Entry> {
        let (last, parents) = path.split_last()?;
        self.dir(parents)?.get(last)
    }

    /// Directory at a path below this one. The empty path is `self`.
    pub fn dir(&self, path: &[Name]) -> Option<&Directory> {
        let mut dir = self;
        for seg in path {
            match dir.entries.get(seg) {
                Some(Entry::Dir(d)) => dir = d,
                _ => return None,
            }
        }
        Some(dir)
    }

    /// Directory at a path, creating missing directories on the way.
    pub fn dir_mut_or_create(&mut self, path: &[Name]) -> Result<&mut Directory> {
        let mut dir = self;
        for (i, seg) in path.iter().enumerate() {
            if !dir.entries.contains_key(seg) {
                dir.insert(seg.clone(), Entry::Dir(Directory::new()));
            }
            dir = match dir.entries.get_mut(seg) {
                Some(Entry::Dir(d)) => d,
                _ => {
                    return Err(Error::invalid_arg(format!(
                        "{} is a data entry, not a directory",
                        path_to_string(&path[..=i])
                    )))
                }
            };
        }
        Ok(dir)
    }

    /// Existing directory at a path.
    pub fn dir_mut(&mut self, path: &[Name]) -> Option<&mut Directory> {
        let mut dir = self;
        for seg in path {
            match dir.entries.get_mut(seg) {
                Some(Entry::Dir(d)) => dir = d,
                _ => return None,
            }
        }
        Some(dir)
    }
}
