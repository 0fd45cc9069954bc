//! Native scene locations stored in an [`IndexedIo`] container.
//!
//! Container layout, one directory per location:
//! ```text
//! /root
//!     tags               names written on this location
//!     descendantTags     tags of this location and everything below it
//!     bound/             times, 0, 1, ...
//!     transform/         times, 0, 1, ...
//!     object/            times, 0, 1, ...
//!     attributes/<name>/ times, 0, 1, ...
//!     children/<name>/   nested location
//! ```
//!
//! `descendantTags` is maintained on every tag write, so descendant tag
//! queries read a single entry. Closing a writable container computes the
//! bounds of locations that were given none from their children, then
//! flushes the container.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use murmur3::MurmurHash;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::interface::{
    hash_hierarchy, hash_samples, hash_set_members, Channel, HashType, MissingBehaviour,
    SceneInterface, ScenePtr, TagFilter,
};
use crate::config::CacheConfig;
use crate::core::{
    check_time, path_to_string, root_name, Path, SampleTimes, Value,
};
use crate::indexed::{EntryKind, FileIndexedIo, IndexedIo, MemoryIndexedIo, OpenMode};
use crate::util::{BBox3d, Chrono, DMat4, Error, Name, Result};

/// File extension of scene cache files.
pub const EXTENSION: &str = "scc";

struct Keys {
    root: Name,
    children: Name,
    attributes: Name,
    bound: Name,
    transform: Name,
    object: Name,
    tags: Name,
    descendant_tags: Name,
    auto_bound: Name,
    times: Name,
}

static KEYS: Lazy<Keys> = Lazy::new(|| Keys {
    root: Name::new("root"),
    children: Name::new("children"),
    attributes: Name::new("attributes"),
    bound: Name::new("bound"),
    transform: Name::new("transform"),
    object: Name::new("object"),
    tags: Name::new("tags"),
    descendant_tags: Name::new("descendantTags"),
    auto_bound: Name::new("autoBound"),
    times: Name::new("times"),
});

fn join(base: &[Name], tail: &[&Name]) -> Path {
    let mut p = Vec::with_capacity(base.len() + tail.len());
    p.extend_from_slice(base);
    p.extend(tail.iter().map(|n| (*n).clone()));
    p
}

fn sample_key(index: usize) -> Name {
    Name::from(index.to_string())
}

fn check_child_name(name: &Name) -> Result<()> {
    if name.is_empty() || name.contains('/') {
        return Err(Error::invalid_arg(format!("invalid location name '{name}'")));
    }
    Ok(())
}

/// One open container shared by every location handle created from it.
struct Archive {
    io: Box<dyn IndexedIo>,
    write_lock: Mutex<()>,
    finalized: AtomicBool,
}

impl Archive {
    fn file_name(&self) -> &str {
        self.io.file_name()
    }

    fn is_writable(&self) -> bool {
        self.io.open_mode().is_writable()
    }

    fn check_open(&self) -> Result<()> {
        if self.io.is_closed() {
            return Err(Error::Closed(self.file_name().to_string()));
        }
        Ok(())
    }

    /// Entry lookup that fails on a closed container instead of finding nothing.
    fn has_entry(&self, key: &[Name]) -> Result<bool> {
        self.check_open()?;
        Ok(self.io.has_entry(key))
    }

    fn ensure_writable(&self) -> Result<()> {
        self.check_open()?;
        if !self.is_writable() {
            return Err(Error::ReadOnly(self.file_name().to_string()));
        }
        Ok(())
    }

    fn sample_times(&self, dir: &[Name]) -> Result<SampleTimes> {
        let key = join(dir, &[&KEYS.times]);
        if !self.has_entry(&key)? {
            return Ok(SampleTimes::new());
        }
        SampleTimes::from_vec(self.io.read(&key)?.as_doubles()?.to_vec())
    }

    fn read_sampled(&self, dir: &[Name], what: &dyn fmt::Display, time: Chrono) -> Result<Value> {
        check_time(time)?;
        let times = self.sample_times(dir)?;
        if times.is_empty() {
            return Err(Error::not_found(format!("{}: no {what} samples", self.file_name())));
        }
        let interp = times.sample_interval(time)?;
        let floor = self.io.read(&join(dir, &[&sample_key(interp.floor_index)]))?;
        if interp.is_exact() || !floor.value_type().is_interpolable() {
            return Ok(floor);
        }
        let ceil = self.io.read(&join(dir, &[&sample_key(interp.ceil_index)]))?;
        Ok(Value::interpolate(&floor, &ceil, interp.alpha))
    }

    fn write_sampled(&self, dir: &[Name], value: Value, time: Chrono) -> Result<()> {
        self.ensure_writable()?;
        let _guard = self.write_lock.lock();
        let mut times = self.sample_times(dir)?;
        let placement = times.push(time)?;
        self.io.write(&join(dir, &[&sample_key(placement.index())]), value)?;
        self.io
            .write(&join(dir, &[&KEYS.times]), Value::Doubles(times.as_slice().to_vec()))
    }

    fn read_names(&self, key: &[Name]) -> Result<Vec<Name>> {
        if !self.has_entry(key)? {
            return Ok(Vec::new());
        }
        Ok(self.io.read(key)?.as_names()?.to_vec())
    }

    /// Merge `names` into the sorted name list stored at `key`.
    fn add_names(&self, key: &[Name], names: &[Name]) -> Result<()> {
        let mut set: BTreeSet<Name> = self.read_names(key)?.into_iter().collect();
        let before = set.len();
        set.extend(names.iter().cloned());
        if set.len() != before || !self.has_entry(key)? {
            self.io.write(key, Value::Names(set.into_iter().collect()))?;
        }
        Ok(())
    }

    fn child_dirs(&self, io_path: &[Name]) -> Result<Vec<Path>> {
        let dir = join(io_path, &[&KEYS.children]);
        if !self.has_entry(&dir)? {
            return Ok(Vec::new());
        }
        Ok(self
            .io
            .entry_ids(&dir, Some(EntryKind::Directory))?
            .iter()
            .map(|n| join(&dir, &[n]))
            .collect())
    }

    /// Close the container, computing missing bounds first when writable.
    /// Only the first call does any work.
    fn finalize(&self) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let propagated = if self.is_writable() && !self.io.is_closed() {
            let _guard = self.write_lock.lock();
            self.propagate_bounds()
        } else {
            Ok(())
        };
        let closed = self.io.close();
        debug!(file = %self.file_name(), "scene cache closed");
        propagated.and(closed)
    }

    /// Give every location without a written bound the union of its
    /// children's bounds, each in parent space, at every time any child
    /// bound or transform was sampled.
    fn propagate_bounds(&self) -> Result<()> {
        let mut order = Vec::new();
        let mut stack = vec![vec![KEYS.root.clone()]];
        while let Some(loc) = stack.pop() {
            stack.extend(self.child_dirs(&loc)?);
            order.push(loc);
        }

        let mut computed = 0usize;
        // Reverse pre-order visits children before their parent
        for loc in order.iter().rev() {
            let bound_dir = join(loc, &[&KEYS.bound]);
            let auto_key = join(loc, &[&KEYS.auto_bound]);
            let auto = self.io.has_entry(&auto_key);
            if self.io.has_entry(&bound_dir) && !auto {
                continue;
            }
            if auto {
                self.io.remove(&bound_dir)?;
                self.io.remove(&auto_key)?;
            }

            let children: Vec<Path> = self
                .child_dirs(loc)?
                .into_iter()
                .filter(|c| self.io.has_entry(&join(c, &[&KEYS.bound])))
                .collect();
            if children.is_empty() {
                continue;
            }
            let mut times = SampleTimes::new();
            for c in &children {
                times = times
                    .union(&self.sample_times(&join(c, &[&KEYS.bound]))?)
                    .union(&self.sample_times(&join(c, &[&KEYS.transform]))?);
            }

            let mut samples = SampleTimes::new();
            for &t in times.as_slice() {
                let mut bound = BBox3d::EMPTY;
                for c in &children {
                    let b = self.read_sampled(&join(c, &[&KEYS.bound]), &Channel::Bound, t)?.as_box()?;
                    let xform_dir = join(c, &[&KEYS.transform]);
                    let m = if self.io.has_entry(&join(&xform_dir, &[&KEYS.times])) {
                        self.read_sampled(&xform_dir, &Channel::Transform, t)?.as_matrix()?
                    } else {
                        DMat4::IDENTITY
                    };
                    bound.expand_by_box(&b.transformed(&m));
                }
                let index = samples.push(t)?.index();
                self.io.write(&join(&bound_dir, &[&sample_key(index)]), Value::Box(bound))?;
            }
            self.io.write(
                &join(&bound_dir, &[&KEYS.times]),
                Value::Doubles(samples.as_slice().to_vec()),
            )?;
            self.io.write(&auto_key, Value::Bool(true))?;
            computed += 1;
        }
        debug!(file = %self.file_name(), locations = computed, "bounds propagated");
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            warn!(file = %self.file_name(), error = %e, "failed to finalize scene cache");
        }
    }
}

/// A location in a scene cache container.
///
/// Cloning is cheap; all clones and all locations of one container share
/// the open container, which is finalized when the last of them is dropped
/// or on an explicit [`close`](Self::close).
#[derive(Clone)]
pub struct SceneCache {
    archive: Arc<Archive>,
    path: Path,
    io_path: Path,
}

impl SceneCache {
    /// Open a scene cache file. `mode` must be READ, WRITE or APPEND.
    pub fn open(
        file: impl AsRef<std::path::Path>,
        mode: OpenMode,
        config: &CacheConfig,
    ) -> Result<Self> {
        let io = FileIndexedIo::open(file, mode, config)?;
        Self::from_io(Box::new(io))
    }

    /// Writable scene held in memory only.
    pub fn in_memory(name: impl Into<String>) -> Result<Self> {
        Self::from_io(Box::new(MemoryIndexedIo::new(name, OpenMode::WRITE)?))
    }

    /// Read-only in-memory copy of the container as it is now. Bounds of a
    /// writable container are not propagated in the copy.
    pub fn snapshot(&self) -> Result<Self> {
        let tree = self.archive.io.copy_tree()?;
        let io = MemoryIndexedIo::with_tree(self.file_name(), OpenMode::READ, tree)?;
        Ok(Self::from_io(Box::new(io))?.at(self.path.clone()))
    }

    /// Root location of a scene stored in `io`.
    pub fn from_io(io: Box<dyn IndexedIo>) -> Result<Self> {
        let root_io = vec![KEYS.root.clone()];
        if io.open_mode().is_writable() {
            io.create_directory(&root_io)?;
        } else if io.entry_kind(&root_io) != Some(EntryKind::Directory) {
            return Err(Error::corrupted(format!(
                "{}: not a scene cache (no root location)",
                io.file_name()
            )));
        }
        Ok(Self {
            archive: Arc::new(Archive {
                io,
                write_lock: Mutex::new(()),
                finalized: AtomicBool::new(false),
            }),
            path: Vec::new(),
            io_path: root_io,
        })
    }

    pub fn open_mode(&self) -> OpenMode {
        self.archive.io.open_mode()
    }

    pub fn is_read_only(&self) -> bool {
        !self.archive.is_writable()
    }

    /// Number of live handles on this container, `self` included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.archive)
    }

    /// `true` if both handles belong to the same open container.
    pub fn same_archive(&self, other: &SceneCache) -> bool {
        Arc::ptr_eq(&self.archive, &other.archive)
    }

    /// Finalize and close the container. Later calls on any location of
    /// this container fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        self.archive.finalize()
    }

    pub fn is_closed(&self) -> bool {
        self.archive.io.is_closed()
    }

    /// Root location of this container.
    pub fn root(&self) -> SceneCache {
        self.at(Vec::new())
    }

    fn at(&self, path: Path) -> SceneCache {
        let mut io_path = Vec::with_capacity(1 + 2 * path.len());
        io_path.push(KEYS.root.clone());
        for seg in &path {
            io_path.push(KEYS.children.clone());
            io_path.push(seg.clone());
        }
        SceneCache {
            archive: Arc::clone(&self.archive),
            path,
            io_path,
        }
    }

    fn child_io(&self, name: &Name) -> Path {
        join(&self.io_path, &[&KEYS.children, name])
    }

    /// Existing child location.
    pub fn typed_child(&self, name: &Name) -> Option<SceneCache> {
        if self.archive.io.entry_kind(&self.child_io(name)) != Some(EntryKind::Directory) {
            return None;
        }
        let mut path = self.path.clone();
        path.push(name.clone());
        Some(self.at(path))
    }

    /// Existing child location, failing if the container is closed.
    pub fn find_child(&self, name: &Name) -> Result<Option<SceneCache>> {
        self.archive.check_open()?;
        Ok(self.typed_child(name))
    }

    /// Create a new child location.
    pub fn create_typed_child(&self, name: &Name) -> Result<SceneCache> {
        self.archive.ensure_writable()?;
        check_child_name(name)?;
        let io = self.child_io(name);
        if self.archive.io.has_entry(&io) {
            return Err(Error::invalid_arg(format!(
                "location {} already exists",
                path_to_string(&join(&self.path, &[name]))
            )));
        }
        self.archive.io.create_directory(&io)?;
        let mut path = self.path.clone();
        path.push(name.clone());
        Ok(self.at(path))
    }

    /// Location at `path` from the root.
    pub fn location(&self, path: &[Name], missing: MissingBehaviour) -> Result<Option<SceneCache>> {
        self.archive.check_open()?;
        let mut node = self.root();
        for seg in path {
            node = match node.typed_child(seg) {
                Some(c) => c,
                None => match missing {
                    MissingBehaviour::ThrowIfMissing => {
                        return Err(Error::not_found(format!(
                            "{}: no location {}",
                            self.file_name(),
                            path_to_string(path)
                        )))
                    }
                    MissingBehaviour::NullIfMissing => return Ok(None),
                    MissingBehaviour::CreateIfMissing => node.create_typed_child(seg)?,
                },
            };
        }
        Ok(Some(node))
    }

    /// Add `tags` to the descendant tags of this location and its ancestors
    /// without making them local here.
    pub fn write_descendant_tags(&self, tags: &[Name]) -> Result<()> {
        self.archive.ensure_writable()?;
        let _guard = self.archive.write_lock.lock();
        for len in (1..=self.io_path.len()).step_by(2) {
            self.archive
                .add_names(&join(&self.io_path[..len], &[&KEYS.descendant_tags]), tags)?;
        }
        Ok(())
    }

    fn channel_dir(&self, channel: &Channel) -> Path {
        match channel {
            Channel::Bound => join(&self.io_path, &[&KEYS.bound]),
            Channel::Transform => join(&self.io_path, &[&KEYS.transform]),
            Channel::Object => join(&self.io_path, &[&KEYS.object]),
            Channel::Attribute(n) => join(&self.io_path, &[&KEYS.attributes, n]),
        }
    }

    fn read_channel(&self, channel: &Channel, time: Chrono) -> Result<Value> {
        self.archive
            .read_sampled(&self.channel_dir(channel), channel, time)
            .map_err(|e| match e {
                Error::PathNotFound(_) => Error::not_found(format!(
                    "{}: no {channel} samples at {}",
                    self.file_name(),
                    self.path_string()
                )),
                e => e,
            })
    }

    fn has_channel(&self, channel: &Channel) -> Result<bool> {
        self.archive
            .has_entry(&join(&self.channel_dir(channel), &[&KEYS.times]))
    }

    fn ensure_not_root(&self, what: &str) -> Result<()> {
        if self.path.is_empty() {
            return Err(Error::invalid_arg(format!("the root location cannot hold {what}")));
        }
        Ok(())
    }

    fn tags_at(&self, io_path: &[Name], which: &Name) -> Result<Vec<Name>> {
        self.archive.read_names(&join(io_path, &[which]))
    }

    fn ancestor_tags(&self) -> Result<BTreeSet<Name>> {
        let mut out = BTreeSet::new();
        for len in (1..self.io_path.len()).step_by(2) {
            out.extend(self.tags_at(&self.io_path[..len], &KEYS.tags)?);
        }
        Ok(out)
    }
}

impl fmt::Debug for SceneCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneCache")
            .field("file", &self.file_name())
            .field("path", &self.path_string())
            .field("mode", &self.open_mode())
            .finish()
    }
}

impl SceneInterface for SceneCache {
    fn file_name(&self) -> &str {
        self.archive.file_name()
    }

    fn name(&self) -> Name {
        self.path.last().cloned().unwrap_or_else(root_name)
    }

    fn path(&self) -> Path {
        self.path.clone()
    }

    fn sample_times(&self, channel: &Channel) -> Result<SampleTimes> {
        self.archive.sample_times(&self.channel_dir(channel))
    }

    fn has_bound(&self) -> Result<bool> {
        self.has_channel(&Channel::Bound)
    }

    fn read_bound(&self, time: Chrono) -> Result<BBox3d> {
        self.read_channel(&Channel::Bound, time)?.as_box()
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()> {
        self.archive.ensure_writable()?;
        let auto_key = join(&self.io_path, &[&KEYS.auto_bound]);
        // A computed bound from an earlier session gives way to written ones
        if self.archive.io.has_entry(&auto_key) {
            self.archive.io.remove(&auto_key)?;
            self.archive.io.remove(&self.channel_dir(&Channel::Bound))?;
        }
        self.archive
            .write_sampled(&self.channel_dir(&Channel::Bound), Value::Box(*bound), time)
    }

    fn read_transform(&self, time: Chrono) -> Result<DMat4> {
        check_time(time)?;
        if !self.has_channel(&Channel::Transform)? {
            return Ok(DMat4::IDENTITY);
        }
        self.read_channel(&Channel::Transform, time)?.as_matrix()
    }

    fn write_transform(&self, transform: &DMat4, time: Chrono) -> Result<()> {
        self.archive.ensure_writable()?;
        self.ensure_not_root("a transform")?;
        self.archive.write_sampled(
            &self.channel_dir(&Channel::Transform),
            Value::Matrix(*transform),
            time,
        )
    }

    fn has_attribute(&self, name: &Name) -> Result<bool> {
        self.has_channel(&Channel::Attribute(name.clone()))
    }

    fn attribute_names(&self) -> Result<Vec<Name>> {
        let dir = join(&self.io_path, &[&KEYS.attributes]);
        if !self.archive.has_entry(&dir)? {
            return Ok(Vec::new());
        }
        self.archive.io.entry_ids(&dir, Some(EntryKind::Directory))
    }

    fn read_attribute(&self, name: &Name, time: Chrono) -> Result<Value> {
        self.read_channel(&Channel::Attribute(name.clone()), time)
    }

    fn write_attribute(&self, name: &Name, value: &Value, time: Chrono) -> Result<()> {
        check_child_name(name)?;
        self.archive.write_sampled(
            &self.channel_dir(&Channel::Attribute(name.clone())),
            value.clone(),
            time,
        )
    }

    fn has_tag(&self, name: &Name, filter: TagFilter) -> Result<bool> {
        if filter.contains(TagFilter::LOCAL)
            && self.tags_at(&self.io_path, &KEYS.tags)?.contains(name)
        {
            return Ok(true);
        }
        if filter.contains(TagFilter::DESCENDANT)
            && self.tags_at(&self.io_path, &KEYS.descendant_tags)?.contains(name)
        {
            return Ok(true);
        }
        if filter.contains(TagFilter::ANCESTOR) {
            for len in (1..self.io_path.len()).step_by(2) {
                if self.tags_at(&self.io_path[..len], &KEYS.tags)?.contains(name) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn read_tags(&self, filter: TagFilter) -> Result<Vec<Name>> {
        let mut out = BTreeSet::new();
        if filter.contains(TagFilter::LOCAL) {
            out.extend(self.tags_at(&self.io_path, &KEYS.tags)?);
        }
        if filter.contains(TagFilter::DESCENDANT) {
            out.extend(self.tags_at(&self.io_path, &KEYS.descendant_tags)?);
        }
        if filter.contains(TagFilter::ANCESTOR) {
            out.extend(self.ancestor_tags()?);
        }
        Ok(out.into_iter().collect())
    }

    fn write_tags(&self, tags: &[Name]) -> Result<()> {
        self.archive.ensure_writable()?;
        for t in tags {
            check_child_name(t)?;
        }
        {
            let _guard = self.archive.write_lock.lock();
            self.archive
                .add_names(&join(&self.io_path, &[&KEYS.tags]), tags)?;
        }
        self.write_descendant_tags(tags)
    }

    fn has_object(&self) -> Result<bool> {
        self.has_channel(&Channel::Object)
    }

    fn read_object(&self, time: Chrono) -> Result<Value> {
        self.read_channel(&Channel::Object, time)
    }

    fn write_object(&self, object: &Value, time: Chrono) -> Result<()> {
        self.archive.ensure_writable()?;
        self.ensure_not_root("an object")?;
        self.archive
            .write_sampled(&self.channel_dir(&Channel::Object), object.clone(), time)
    }

    fn child_names(&self) -> Result<Vec<Name>> {
        let dir = join(&self.io_path, &[&KEYS.children]);
        if !self.archive.has_entry(&dir)? {
            return Ok(Vec::new());
        }
        self.archive.io.entry_ids(&dir, Some(EntryKind::Directory))
    }

    fn has_child(&self, name: &Name) -> Result<bool> {
        Ok(self.find_child(name)?.is_some())
    }

    fn child(&self, name: &Name, missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        if let Some(c) = self.find_child(name)? {
            return Ok(Some(Arc::new(c)));
        }
        match missing {
            MissingBehaviour::ThrowIfMissing => Err(Error::not_found(format!(
                "{}: no location {}",
                self.file_name(),
                path_to_string(&join(&self.path, &[name]))
            ))),
            MissingBehaviour::NullIfMissing => Ok(None),
            MissingBehaviour::CreateIfMissing => Ok(Some(self.create_child(name)?)),
        }
    }

    fn create_child(&self, name: &Name) -> Result<ScenePtr> {
        Ok(Arc::new(self.create_typed_child(name)?))
    }

    fn scene(&self, path: &[Name], missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        Ok(self
            .location(path, missing)?
            .map(|s| Arc::new(s) as ScenePtr))
    }

    fn hash(&self, kind: HashType, time: Chrono, h: &mut MurmurHash) -> Result<()> {
        check_time(time)?;
        h.append_str(self.file_name());
        h.append_str(&self.path_string());
        h.append_u64(kind as u64);
        match kind {
            HashType::Transform => hash_samples(&self.sample_times(&Channel::Transform)?, time, h),
            HashType::Bound => hash_samples(&self.sample_times(&Channel::Bound)?, time, h),
            HashType::Object => hash_samples(&self.sample_times(&Channel::Object)?, time, h),
            HashType::Attributes => {
                for name in self.attribute_names()? {
                    h.append_str(&name);
                    hash_samples(&self.sample_times(&Channel::Attribute(name))?, time, h)?;
                }
                Ok(())
            }
            HashType::ChildNames => {
                for name in self.child_names()? {
                    h.append_str(&name);
                }
                Ok(())
            }
            HashType::Hierarchy => hash_hierarchy(self, time, h),
        }
    }

    fn hash_set(&self, name: &Name, h: &mut MurmurHash) -> Result<()> {
        h.append_str(self.file_name());
        h.append_str(&self.path_string());
        hash_set_members(self, name, h)
    }
}
