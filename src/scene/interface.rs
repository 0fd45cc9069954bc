//! The scene node abstraction.
//!
//! A [`SceneInterface`] is one location in a hierarchical scene. Every
//! location has children, tags, a bound, a transform, attributes and an
//! optional object; bounds, transforms, attributes and objects are sampled
//! over time.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use murmur3::MurmurHash;

use super::walk;
use crate::core::{path_to_string, string_to_path_checked, Path, PathMatcher, SampleTimes, Value};
use crate::util::{BBox3d, Chrono, DMat4, Error, Name, Result};

/// Shared handle to a scene location.
pub type ScenePtr = Arc<dyn SceneInterface>;

/// What [`SceneInterface::child`] does when the child does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingBehaviour {
    /// Fail with `PathNotFound`.
    ThrowIfMissing,
    /// Return `None`.
    NullIfMissing,
    /// Create the child (writable scenes only).
    CreateIfMissing,
}

bitflags! {
    /// Which tags a tag query considers.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TagFilter: u8 {
        /// Tags anywhere in the subtree, the location itself included.
        const DESCENDANT = 1;
        /// Tags written on the location itself.
        const LOCAL = 2;
        /// Tags written on any ancestor.
        const ANCESTOR = 4;
        const EVERY = Self::DESCENDANT.bits() | Self::LOCAL.bits() | Self::ANCESTOR.bits();
    }
}

/// Aspect of a location covered by [`SceneInterface::hash`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HashType {
    Transform = 0,
    Attributes = 1,
    Bound = 2,
    Object = 3,
    ChildNames = 4,
    /// Everything in the subtree.
    Hierarchy = 5,
}

impl HashType {
    /// The per-location kinds making up a hierarchy hash.
    pub const LOCATION: [HashType; 5] = [
        Self::Transform,
        Self::Attributes,
        Self::Bound,
        Self::Object,
        Self::ChildNames,
    ];
}

/// A time-sampled channel of a location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Bound,
    Transform,
    Object,
    Attribute(Name),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound => f.write_str("bound"),
            Self::Transform => f.write_str("transform"),
            Self::Object => f.write_str("object"),
            Self::Attribute(n) => write!(f, "attribute '{n}'"),
        }
    }
}

/// One location in a scene.
pub trait SceneInterface: Send + Sync {
    // ===== Identity =====

    /// Name of the file holding this location.
    fn file_name(&self) -> &str;

    /// Last path segment, or `/` at the root.
    fn name(&self) -> Name;

    /// Path from the scene root.
    fn path(&self) -> Path;

    fn path_string(&self) -> String {
        path_to_string(&self.path())
    }

    // ===== Sampling =====

    /// Times at which `channel` was written. Empty if it never was.
    fn sample_times(&self, channel: &Channel) -> Result<SampleTimes>;

    fn num_samples(&self, channel: &Channel) -> Result<usize> {
        Ok(self.sample_times(channel)?.len())
    }

    fn sample_time(&self, channel: &Channel, index: usize) -> Result<Chrono> {
        self.sample_times(channel)?.sample_time(index)
    }

    // ===== Bound =====

    fn has_bound(&self) -> Result<bool>;

    /// Bound of the location and its subtree in local space.
    fn read_bound(&self, time: Chrono) -> Result<BBox3d>;

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()>;

    // ===== Transform =====

    /// Local transform. Locations without one are at identity.
    fn read_transform(&self, time: Chrono) -> Result<DMat4>;

    fn write_transform(&self, transform: &DMat4, time: Chrono) -> Result<()>;

    // ===== Attributes =====

    fn has_attribute(&self, name: &Name) -> Result<bool>;

    fn attribute_names(&self) -> Result<Vec<Name>>;

    fn read_attribute(&self, name: &Name, time: Chrono) -> Result<Value>;

    fn write_attribute(&self, name: &Name, value: &Value, time: Chrono) -> Result<()>;

    // ===== Tags =====

    /// `true` if `name` is among the tags selected by `filter`.
    ///
    /// DESCENDANT answers from a stored aggregate and never walks the subtree.
    fn has_tag(&self, name: &Name, filter: TagFilter) -> Result<bool>;

    /// Tags selected by `filter`, sorted and without duplicates.
    fn read_tags(&self, filter: TagFilter) -> Result<Vec<Name>>;

    /// Add local tags to this location.
    fn write_tags(&self, tags: &[Name]) -> Result<()>;

    // ===== Sets =====

    /// Names of the sets with members at this location, or anywhere below
    /// it when `include_descendants` is set.
    fn set_names(&self, include_descendants: bool) -> Result<Vec<Name>> {
        let filter = if include_descendants {
            TagFilter::LOCAL | TagFilter::DESCENDANT
        } else {
            TagFilter::LOCAL
        };
        self.read_tags(filter)
    }

    /// Members of set `name`, relative to this location.
    fn read_set(&self, name: &Name, include_descendants: bool) -> Result<PathMatcher> {
        if include_descendants {
            return Ok(PathMatcher::from_paths(walk::tagged_paths(self, name)?.paths));
        }
        let mut set = PathMatcher::new();
        if self.has_tag(name, TagFilter::LOCAL)? {
            set.add_path(&[]);
        }
        Ok(set)
    }

    /// Make every location of `set` (relative to this one) a member of set
    /// `name`. Missing locations are created.
    fn write_set(&self, name: &Name, set: &PathMatcher) -> Result<()> {
        let tags = [name.clone()];
        for path in set.paths() {
            let Some((first, rest)) = path.split_first() else {
                self.write_tags(&tags)?;
                continue;
            };
            let mut node = self.create_or_get_child(first)?;
            for seg in rest {
                node = node.create_or_get_child(seg)?;
            }
            node.write_tags(&tags)?;
        }
        Ok(())
    }

    // ===== Objects =====

    fn has_object(&self) -> Result<bool>;

    fn read_object(&self, time: Chrono) -> Result<Value>;

    fn write_object(&self, object: &Value, time: Chrono) -> Result<()>;

    // ===== Hierarchy =====

    /// Child names in storage order.
    fn child_names(&self) -> Result<Vec<Name>>;

    fn has_child(&self, name: &Name) -> Result<bool>;

    fn child(&self, name: &Name, missing: MissingBehaviour) -> Result<Option<ScenePtr>>;

    /// Add a new child. Fails if it already exists.
    fn create_child(&self, name: &Name) -> Result<ScenePtr>;

    /// Location at `path` from the scene root (not from this location).
    fn scene(&self, path: &[Name], missing: MissingBehaviour) -> Result<Option<ScenePtr>>;

    /// [`scene`](Self::scene) for a path string such as `/a/b`. The string
    /// must be absolute.
    fn scene_at(&self, path: &str, missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        self.scene(&string_to_path_checked(path)?, missing)
    }

    /// Existing child or `PathNotFound`.
    fn child_or_err(&self, name: &Name) -> Result<ScenePtr> {
        self.child(name, MissingBehaviour::ThrowIfMissing)?
            .ok_or_else(|| Error::not_found(format!("{}/{name}", self.path_string())))
    }

    fn create_or_get_child(&self, name: &Name) -> Result<ScenePtr> {
        self.child(name, MissingBehaviour::CreateIfMissing)?
            .ok_or_else(|| Error::not_found(format!("{}/{name}", self.path_string())))
    }

    // ===== Hashing =====

    /// Append a hash of one aspect of this location at `time` to `h`.
    fn hash(&self, kind: HashType, time: Chrono, h: &mut MurmurHash) -> Result<()>;

    /// Append a hash of the members of set `name` at or below this location.
    fn hash_set(&self, name: &Name, h: &mut MurmurHash) -> Result<()>;
}

/// Hash of every location aspect over a whole subtree, in walk order.
pub fn hash_hierarchy<S>(root: &S, time: Chrono, h: &mut MurmurHash) -> Result<()>
where
    S: SceneInterface + ?Sized,
{
    let mut stack: Vec<ScenePtr> = Vec::new();
    for n in hash_location(root, time, h)?.iter().rev() {
        stack.push(root.child_or_err(n)?);
    }
    while let Some(node) = stack.pop() {
        for n in hash_location(node.as_ref(), time, h)?.iter().rev() {
            stack.push(node.child_or_err(n)?);
        }
    }
    Ok(())
}

/// Hash one location and return its child names.
fn hash_location<S>(node: &S, time: Chrono, h: &mut MurmurHash) -> Result<Vec<Name>>
where
    S: SceneInterface + ?Sized,
{
    for kind in HashType::LOCATION {
        node.hash(kind, time, h)?;
    }
    node.child_names()
}

/// Append set `name` and its member paths below `node`.
pub(crate) fn hash_set_members<S>(node: &S, name: &Name, h: &mut MurmurHash) -> Result<()>
where
    S: SceneInterface + ?Sized,
{
    h.append_str(name);
    for path in node.read_set(name, true)?.paths() {
        h.append_str(&path_to_string(&path));
    }
    Ok(())
}

/// Append the sample bracket of a channel at `time`.
pub(crate) fn hash_samples(times: &SampleTimes, time: Chrono, h: &mut MurmurHash) -> Result<()> {
    if times.is_empty() {
        h.append_u64(0);
        return Ok(());
    }
    let interp = times.sample_interval(time)?;
    h.append_f64(times.sample_time(interp.floor_index)?);
    if !interp.is_exact() {
        h.append_f64(times.sample_time(interp.ceil_index)?);
        h.append_f64(interp.alpha);
    }
    Ok(())
}

impl fmt::Debug for dyn SceneInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneInterface")
            .field("path", &self.path_string())
            .finish()
    }
}
