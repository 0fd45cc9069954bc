//! Scenes that splice in subtrees of other scene files.
//!
//! A location becomes a link by carrying the link attributes: the target
//! file, the target root path and optionally a sampled `time` used to remap
//! reads. [`LinkedScene`] wraps a [`SceneCache`] location and, when reading,
//! presents the target subtree in place of the link location's content:
//!
//! - at the link root the bound, object, tags and children come from the
//!   target; the transform and the remaining attributes stay with the link
//!   location itself
//! - below the link root everything comes from the target
//! - every sampled read goes through the time remap when one is present
//!
//! Construction does no I/O. The link is resolved on first access through
//! [`SharedScenes`], and a broken link fails that access instead of reading
//! as an empty subtree.
//!
//! Files written through a `LinkedScene` record every link location in the
//! root attribute `linkLocations`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use murmur3::MurmurHash;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::cache::SceneCache;
use super::interface::{
    hash_hierarchy, hash_set_members, Channel, HashType, MissingBehaviour, SceneInterface,
    ScenePtr, TagFilter,
};
use super::shared::SharedScenes;
use crate::core::{check_time, path_to_string, Path, PathMatcher, SampleTimes, Value};
use crate::indexed::OpenMode;
use crate::util::{BBox3d, Chrono, DMat4, Error, Name, Result};

/// Compound link attribute holding `fileName`, `root` and optionally `time`.
pub const LINK_ATTRIBUTE: &str = "sceneInterface:link";
pub const FILE_NAME_LINK_ATTRIBUTE: &str = "sceneInterface:link.fileName";
pub const ROOT_LINK_ATTRIBUTE: &str = "sceneInterface:link.root";
pub const TIME_LINK_ATTRIBUTE: &str = "sceneInterface:link.time";
/// Root attribute listing every link location of a file.
pub const LINK_LOCATIONS_ATTRIBUTE: &str = "linkLocations";

struct LinkKeys {
    link: Name,
    file_name: Name,
    root: Name,
    time: Name,
    locations: Name,
    member_file_name: Name,
    member_root: Name,
    member_time: Name,
}

static KEYS: Lazy<LinkKeys> = Lazy::new(|| LinkKeys {
    link: Name::new(LINK_ATTRIBUTE),
    file_name: Name::new(FILE_NAME_LINK_ATTRIBUTE),
    root: Name::new(ROOT_LINK_ATTRIBUTE),
    time: Name::new(TIME_LINK_ATTRIBUTE),
    locations: Name::new(LINK_LOCATIONS_ATTRIBUTE),
    member_file_name: Name::new("fileName"),
    member_root: Name::new("root"),
    member_time: Name::new("time"),
});

/// Attributes only the link layer reads.
fn is_link_key(name: &Name) -> bool {
    *name == KEYS.link
        || *name == KEYS.file_name
        || *name == KEYS.root
        || *name == KEYS.time
        || *name == KEYS.locations
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimeRemap {
    Identity,
    /// Sampled `sceneInterface:link.time` attribute.
    Attribute,
    /// `time` member of the compound link attribute.
    Compound,
}

/// What the link attributes of a location say.
struct LinkSpec {
    file: String,
    root: Path,
    remap: TimeRemap,
}

/// A resolved link.
struct Link {
    file: String,
    /// Target root location, read through its own link layer.
    target: ScenePtr,
    /// Depth of the target root in the target file.
    root_depth: usize,
    remap: TimeRemap,
}

enum LinkSlot {
    Unchecked,
    NotLink,
    Resolved(Arc<Link>),
}

enum Kind {
    /// A location of the main file, possibly a link root.
    Main(Mutex<LinkSlot>),
    /// A location below a link root.
    Inside {
        link: Arc<Link>,
        target: ScenePtr,
        /// Tags of the link root's ancestors, the link root itself and
        /// every linked location above this one.
        ancestor_tags: Arc<BTreeSet<Name>>,
    },
}

/// Where reads of a location are answered.
enum Source {
    Native,
    LinkRoot(Arc<Link>),
    Inside(Arc<Link>, ScenePtr),
}

/// Link targets followed to reach a scene, outermost first.
type LinkChain = Arc<Vec<(String, Path)>>;

/// Link locations written so far, merged with those already stored.
#[derive(Default)]
struct LinkRecord {
    loaded: bool,
    paths: PathMatcher,
}

/// Link-resolving view of a scene cache location.
pub struct LinkedScene {
    /// The wrapped location, or the link root for locations below one.
    main: SceneCache,
    kind: Kind,
    shared: Arc<SharedScenes>,
    record: Arc<Mutex<LinkRecord>>,
    /// Targets of the links this scene was reached through.
    chain: LinkChain,
}

impl LinkedScene {
    /// Wrap `main`. Links are resolved through `shared`.
    pub fn new(main: SceneCache, shared: Arc<SharedScenes>) -> Self {
        Self::with_chain(main, shared, LinkChain::default())
    }

    fn with_chain(main: SceneCache, shared: Arc<SharedScenes>, chain: LinkChain) -> Self {
        Self {
            main,
            kind: Kind::Main(Mutex::new(LinkSlot::Unchecked)),
            shared,
            record: Arc::new(Mutex::new(LinkRecord::default())),
            chain,
        }
    }

    /// Open `file` through `shared` and wrap its root.
    pub fn open(file: &str, mode: OpenMode, shared: Arc<SharedScenes>) -> Result<Self> {
        let scene = shared.get_with_mode(file, mode)?;
        Ok(Self::new(scene.root(), shared))
    }

    /// Location of the main file at `path`, without following links. This
    /// is how link locations are reached for writing.
    pub fn location(&self, path: &[Name], missing: MissingBehaviour) -> Result<Option<LinkedScene>> {
        Ok(self.main.location(path, missing)?.map(|m| self.main_node(m)))
    }

    /// Finalize the main file.
    pub fn close(&self) -> Result<()> {
        self.main.close()
    }

    fn main_node(&self, main: SceneCache) -> LinkedScene {
        LinkedScene {
            main,
            kind: Kind::Main(Mutex::new(LinkSlot::Unchecked)),
            shared: Arc::clone(&self.shared),
            record: Arc::clone(&self.record),
            chain: Arc::clone(&self.chain),
        }
    }

    fn inside_node(&self, link: Arc<Link>, target: ScenePtr, ancestor_tags: BTreeSet<Name>) -> LinkedScene {
        LinkedScene {
            main: self.main.clone(),
            kind: Kind::Inside {
                link,
                target,
                ancestor_tags: Arc::new(ancestor_tags),
            },
            shared: Arc::clone(&self.shared),
            record: Arc::clone(&self.record),
            chain: Arc::clone(&self.chain),
        }
    }

    /// `true` if the location carries link attributes. Does not resolve
    /// the link.
    pub fn is_link_root(&self) -> Result<bool> {
        match self.kind {
            Kind::Main(_) => Ok(self.main.has_attribute(&KEYS.file_name)?
                || self.main.has_attribute(&KEYS.link)?),
            Kind::Inside { .. } => Ok(false),
        }
    }

    /// Link locations of the main file.
    pub fn link_locations(&self) -> Result<PathMatcher> {
        if !self.main.is_read_only() {
            let mut record = self.record.lock();
            self.load_record(&mut record)?;
            return Ok(record.paths.clone());
        }
        let root = self.main.root();
        if !root.has_attribute(&KEYS.locations)? {
            return Ok(PathMatcher::new());
        }
        Ok(root
            .read_attribute(&KEYS.locations, 0.0)?
            .as_path_set()?
            .clone())
    }

    fn load_record(&self, record: &mut LinkRecord) -> Result<()> {
        if record.loaded {
            return Ok(());
        }
        let root = self.main.root();
        if root.has_attribute(&KEYS.locations)? {
            let stored = root.read_attribute(&KEYS.locations, 0.0)?;
            record.paths.add_paths(stored.as_path_set()?, &[]);
        }
        record.loaded = true;
        Ok(())
    }

    fn record_link_location(&self) -> Result<()> {
        let mut record = self.record.lock();
        self.load_record(&mut record)?;
        if record.paths.add_path(&self.main.path()) {
            self.main.root().write_attribute(
                &KEYS.locations,
                &Value::PathSet(record.paths.clone()),
                0.0,
            )?;
        }
        Ok(())
    }

    /// Make this location a link to `target_root` in `target_file`.
    ///
    /// Called once per written time sample. With `time_remap`, reads at
    /// `time` see the target at `time_remap`. The target does not have to
    /// exist yet; if it can be read, its tags and bound are copied so that
    /// queries above the link see the linked content.
    pub fn write_link(
        &self,
        target_file: &str,
        target_root: &[Name],
        time_remap: Option<Chrono>,
        time: Chrono,
    ) -> Result<()> {
        if matches!(self.kind, Kind::Inside { .. }) || self.main.is_read_only() {
            return Err(Error::ReadOnly(self.main.file_name().to_string()));
        }
        check_time(time)?;
        if let Some(t) = time_remap {
            check_time(t)?;
        }
        if self.main.path().is_empty() {
            return Err(Error::invalid_arg("the root location cannot be a link"));
        }
        let first = !self.main.has_attribute(&KEYS.file_name)?;
        if first {
            if self.main.has_object()? {
                return Err(Error::invalid_arg(format!(
                    "{} holds an object and cannot become a link",
                    self.main.path_string()
                )));
            }
            if !self.main.child_names()?.is_empty() {
                return Err(Error::invalid_arg(format!(
                    "{} has children and cannot become a link",
                    self.main.path_string()
                )));
            }
        }

        self.main
            .write_attribute(&KEYS.file_name, &Value::from(target_file), time)?;
        self.main
            .write_attribute(&KEYS.root, &Value::Names(target_root.to_vec()), time)?;
        if let Some(t) = time_remap {
            self.main.write_attribute(&KEYS.time, &Value::Double(t), time)?;
        }

        if let Err(e) = self.copy_from_target(target_file, target_root, time_remap.unwrap_or(time), time, first) {
            warn!(
                file = target_file,
                root = %path_to_string(target_root),
                error = %e,
                "link target unreadable, tags and bound not copied"
            );
        }
        self.record_link_location()?;
        debug!(
            location = %self.main.path_string(),
            file = target_file,
            root = %path_to_string(target_root),
            time,
            "link written"
        );
        Ok(())
    }

    fn copy_from_target(
        &self,
        target_file: &str,
        target_root: &[Name],
        target_time: Chrono,
        time: Chrono,
        copy_tags: bool,
    ) -> Result<()> {
        let file_root = self.shared.get(target_file)?;
        let chain = Arc::new(vec![(target_file.to_string(), target_root.to_vec())]);
        let target = LinkedScene::with_chain(file_root.root(), Arc::clone(&self.shared), chain)
            .scene(target_root, MissingBehaviour::ThrowIfMissing)?
            .ok_or_else(|| Error::not_found(path_to_string(target_root)))?;
        if copy_tags {
            let tags = target.read_tags(TagFilter::LOCAL | TagFilter::DESCENDANT)?;
            if !tags.is_empty() {
                self.main.write_descendant_tags(&tags)?;
            }
        }
        if target.has_bound()? {
            self.main.write_bound(&target.read_bound(target_time)?, time)?;
        }
        Ok(())
    }

    fn read_link_spec(&self) -> Result<Option<LinkSpec>> {
        let main = &self.main;
        if main.has_attribute(&KEYS.file_name)? {
            let file = main.read_attribute(&KEYS.file_name, 0.0)?.as_str()?.to_string();
            let root = main.read_attribute(&KEYS.root, 0.0)?.as_names()?.to_vec();
            let remap = if main.has_attribute(&KEYS.time)? {
                TimeRemap::Attribute
            } else {
                TimeRemap::Identity
            };
            return Ok(Some(LinkSpec { file, root, remap }));
        }
        if main.has_attribute(&KEYS.link)? {
            let value = main.read_attribute(&KEYS.link, 0.0)?;
            let (file, root, has_time) = parse_compound(value.as_compound()?)?;
            let remap = if has_time {
                TimeRemap::Compound
            } else {
                TimeRemap::Identity
            };
            return Ok(Some(LinkSpec { file, root, remap }));
        }
        Ok(None)
    }

    fn resolve(&self, slot: &Mutex<LinkSlot>) -> Result<Option<Arc<Link>>> {
        let mut slot = slot.lock();
        match &*slot {
            LinkSlot::NotLink => return Ok(None),
            LinkSlot::Resolved(link) => return Ok(Some(Arc::clone(link))),
            LinkSlot::Unchecked => {}
        }
        // Writers see the link attributes, not the linked content
        if !self.main.is_read_only() {
            *slot = LinkSlot::NotLink;
            return Ok(None);
        }
        let Some(spec) = self.read_link_spec()? else {
            *slot = LinkSlot::NotLink;
            return Ok(None);
        };

        if self.chain.iter().any(|(f, r)| *f == spec.file && *r == spec.root) {
            return Err(Error::invalid_arg(format!(
                "link cycle: {} links to {}:{}, which is already being followed",
                self.main.path_string(),
                spec.file,
                path_to_string(&spec.root)
            )));
        }
        let mut chain = (*self.chain).clone();
        chain.push((spec.file.clone(), spec.root.clone()));

        let file_root = self.shared.get(&spec.file)?;
        let linked_root = LinkedScene::with_chain(file_root.root(), Arc::clone(&self.shared), Arc::new(chain));
        let target = linked_root
            .scene(&spec.root, MissingBehaviour::ThrowIfMissing)?
            .ok_or_else(|| {
                Error::not_found(format!("{}: no location {}", spec.file, path_to_string(&spec.root)))
            })?;
        debug!(
            location = %self.main.path_string(),
            file = %spec.file,
            root = %path_to_string(&spec.root),
            "link resolved"
        );
        let link = Arc::new(Link {
            file: spec.file,
            target,
            root_depth: spec.root.len(),
            remap: spec.remap,
        });
        *slot = LinkSlot::Resolved(Arc::clone(&link));
        Ok(Some(link))
    }

    fn source(&self) -> Result<Source> {
        match &self.kind {
            Kind::Main(slot) => Ok(match self.resolve(slot)? {
                Some(link) => Source::LinkRoot(link),
                None => Source::Native,
            }),
            Kind::Inside { link, target, .. } => Ok(Source::Inside(Arc::clone(link), Arc::clone(target))),
        }
    }

    /// Time in the target file for `time` in the main file.
    fn remap(&self, link: &Link, time: Chrono) -> Result<Chrono> {
        check_time(time)?;
        match link.remap {
            TimeRemap::Identity => Ok(time),
            TimeRemap::Attribute => self.main.read_attribute(&KEYS.time, time)?.as_double(),
            TimeRemap::Compound => {
                let value = self.main.read_attribute(&KEYS.link, time)?;
                value
                    .as_compound()?
                    .get(&KEYS.member_time)
                    .ok_or_else(|| Error::corrupted("link attribute lost its time member"))?
                    .as_double()
            }
        }
    }

    /// Sample times of a linked channel: those of the remap when there is
    /// one, the target's otherwise.
    fn linked_times(&self, link: &Link, target: &ScenePtr, channel: &Channel) -> Result<SampleTimes> {
        match link.remap {
            TimeRemap::Identity => target.sample_times(channel),
            TimeRemap::Attribute => self.main.sample_times(&Channel::Attribute(KEYS.time.clone())),
            TimeRemap::Compound => self.main.sample_times(&Channel::Attribute(KEYS.link.clone())),
        }
    }

    fn read_only_err(&self) -> Error {
        Error::ReadOnly(format!("{} (linked location)", self.path_string()))
    }

    fn main_child(&self, name: &Name, missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        if let Some(c) = self.main.find_child(name)? {
            return Ok(Some(Arc::new(self.main_node(c))));
        }
        match missing {
            MissingBehaviour::ThrowIfMissing => Err(Error::not_found(format!(
                "{}: no location {}",
                self.file_name(),
                path_to_string(&join(&self.path(), name))
            ))),
            MissingBehaviour::NullIfMissing => Ok(None),
            MissingBehaviour::CreateIfMissing => Ok(Some(self.create_child(name)?)),
        }
    }

    fn linked_child(
        &self,
        link: &Arc<Link>,
        target: &ScenePtr,
        name: &Name,
        inherited: BTreeSet<Name>,
    ) -> Result<Option<ScenePtr>> {
        let Some(child) = target.child(name, MissingBehaviour::NullIfMissing)? else {
            return Ok(None);
        };
        let mut ancestor_tags = inherited;
        ancestor_tags.extend(target.read_tags(TagFilter::LOCAL)?);
        Ok(Some(Arc::new(self.inside_node(Arc::clone(link), child, ancestor_tags))))
    }
}

fn join(path: &[Name], name: &Name) -> Path {
    let mut p = path.to_vec();
    p.push(name.clone());
    p
}

fn parse_compound(members: &BTreeMap<Name, Value>) -> Result<(String, Path, bool)> {
    let file = members
        .get(&KEYS.member_file_name)
        .ok_or_else(|| Error::corrupted("link attribute has no fileName"))?
        .as_str()?
        .to_string();
    let root = members
        .get(&KEYS.member_root)
        .ok_or_else(|| Error::corrupted("link attribute has no root"))?
        .as_names()?
        .to_vec();
    Ok((file, root, members.contains_key(&KEYS.member_time)))
}

impl fmt::Debug for LinkedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("LinkedScene");
        d.field("file", &self.main.file_name())
            .field("path", &self.path_string());
        if let Kind::Inside { link, .. } = &self.kind {
            d.field("link", &link.file);
        }
        d.finish()
    }
}

impl SceneInterface for LinkedScene {
    fn file_name(&self) -> &str {
        self.main.file_name()
    }

    fn name(&self) -> Name {
        match &self.kind {
            Kind::Main(_) => self.main.name(),
            Kind::Inside { target, .. } => target.name(),
        }
    }

    fn path(&self) -> Path {
        match &self.kind {
            Kind::Main(_) => self.main.path(),
            Kind::Inside { link, target, .. } => {
                let mut p = self.main.path();
                p.extend(target.path().into_iter().skip(link.root_depth));
                p
            }
        }
    }

    fn sample_times(&self, channel: &Channel) -> Result<SampleTimes> {
        match self.source()? {
            Source::Native => self.main.sample_times(channel),
            Source::LinkRoot(link) => match channel {
                Channel::Bound | Channel::Object => self.linked_times(&link, &link.target, channel),
                Channel::Transform | Channel::Attribute(_) => self.main.sample_times(channel),
            },
            Source::Inside(link, target) => self.linked_times(&link, &target, channel),
        }
    }

    fn has_bound(&self) -> Result<bool> {
        match self.source()? {
            Source::Native => self.main.has_bound(),
            Source::LinkRoot(link) => link.target.has_bound(),
            Source::Inside(_, target) => target.has_bound(),
        }
    }

    fn read_bound(&self, time: Chrono) -> Result<BBox3d> {
        match self.source()? {
            Source::Native => self.main.read_bound(time),
            Source::LinkRoot(link) => link.target.read_bound(self.remap(&link, time)?),
            Source::Inside(link, target) => target.read_bound(self.remap(&link, time)?),
        }
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()> {
        match self.kind {
            Kind::Main(_) => self.main.write_bound(bound, time),
            Kind::Inside { .. } => Err(self.read_only_err()),
        }
    }

    fn read_transform(&self, time: Chrono) -> Result<DMat4> {
        match self.source()? {
            Source::Native | Source::LinkRoot(_) => self.main.read_transform(time),
            Source::Inside(link, target) => target.read_transform(self.remap(&link, time)?),
        }
    }

    fn write_transform(&self, transform: &DMat4, time: Chrono) -> Result<()> {
        match self.kind {
            Kind::Main(_) => self.main.write_transform(transform, time),
            Kind::Inside { .. } => Err(self.read_only_err()),
        }
    }

    fn has_attribute(&self, name: &Name) -> Result<bool> {
        match &self.kind {
            Kind::Main(_) => Ok(!is_link_key(name) && self.main.has_attribute(name)?),
            Kind::Inside { target, .. } => target.has_attribute(name),
        }
    }

    fn attribute_names(&self) -> Result<Vec<Name>> {
        match &self.kind {
            Kind::Main(_) => {
                let mut names = self.main.attribute_names()?;
                names.retain(|n| !is_link_key(n));
                Ok(names)
            }
            Kind::Inside { target, .. } => target.attribute_names(),
        }
    }

    fn read_attribute(&self, name: &Name, time: Chrono) -> Result<Value> {
        match self.source()? {
            Source::Native | Source::LinkRoot(_) => {
                if is_link_key(name) {
                    return Err(Error::not_found(format!(
                        "{}: no attribute {name} at {}",
                        self.file_name(),
                        self.path_string()
                    )));
                }
                self.main.read_attribute(name, time)
            }
            Source::Inside(link, target) => target.read_attribute(name, self.remap(&link, time)?),
        }
    }

    fn write_attribute(&self, name: &Name, value: &Value, time: Chrono) -> Result<()> {
        if matches!(self.kind, Kind::Inside { .. }) {
            return Err(self.read_only_err());
        }
        if *name == KEYS.link {
            let members = value.as_compound()?;
            let (file, root, _) =
                parse_compound(members).map_err(|e| Error::invalid_arg(e.to_string()))?;
            let remap = members
                .get(&KEYS.member_time)
                .map(Value::as_double)
                .transpose()?;
            return self.write_link(&file, &root, remap, time);
        }
        if is_link_key(name) {
            return Err(Error::invalid_arg(format!(
                "{name} is maintained by the link layer, use write_link"
            )));
        }
        self.main.write_attribute(name, value, time)
    }

    fn has_tag(&self, name: &Name, filter: TagFilter) -> Result<bool> {
        match self.source()? {
            Source::Native => self.main.has_tag(name, filter),
            Source::LinkRoot(link) => Ok(self.main.has_tag(name, filter)?
                || link
                    .target
                    .has_tag(name, filter & (TagFilter::LOCAL | TagFilter::DESCENDANT))?),
            Source::Inside(_, target) => {
                if filter.contains(TagFilter::ANCESTOR) {
                    if let Kind::Inside { ancestor_tags, .. } = &self.kind {
                        if ancestor_tags.contains(name) {
                            return Ok(true);
                        }
                    }
                }
                target.has_tag(name, filter.difference(TagFilter::ANCESTOR))
            }
        }
    }

    fn read_tags(&self, filter: TagFilter) -> Result<Vec<Name>> {
        match self.source()? {
            Source::Native => self.main.read_tags(filter),
            Source::LinkRoot(link) => {
                let mut tags: BTreeSet<Name> = self.main.read_tags(filter)?.into_iter().collect();
                tags.extend(
                    link.target
                        .read_tags(filter & (TagFilter::LOCAL | TagFilter::DESCENDANT))?,
                );
                Ok(tags.into_iter().collect())
            }
            Source::Inside(_, target) => {
                let mut tags: BTreeSet<Name> = target
                    .read_tags(filter.difference(TagFilter::ANCESTOR))?
                    .into_iter()
                    .collect();
                if filter.contains(TagFilter::ANCESTOR) {
                    if let Kind::Inside { ancestor_tags, .. } = &self.kind {
                        tags.extend(ancestor_tags.iter().cloned());
                    }
                }
                Ok(tags.into_iter().collect())
            }
        }
    }

    fn write_tags(&self, tags: &[Name]) -> Result<()> {
        match self.kind {
            Kind::Main(_) => self.main.write_tags(tags),
            Kind::Inside { .. } => Err(self.read_only_err()),
        }
    }

    fn has_object(&self) -> Result<bool> {
        match self.source()? {
            Source::Native => self.main.has_object(),
            Source::LinkRoot(link) => link.target.has_object(),
            Source::Inside(_, target) => target.has_object(),
        }
    }

    fn read_object(&self, time: Chrono) -> Result<Value> {
        match self.source()? {
            Source::Native => self.main.read_object(time),
            Source::LinkRoot(link) => link.target.read_object(self.remap(&link, time)?),
            Source::Inside(link, target) => target.read_object(self.remap(&link, time)?),
        }
    }

    fn write_object(&self, object: &Value, time: Chrono) -> Result<()> {
        if matches!(self.kind, Kind::Inside { .. }) {
            return Err(self.read_only_err());
        }
        if self.is_link_root()? {
            return Err(Error::invalid_arg(format!(
                "{} is a link and cannot hold an object",
                self.path_string()
            )));
        }
        self.main.write_object(object, time)
    }

    fn child_names(&self) -> Result<Vec<Name>> {
        match self.source()? {
            Source::Native => self.main.child_names(),
            Source::LinkRoot(link) => {
                let mut names = link.target.child_names()?;
                for n in self.main.child_names()? {
                    if !names.contains(&n) {
                        names.push(n);
                    }
                }
                Ok(names)
            }
            Source::Inside(_, target) => target.child_names(),
        }
    }

    fn has_child(&self, name: &Name) -> Result<bool> {
        match self.source()? {
            Source::Native => self.main.has_child(name),
            Source::LinkRoot(link) => Ok(link.target.has_child(name)? || self.main.has_child(name)?),
            Source::Inside(_, target) => target.has_child(name),
        }
    }

    fn child(&self, name: &Name, missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        match self.source()? {
            Source::Native => self.main_child(name, missing),
            Source::LinkRoot(link) => {
                let inherited: BTreeSet<Name> = self
                    .main
                    .read_tags(TagFilter::ANCESTOR | TagFilter::LOCAL)?
                    .into_iter()
                    .collect();
                if let Some(c) = self.linked_child(&link, &link.target, name, inherited)? {
                    return Ok(Some(c));
                }
                self.main_child(name, missing)
            }
            Source::Inside(link, target) => {
                let inherited = match &self.kind {
                    Kind::Inside { ancestor_tags, .. } => (**ancestor_tags).clone(),
                    Kind::Main(_) => BTreeSet::new(),
                };
                match self.linked_child(&link, &target, name, inherited)? {
                    Some(c) => Ok(Some(c)),
                    None => match missing {
                        MissingBehaviour::NullIfMissing => Ok(None),
                        MissingBehaviour::CreateIfMissing => Err(self.read_only_err()),
                        MissingBehaviour::ThrowIfMissing => Err(Error::not_found(format!(
                            "{}: no location {}",
                            self.file_name(),
                            path_to_string(&join(&self.path(), name))
                        ))),
                    },
                }
            }
        }
    }

    fn create_child(&self, name: &Name) -> Result<ScenePtr> {
        if matches!(self.kind, Kind::Inside { .. }) {
            return Err(self.read_only_err());
        }
        if self.is_link_root()? {
            return Err(Error::invalid_arg(format!(
                "{} is a link and cannot have children",
                self.path_string()
            )));
        }
        Ok(Arc::new(self.main_node(self.main.create_typed_child(name)?)))
    }

    fn scene(&self, path: &[Name], missing: MissingBehaviour) -> Result<Option<ScenePtr>> {
        let mut node: ScenePtr = Arc::new(self.main_node(self.main.root()));
        for seg in path {
            node = match node.child(seg, missing)? {
                Some(c) => c,
                None => return Ok(None),
            };
        }
        Ok(Some(node))
    }

    fn hash(&self, kind: HashType, time: Chrono, h: &mut MurmurHash) -> Result<()> {
        if kind == HashType::Hierarchy {
            check_time(time)?;
            return hash_hierarchy(self, time, h);
        }
        match self.source()? {
            Source::Native => self.main.hash(kind, time, h),
            Source::LinkRoot(link) => match kind {
                HashType::Bound | HashType::Object => link.target.hash(kind, self.remap(&link, time)?, h),
                HashType::ChildNames => {
                    link.target.hash(kind, self.remap(&link, time)?, h)?;
                    self.main.hash(kind, time, h)
                }
                _ => self.main.hash(kind, time, h),
            },
            Source::Inside(link, target) => target.hash(kind, self.remap(&link, time)?, h),
        }
    }

    fn hash_set(&self, name: &Name, h: &mut MurmurHash) -> Result<()> {
        h.append_str(self.file_name());
        h.append_str(&self.path_string());
        match self.source()? {
            Source::Native => hash_set_members(self, name, h),
            Source::LinkRoot(link) => {
                h.append_u64(u64::from(self.main.has_tag(name, TagFilter::LOCAL)?));
                link.target.hash_set(name, h)
            }
            Source::Inside(_, target) => target.hash_set(name, h),
        }
    }
}
