//! Tag-driven tree walks.
//!
//! A location belongs to a set when it carries the set's tag locally. The
//! walk visits a location, records it if tagged, and descends only when the
//! location reports the tag among its descendant tags. The descendant
//! aggregate therefore has to be complete: a location under-reporting it
//! hides matches below it.
//!
//! - [`tagged_paths`] - serial walk over an explicit stack
//! - [`par_tagged_paths`] - rayon fan-out per child, partial results plus errors
//! - [`par_bound`] - subtree bound aggregation over the same fan-out

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::trace;

use super::interface::{SceneInterface, ScenePtr, TagFilter};
use crate::core::Path;
use crate::util::{BBox3d, Chrono, Error, Name, Result};

/// Counters collected during a walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Locations whose tags were queried.
    pub visited: usize,
    /// Locations whose subtree was skipped because the tag is not below them.
    pub pruned: usize,
}

#[derive(Default)]
struct Counters {
    visited: AtomicUsize,
    pruned: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WalkStats {
        WalkStats {
            visited: self.visited.load(Ordering::Relaxed),
            pruned: self.pruned.load(Ordering::Relaxed),
        }
    }
}

/// Result of a serial walk.
#[derive(Clone, Debug, Default)]
pub struct TaggedPaths {
    /// Matching paths relative to the walk root, in child enumeration order.
    pub paths: Vec<Path>,
    pub stats: WalkStats,
}

/// Result of a parallel walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Matching paths relative to the walk root, in child enumeration order.
    pub paths: Vec<Path>,
    /// Subtrees that could not be walked, with the reason.
    pub errors: Vec<(Path, Error)>,
    pub stats: WalkStats,
}

impl WalkReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of a parallel bound aggregation.
#[derive(Debug)]
pub struct BoundReport {
    /// Bound of the walk root's subtree in the root's local space.
    pub bound: BBox3d,
    /// Subtrees left out of the bound, with the reason.
    pub errors: Vec<(Path, Error)>,
}

fn child_path(path: &Path, name: &Name) -> Path {
    let mut p = Vec::with_capacity(path.len() + 1);
    p.extend_from_slice(path);
    p.push(name.clone());
    p
}

/// Test one location. Returns `true` if the walk must descend.
fn visit<S>(node: &S, tag: &Name, path: &Path, out: &mut Vec<Path>, counters: &Counters) -> Result<bool>
where
    S: SceneInterface + ?Sized,
{
    counters.visited.fetch_add(1, Ordering::Relaxed);
    if node.has_tag(tag, TagFilter::LOCAL)? {
        out.push(path.clone());
    }
    if !node.has_tag(tag, TagFilter::DESCENDANT)? {
        counters.pruned.fetch_add(1, Ordering::Relaxed);
        return Ok(false);
    }
    Ok(true)
}

/// Paths below (and including) `root` carrying `tag` locally.
///
/// Any failure aborts the walk.
pub fn tagged_paths<S>(root: &S, tag: &Name) -> Result<TaggedPaths>
where
    S: SceneInterface + ?Sized,
{
    let counters = Counters::default();
    let mut paths = Vec::new();
    let root_path: Path = Vec::new();

    let mut stack: Vec<(ScenePtr, Path)> = Vec::new();
    if visit(root, tag, &root_path, &mut paths, &counters)? {
        for name in root.child_names()?.iter().rev() {
            stack.push((root.child_or_err(name)?, child_path(&root_path, name)));
        }
    }
    while let Some((node, path)) = stack.pop() {
        if visit(node.as_ref(), tag, &path, &mut paths, &counters)? {
            for name in node.child_names()?.iter().rev() {
                stack.push((node.child_or_err(name)?, child_path(&path, name)));
            }
        }
    }

    let stats = counters.snapshot();
    trace!(tag = %tag, matches = paths.len(), ?stats, "tag walk finished");
    Ok(TaggedPaths { paths, stats })
}

#[derive(Default)]
struct Partial {
    paths: Vec<Path>,
    errors: Vec<(Path, Error)>,
}

impl Partial {
    fn append(&mut self, mut other: Partial) {
        self.paths.append(&mut other.paths);
        self.errors.append(&mut other.errors);
    }

    fn failed(path: Path, e: Error) -> Self {
        Self {
            paths: Vec::new(),
            errors: vec![(path, e)],
        }
    }
}

fn par_subtree<S>(node: &S, tag: &Name, path: Path, counters: &Counters) -> Partial
where
    S: SceneInterface + ?Sized,
{
    let mut partial = Partial::default();
    let descend = match visit(node, tag, &path, &mut partial.paths, counters) {
        Ok(d) => d,
        Err(e) => return Partial::failed(path, e),
    };
    if !descend {
        return partial;
    }
    let names = match node.child_names() {
        Ok(n) => n,
        Err(e) => {
            partial.errors.push((path, e));
            return partial;
        }
    };
    let children: Vec<Partial> = names
        .par_iter()
        .map(|name| {
            let cp = child_path(&path, name);
            match node.child_or_err(name) {
                Ok(child) => par_subtree(child.as_ref(), tag, cp, counters),
                Err(e) => Partial::failed(cp, e),
            }
        })
        .collect();
    for c in children {
        partial.append(c);
    }
    partial
}

/// Parallel [`tagged_paths`]. A failing subtree is reported in
/// [`WalkReport::errors`] while its siblings are still collected. When no
/// errors occur the paths equal the serial result, in the same order.
pub fn par_tagged_paths<S>(root: &S, tag: &Name) -> WalkReport
where
    S: SceneInterface + ?Sized,
{
    let counters = Counters::default();
    let partial = par_subtree(root, tag, Vec::new(), &counters);
    let stats = counters.snapshot();
    trace!(
        tag = %tag,
        matches = partial.paths.len(),
        errors = partial.errors.len(),
        ?stats,
        "parallel tag walk finished"
    );
    WalkReport {
        paths: partial.paths,
        errors: partial.errors,
        stats,
    }
}

fn par_subtree_bound<S>(node: &S, time: Chrono, path: Path) -> (BBox3d, Vec<(Path, Error)>)
where
    S: SceneInterface + ?Sized,
{
    let names = match node.child_names() {
        Ok(n) => n,
        Err(e) => return (BBox3d::EMPTY, vec![(path, e)]),
    };
    let parts: Vec<(BBox3d, Vec<(Path, Error)>)> = names
        .par_iter()
        .map(|name| {
            let cp = child_path(&path, name);
            let child = match node.child_or_err(name) {
                Ok(c) => c,
                Err(e) => return (BBox3d::EMPTY, vec![(cp, e)]),
            };
            match child_bound(child.as_ref(), time, cp.clone()) {
                Ok(r) => r,
                Err(e) => (BBox3d::EMPTY, vec![(cp, e)]),
            }
        })
        .collect();

    let mut bound = BBox3d::EMPTY;
    let mut errors = Vec::new();
    for (b, mut e) in parts {
        bound.expand_by_box(&b);
        errors.append(&mut e);
    }
    (bound, errors)
}

/// Bound of a child in its parent's space.
fn child_bound(child: &dyn SceneInterface, time: Chrono, path: Path) -> Result<(BBox3d, Vec<(Path, Error)>)> {
    let (local, errors) = if child.has_bound()? {
        (child.read_bound(time)?, Vec::new())
    } else {
        par_subtree_bound(child, time, path)
    };
    let xform = child.read_transform(time)?;
    Ok((local.transformed(&xform), errors))
}

/// Bound of everything below `root` at `time`, in `root`'s local space.
///
/// Children with a stored bound contribute it directly; others are
/// aggregated from their own children. Failing subtrees are skipped and
/// reported.
pub fn par_bound<S>(root: &S, time: Chrono) -> BoundReport
where
    S: SceneInterface + ?Sized,
{
    let (bound, errors) = par_subtree_bound(root, time, Vec::new());
    BoundReport { bound, errors }
}
