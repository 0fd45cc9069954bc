//! Scene layer - hierarchical scene locations over indexed storage.
//!
//! - [`SceneInterface`] - the location abstraction every backend implements
//! - [`SceneCache`] - locations stored in an [`IndexedIo`](crate::indexed::IndexedIo) container
//! - [`LinkedScene`] - link-resolving view splicing in other scene files
//! - [`SharedScenes`] - bounded LRU cache of open scene files
//! - [`create`] - open a scene file by extension (`scc`, `lscc`)
//! - [`walk`] - tag-pruned set queries and bound aggregation

mod cache;
mod factory;
mod interface;
mod linked;
mod shared;
pub mod walk;

pub use cache::{SceneCache, EXTENSION};
pub use factory::{create, open_container, register_creator, supported_extensions, Creator, LINKED_EXTENSION};
pub use interface::{
    hash_hierarchy, Channel, HashType, MissingBehaviour, SceneInterface, ScenePtr, TagFilter,
};
pub use linked::{
    LinkedScene, FILE_NAME_LINK_ATTRIBUTE, LINK_ATTRIBUTE, LINK_LOCATIONS_ATTRIBUTE,
    ROOT_LINK_ATTRIBUTE, TIME_LINK_ATTRIBUTE,
};
pub use shared::{Opener, SharedScenes};
pub use walk::{par_bound, par_tagged_paths, tagged_paths, BoundReport, TaggedPaths, WalkReport, WalkStats};
