//! # scenecache
//!
//! Hierarchical scene caches with linked scenes.
//!
//! A scene is a tree of named locations. Each location carries a bound, a
//! transform, attributes and an optional object, all sampled over time,
//! plus tags that group locations into sets. Scenes are stored in a single
//! compressed container file per scene and can link subtrees of other scene
//! files into themselves.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (names, errors, bounds)
//! - [`core`] - Paths, path matchers, values and sample times
//! - [`config`] - Cache configuration
//! - [`indexed`] - Hierarchical key/value containers
//! - [`scene`] - Scene locations, links, the shared file cache and set walks
//!
//! ## Example
//!
//! ```ignore
//! use scenecache::prelude::*;
//!
//! let shared = SharedScenes::global();
//! let scene = LinkedScene::open("shot.scc", OpenMode::READ, shared)?;
//! let chars = scene.read_set(&Name::new("characters"), true)?;
//! for path in chars.path_strings() {
//!     println!("{path}");
//! }
//! ```

pub mod util;
pub mod core;
pub mod config;
pub mod indexed;
pub mod scene;

// Re-export commonly used types
pub use util::{Error, ErrorKind, Name, Result};
pub use scene::{LinkedScene, SceneCache, SceneInterface, SharedScenes};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::CacheConfig;
    pub use crate::core::{path_to_string, string_to_path, Path, PathMatcher, Value};
    pub use crate::indexed::OpenMode;
    pub use crate::scene::{
        Channel, LinkedScene, MissingBehaviour, SceneCache, SceneInterface, ScenePtr,
        SharedScenes, TagFilter,
    };
    pub use crate::util::{BBox3d, Chrono, DMat4, DVec3, Error, Name, Result};
}
