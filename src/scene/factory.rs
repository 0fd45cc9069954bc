//! Scene file formats keyed by file extension.
//!
//! [`create`] opens a scene file with whatever creator is registered for
//! its extension. Two formats are built in, both stored in scene cache
//! containers:
//! - `scc` opens as a plain [`SceneCache`]
//! - `lscc` opens as a [`LinkedScene`] over the global [`SharedScenes`]
//!
//! [`register_creator`] adds or replaces formats at runtime.

use std::collections::BTreeMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use super::cache::{SceneCache, EXTENSION};
use super::interface::ScenePtr;
use super::linked::LinkedScene;
use super::shared::SharedScenes;
use crate::config::CacheConfig;
use crate::indexed::OpenMode;
use crate::util::{Error, Result};

/// Extension of scene cache files opened as linked scenes.
pub const LINKED_EXTENSION: &str = "lscc";

/// Opens a scene file of one format.
pub type Creator = Arc<dyn Fn(&str, OpenMode) -> Result<ScenePtr> + Send + Sync>;

struct Format {
    /// READ / WRITE / APPEND modes the format can be opened with.
    modes: OpenMode,
    creator: Creator,
    /// Stored in a scene cache container, so [`SharedScenes`] can hold it.
    container: bool,
}

static FORMATS: Lazy<RwLock<BTreeMap<String, Format>>> = Lazy::new(|| {
    let all = OpenMode::READ | OpenMode::WRITE | OpenMode::APPEND;
    let mut formats = BTreeMap::new();
    formats.insert(
        EXTENSION.to_string(),
        Format {
            modes: all,
            creator: Arc::new(|file: &str, mode: OpenMode| -> Result<ScenePtr> {
                let scene = SceneCache::open(file, mode, &CacheConfig::from_env()?)?;
                Ok(Arc::new(scene) as ScenePtr)
            }),
            container: true,
        },
    );
    formats.insert(
        LINKED_EXTENSION.to_string(),
        Format {
            modes: all,
            creator: Arc::new(|file: &str, mode: OpenMode| -> Result<ScenePtr> {
                let scene = LinkedScene::open(file, mode, SharedScenes::global())?;
                Ok(Arc::new(scene) as ScenePtr)
            }),
            container: true,
        },
    );
    RwLock::new(formats)
});

fn extension_of(file: &str) -> Result<&str> {
    FsPath::new(file)
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| Error::invalid_arg(format!("{file}: no file extension")))
}

fn unsupported(file: &str, mode: OpenMode) -> Error {
    Error::invalid_arg(format!("{file}: no scene format for this extension with mode {mode:?}"))
}

/// Register `creator` for files ending in `.extension`, replacing any
/// earlier registration. `modes` lists the access modes it supports.
pub fn register_creator(extension: &str, modes: OpenMode, creator: Creator) {
    let extension = extension.trim_start_matches('.').to_string();
    debug!(extension = %extension, ?modes, "scene format registered");
    FORMATS.write().insert(
        extension,
        Format {
            modes: modes.access(),
            creator,
            container: false,
        },
    );
}

/// Extensions that can be opened with the access part of `mode`.
pub fn supported_extensions(mode: OpenMode) -> Vec<String> {
    let access = mode.access();
    FORMATS
        .read()
        .iter()
        .filter(|(_, f)| f.modes.contains(access))
        .map(|(ext, _)| ext.clone())
        .collect()
}

/// Open `file` with the creator registered for its extension.
pub fn create(file: &str, mode: OpenMode) -> Result<ScenePtr> {
    mode.validate()?;
    let creator = {
        let formats = FORMATS.read();
        match formats.get(extension_of(file)?) {
            Some(f) if f.modes.contains(mode.access()) => Arc::clone(&f.creator),
            _ => return Err(unsupported(file, mode)),
        }
    };
    creator(file, mode)
}

/// Open `file` as a scene cache container. Its extension must name a
/// registered container format supporting `mode`.
pub fn open_container(file: &str, mode: OpenMode, config: &CacheConfig) -> Result<SceneCache> {
    mode.validate()?;
    let supported = FORMATS
        .read()
        .get(extension_of(file)?)
        .is_some_and(|f| f.container && f.modes.contains(mode.access()));
    if !supported {
        return Err(unsupported(file, mode));
    }
    SceneCache::open(file, mode, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneInterface;
    use crate::util::Name;

    #[test]
    fn test_builtin_extensions() {
        let exts = supported_extensions(OpenMode::READ);
        assert!(exts.contains(&"scc".to_string()));
        assert!(exts.contains(&"lscc".to_string()));
        assert!(supported_extensions(OpenMode::WRITE).contains(&"lscc".to_string()));
    }

    #[test]
    fn test_unknown_extension() {
        assert!(matches!(create("shot.abc", OpenMode::READ), Err(Error::InvalidArgument(_))));
        assert!(matches!(create("shot", OpenMode::READ), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            open_container("shot.abc", OpenMode::READ, &CacheConfig::default()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_registered_creator() {
        register_creator(
            ".memscene",
            OpenMode::READ,
            Arc::new(|file: &str, _mode: OpenMode| -> Result<ScenePtr> {
                let scene = SceneCache::in_memory(file)?;
                scene.create_typed_child(&Name::new("a"))?;
                Ok(Arc::new(scene.snapshot()?) as ScenePtr)
            }),
        );
        assert!(supported_extensions(OpenMode::READ).contains(&"memscene".to_string()));
        assert!(!supported_extensions(OpenMode::WRITE).contains(&"memscene".to_string()));

        let scene = create("x.memscene", OpenMode::READ).expect("create");
        assert_eq!(scene.child_names().expect("children"), vec![Name::new("a")]);
        assert!(create("x.memscene", OpenMode::WRITE).is_err());
        // not a container format
        assert!(open_container("x.memscene", OpenMode::READ, &CacheConfig::default()).is_err());
    }

    #[test]
    fn test_create_by_extension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("plain.scc").to_string_lossy().into_owned();
        let scene = create(&file, OpenMode::WRITE).expect("create");
        scene.create_child(&Name::new("a")).expect("child");
        drop(scene);

        let scene = create(&file, OpenMode::READ).expect("read");
        assert_eq!(scene.child_names().expect("children"), vec![Name::new("a")]);
    }
}
