//! Bounded cache of open scene files.
//!
//! [`SharedScenes`] maps file names to open [`SceneCache`] roots so that
//! repeated lookups of one file (frame-by-frame writers, link resolution)
//! reuse a single handle. At most [`max_scenes`](SharedScenes::max_scenes)
//! files are open at once; when room is needed the least recently used
//! entry that nobody else holds a handle to is finalized and dropped.
//!
//! A file evicted while open for writing is reopened in APPEND mode when it
//! is requested again, so later frames are added to what was already
//! written instead of replacing it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::cache::SceneCache;
use super::factory;
use crate::config::CacheConfig;
use crate::indexed::OpenMode;
use crate::util::{Error, Result};

/// Opens a scene file on a cache miss.
pub type Opener = Arc<dyn Fn(&str, OpenMode) -> Result<SceneCache> + Send + Sync>;

struct Entry {
    scene: SceneCache,
    mode: OpenMode,
    last_used: u64,
}

impl Entry {
    /// Held by someone besides the cache.
    fn is_pinned(&self) -> bool {
        self.scene.handle_count() > 1
    }
}

struct Registry {
    entries: HashMap<String, Entry>,
    /// Files evicted while writable. Cleared by an explicit close.
    written: HashSet<String>,
    max_scenes: usize,
    tick: u64,
}

impl Registry {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn pinned(&self) -> usize {
        self.entries.values().filter(|e| e.is_pinned()).count()
    }

    /// Least recently used unpinned entry.
    fn lru_victim(&self) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_pinned())
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone())
    }

    fn evict(&mut self, file: &str) {
        if let Some(entry) = self.entries.remove(file) {
            debug!(file, "evicting scene");
            if entry.mode.is_writable() {
                self.written.insert(file.to_string());
            }
            if let Err(e) = entry.scene.close() {
                warn!(file, error = %e, "failed to close evicted scene");
            }
        }
    }

    /// Mode to open `file` with when `mode` is asked for. Writing to a file
    /// that was evicted mid-write continues it.
    fn resume_mode(&self, file: &str, mode: OpenMode) -> OpenMode {
        if mode.contains(OpenMode::WRITE) && self.written.contains(file) {
            mode.difference(OpenMode::WRITE) | OpenMode::APPEND
        } else {
            mode
        }
    }

    /// Fail with `Capacity` unless evicting unpinned entries can bring the
    /// count down to `limit`. Evicts nothing.
    fn check_room(&self, limit: usize) -> Result<()> {
        let pinned = self.pinned();
        if pinned > limit {
            return Err(Error::Capacity {
                pinned,
                max: self.max_scenes,
            });
        }
        Ok(())
    }

    /// Evict unpinned entries until at most `limit` remain.
    fn shrink_to(&mut self, limit: usize) -> Result<()> {
        while self.entries.len() > limit {
            match self.lru_victim() {
                Some(victim) => self.evict(&victim),
                None => {
                    return Err(Error::Capacity {
                        pinned: self.pinned(),
                        max: self.max_scenes,
                    })
                }
            }
        }
        Ok(())
    }
}

/// Shared, bounded registry of open scene files.
pub struct SharedScenes {
    inner: Mutex<Registry>,
    opener: Opener,
    default_mode: OpenMode,
}

static GLOBAL: Lazy<Arc<SharedScenes>> = Lazy::new(|| {
    let config = CacheConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring scene cache environment settings");
        CacheConfig::default()
    });
    Arc::new(SharedScenes::new(&config))
});

impl SharedScenes {
    /// Cache opening files from disk with `config`. File extensions must be
    /// registered scene container formats.
    pub fn new(config: &CacheConfig) -> Self {
        let cfg = config.clone();
        let opener: Opener =
            Arc::new(move |file: &str, mode: OpenMode| factory::open_container(file, mode, &cfg));
        Self::with_opener(config.max_scenes, opener)
    }

    /// Cache with a custom opener. A zero capacity is raised to one.
    pub fn with_opener(max_scenes: usize, opener: Opener) -> Self {
        Self {
            inner: Mutex::new(Registry {
                entries: HashMap::new(),
                written: HashSet::new(),
                max_scenes: max_scenes.max(1),
                tick: 0,
            }),
            opener,
            default_mode: OpenMode::READ,
        }
    }

    /// Process-wide default cache, configured from the environment.
    pub fn global() -> Arc<SharedScenes> {
        Arc::clone(&GLOBAL)
    }

    /// Handle for `file`, opened in the mode it was last used with. Files
    /// evicted while being written are reopened for appending, anything
    /// else for reading.
    pub fn get(&self, file: &str) -> Result<SceneCache> {
        let mut reg = self.inner.lock();
        let mode = match reg.entries.get(file) {
            Some(e) => e.mode,
            None if reg.written.contains(file) => OpenMode::APPEND,
            None => self.default_mode,
        };
        self.get_locked(&mut reg, file, mode)
    }

    /// Handle for `file` in `mode`. An open entry with another mode is
    /// reopened if nobody holds it, otherwise this fails. WRITE on a file
    /// evicted while being written opens it for appending.
    pub fn get_with_mode(&self, file: &str, mode: OpenMode) -> Result<SceneCache> {
        mode.validate()?;
        let mut reg = self.inner.lock();
        let mode = reg.resume_mode(file, mode);
        self.get_locked(&mut reg, file, mode)
    }

    fn get_locked(&self, reg: &mut Registry, file: &str, mode: OpenMode) -> Result<SceneCache> {
        let tick = reg.next_tick();
        // Closed through a handle rather than through the cache
        if reg.entries.get(file).is_some_and(|e| e.scene.is_closed()) {
            reg.entries.remove(file);
        }
        if let Some(entry) = reg.entries.get_mut(file) {
            if entry.mode.access() == mode.access() {
                entry.last_used = tick;
                return Ok(entry.scene.clone());
            }
            if entry.is_pinned() {
                return Err(Error::invalid_arg(format!(
                    "{file} is in use with mode {:?}, cannot reopen with {mode:?}",
                    entry.mode
                )));
            }
            reg.evict(file);
        }

        let limit = reg.max_scenes - 1;
        reg.check_room(limit)?;
        let scene = (self.opener)(file, mode)?;
        reg.shrink_to(limit)?;
        debug!(file, ?mode, open = reg.entries.len() + 1, "scene opened");
        reg.entries.insert(
            file.to_string(),
            Entry {
                scene: scene.clone(),
                mode,
                last_used: tick,
            },
        );
        Ok(scene)
    }

    /// Finalize and drop the entry for `file`. Returns `false` if it was not open.
    pub fn close(&self, file: &str) -> Result<bool> {
        let entry = {
            let mut reg = self.inner.lock();
            reg.written.remove(file);
            reg.entries.remove(file)
        };
        match entry {
            Some(e) => {
                debug!(file, "closing scene");
                e.scene.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finalize and drop every entry. All entries are closed even if some
    /// fail; the first failure is returned.
    pub fn close_all(&self) -> Result<()> {
        let entries: Vec<(String, Entry)> = {
            let mut reg = self.inner.lock();
            reg.written.clear();
            reg.entries.drain().collect()
        };
        let mut first_err = None;
        for (file, e) in entries {
            if let Err(err) = e.scene.close() {
                warn!(file = %file, error = %err, "failed to close scene");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Same as [`close_all`](Self::close_all).
    pub fn clear(&self) -> Result<()> {
        self.close_all()
    }

    pub fn max_scenes(&self) -> usize {
        self.inner.lock().max_scenes
    }

    /// Change the capacity, evicting unpinned entries beyond it right away.
    /// Fails with `Capacity`, leaving the capacity unchanged, when more than
    /// `n` entries are pinned.
    pub fn set_max_scenes(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(Error::invalid_arg("max scenes must be at least 1"));
        }
        let mut reg = self.inner.lock();
        let pinned = reg.pinned();
        if pinned > n {
            return Err(Error::Capacity { pinned, max: n });
        }
        reg.max_scenes = n;
        reg.shrink_to(n)
    }

    pub fn num_scenes(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// `true` if `file` is currently open in this cache.
    pub fn contains(&self, file: &str) -> bool {
        self.inner.lock().entries.contains_key(file)
    }
}

impl Drop for SharedScenes {
    fn drop(&mut self) {
        if let Err(e) = self.close_all() {
            warn!(error = %e, "failed to close shared scenes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexed::MemoryIndexedIo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory_cache(max: usize) -> (SharedScenes, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let opener: Opener = Arc::new(move |file: &str, _mode: OpenMode| {
            counter.fetch_add(1, Ordering::SeqCst);
            SceneCache::in_memory(file)
        });
        (SharedScenes::with_opener(max, opener), opens)
    }

    #[test]
    fn test_lru_eviction() {
        let (cache, opens) = memory_cache(2);
        for f in ["x", "y", "z"] {
            cache.get(f).expect("get");
        }
        assert_eq!(cache.num_scenes(), 2);
        assert!(!cache.contains("x"));
        assert_eq!(opens.load(Ordering::SeqCst), 3);

        cache.get("x").expect("reopen");
        assert_eq!(opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_identity() {
        let (cache, opens) = memory_cache(4);
        let a = cache.get("x").expect("get");
        let b = cache.get("x").expect("get");
        assert!(a.same_archive(&b));
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pinned_not_evicted() {
        let (cache, _) = memory_cache(1);
        let held = cache.get("x").expect("get");
        assert!(matches!(cache.get("y"), Err(Error::Capacity { pinned: 1, max: 1 })));
        drop(held);
        cache.get("y").expect("room after release");
        assert_eq!(cache.num_scenes(), 1);
    }

    #[test]
    fn test_set_max_scenes() {
        let (cache, _) = memory_cache(3);
        let held = cache.get("a").expect("get");
        cache.get("b").expect("get");
        cache.get("c").expect("get");

        cache.set_max_scenes(1).expect("shrink");
        assert_eq!(cache.num_scenes(), 1);
        assert!(cache.contains("a"));

        let held2 = cache.get_with_mode("b", OpenMode::WRITE);
        assert!(matches!(held2, Err(Error::Capacity { .. })));

        assert!(cache.set_max_scenes(0).is_err());
        drop(held);
    }

    #[test]
    fn test_shrink_below_pinned_keeps_max() {
        let (cache, _) = memory_cache(3);
        let _a = cache.get("a").expect("get");
        let _b = cache.get("b").expect("get");
        assert!(matches!(
            cache.set_max_scenes(1),
            Err(Error::Capacity { pinned: 2, max: 1 })
        ));
        assert_eq!(cache.max_scenes(), 3);
        assert!(cache.num_scenes() <= cache.max_scenes());
    }

    #[test]
    fn test_evicted_writer_resumes_in_append() {
        let modes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&modes);
        let opener: Opener = Arc::new(move |file: &str, mode: OpenMode| {
            seen.lock().push((file.to_string(), mode));
            SceneCache::from_io(Box::new(MemoryIndexedIo::new(file, mode)?))
        });
        let cache = SharedScenes::with_opener(1, opener);

        cache.get_with_mode("a", OpenMode::WRITE).expect("write a");
        cache.get_with_mode("b", OpenMode::WRITE).expect("write b evicts a");
        let a = cache.get("a").expect("a again");
        assert_eq!(a.open_mode(), OpenMode::APPEND);
        drop(a);
        let a = cache.get_with_mode("a", OpenMode::WRITE).expect("write a again");
        assert_eq!(a.open_mode(), OpenMode::APPEND);
        drop(a);

        // an explicit close ends the write session
        cache.close("a").expect("close");
        let a = cache.get_with_mode("a", OpenMode::WRITE).expect("fresh write");
        assert_eq!(a.open_mode(), OpenMode::WRITE);

        let modes: Vec<OpenMode> = modes.lock().iter().map(|(_, m)| *m).collect();
        assert_eq!(
            modes,
            vec![OpenMode::WRITE, OpenMode::WRITE, OpenMode::APPEND, OpenMode::WRITE]
        );
    }

    #[test]
    fn test_failed_open_keeps_entries() {
        let opener: Opener = Arc::new(|file: &str, _mode: OpenMode| {
            if file == "missing" {
                return Err(Error::not_found(file.to_string()));
            }
            SceneCache::in_memory(file)
        });
        let cache = SharedScenes::with_opener(1, opener);
        cache.get("a").expect("get");
        assert!(matches!(cache.get("missing"), Err(Error::PathNotFound(_))));
        assert!(cache.contains("a"));
        assert_eq!(cache.num_scenes(), 1);
    }

    #[test]
    fn test_close() {
        let (cache, opens) = memory_cache(2);
        let a = cache.get("a").expect("get");
        assert!(cache.close("a").expect("close"));
        assert!(a.is_closed());
        assert!(!cache.close("a").expect("close again"));
        cache.get("a").expect("reopen");
        assert_eq!(opens.load(Ordering::SeqCst), 2);
        cache.close_all().expect("close all");
        assert_eq!(cache.num_scenes(), 0);
    }
}
