//! Runtime configuration for scene containers and the shared scene cache.

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

/// Environment variable overriding [`CacheConfig::max_scenes`].
pub const ENV_MAX_SCENES: &str = "SCENECACHE_MAX_SCENES";
/// Environment variable overriding [`CacheConfig::compression_level`].
pub const ENV_COMPRESSION: &str = "SCENECACHE_COMPRESSION";
/// Environment variable overriding [`CacheConfig::use_mmap`].
pub const ENV_MMAP: &str = "SCENECACHE_MMAP";

/// Settings shared by file-backed containers and [`SharedScenes`](crate::scene::SharedScenes).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of scene files held open by a shared cache.
    pub max_scenes: usize,
    /// zlib level used when writing containers (0 = store).
    pub compression_level: u32,
    /// Memory-map container files on read instead of reading them into memory.
    pub use_mmap: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_scenes: 200,
            compression_level: 6,
            use_mmap: true,
        }
    }
}

impl CacheConfig {
    /// Defaults overridden by any `SCENECACHE_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = env_var(ENV_MAX_SCENES) {
            cfg.max_scenes = v
                .parse()
                .map_err(|_| Error::invalid_arg(format!("{ENV_MAX_SCENES}={v} is not a count")))?;
        }
        if let Some(v) = env_var(ENV_COMPRESSION) {
            cfg.compression_level = v
                .parse()
                .map_err(|_| Error::invalid_arg(format!("{ENV_COMPRESSION}={v} is not a level")))?;
        }
        if let Some(v) = env_var(ENV_MMAP) {
            cfg.use_mmap = parse_bool(&v)
                .ok_or_else(|| Error::invalid_arg(format!("{ENV_MMAP}={v} is not a boolean")))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse from JSON. Missing fields take their default.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| Error::invalid_arg(format!("config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::invalid_arg(format!("config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_scenes == 0 {
            return Err(Error::invalid_arg("max_scenes must be at least 1"));
        }
        if self.compression_level > 9 {
            return Err(Error::invalid_arg(format!(
                "compression level {} is out of range 0..=9",
                self.compression_level
            )));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.max_scenes, 200);
        assert_eq!(cfg.compression_level, 6);
        assert!(cfg.use_mmap);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_json_partial() {
        let cfg = CacheConfig::from_json_str(r#"{ "max_scenes": 4 }"#).expect("parse");
        assert_eq!(cfg.max_scenes, 4);
        assert_eq!(cfg.compression_level, 6);

        let round = CacheConfig::from_json_str(&cfg.to_json_string().expect("json")).expect("parse");
        assert_eq!(round, cfg);
    }

    #[test]
    fn test_json_rejects_invalid() {
        assert!(CacheConfig::from_json_str(r#"{ "max_scenes": 0 }"#).is_err());
        assert!(CacheConfig::from_json_str(r#"{ "compression_level": 12 }"#).is_err());
        assert!(CacheConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
