//! Configuration management with layered hierarchy
//!
//! Precedence, lowest first: built-in defaults, the global user file, the
//! installation's `.storyline/config.yaml`, then `STORYLINE_*` environment
//! variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::project::Project;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
    pub max_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".storyline/storyline.db"),
            max_connections: 100,
            busy_timeout_ms: 5000,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentConfig {
    /// Number of thread levels including the root (root=0)
    pub max_thread_levels: u32,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            max_thread_levels: 3,
        }
    }
}

impl CommentConfig {
    /// Deepest depth a reply may have
    pub fn max_depth(&self) -> i64 {
        i64::from(self.max_thread_levels.max(1)) - 1
    }
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub request_timeout_ms: u64,
    pub comments: CommentConfig,
    /// Default acting username for the CLI
    pub user: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            request_timeout_ms: 30_000,
            comments: CommentConfig::default(),
            user: None,
        }
    }
}

/// One layer as read from a YAML file; every field optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigLayer {
    pub database: DatabaseLayer,
    pub cache: CacheLayer,
    pub request_timeout_ms: Option<u64>,
    pub comments: CommentLayer,
    pub user: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseLayer {
    pub path: Option<PathBuf>,
    pub max_connections: Option<u32>,
    pub busy_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CacheLayer {
    pub enabled: Option<bool>,
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentLayer {
    pub max_thread_levels: Option<u32>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/storyline/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(layer) = Self::read_layer(&global_path) {
                config.merge(layer);
            }
        }

        // 3. Installation config (.storyline/config.yaml)
        if let Some(project) = project {
            if let Some(layer) = Self::read_layer(&project.config_path()) {
                config.merge(layer);
            }
        }

        // 4. Environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "storyline")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn read_layer(path: &Path) -> Option<ConfigLayer> {
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read config file");
                return None;
            }
        };
        match serde_yml::from_str::<ConfigLayer>(&contents) {
            Ok(layer) => Some(layer),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "ignoring malformed config file",
                );
                None
            }
        }
    }

    /// Merge another layer into this one (the layer takes precedence)
    pub fn merge(&mut self, other: ConfigLayer) {
        if let Some(path) = other.database.path {
            self.database.path = path;
        }
        if let Some(n) = other.database.max_connections {
            self.database.max_connections = n.max(1);
        }
        if let Some(ms) = other.database.busy_timeout_ms {
            self.database.busy_timeout_ms = ms;
        }
        if let Some(n) = other.database.max_retries {
            self.database.max_retries = n;
        }
        if let Some(enabled) = other.cache.enabled {
            self.cache.enabled = enabled;
        }
        if let Some(ttl) = other.cache.ttl_secs {
            self.cache.ttl_secs = ttl;
        }
        if let Some(n) = other.cache.max_entries {
            self.cache.max_entries = n;
        }
        if let Some(ms) = other.request_timeout_ms {
            self.request_timeout_ms = ms;
        }
        if let Some(levels) = other.comments.max_thread_levels {
            self.comments.max_thread_levels = levels.max(1);
        }
        if other.user.is_some() {
            self.user = other.user;
        }
    }

    /// Apply `STORYLINE_*` overrides through a lookup function
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("STORYLINE_DB") {
            self.database.path = PathBuf::from(db);
        }
        if let Some(user) = lookup("STORYLINE_USER") {
            if !user.trim().is_empty() {
                self.user = Some(user);
            }
        }
        if let Some(ttl) = lookup("STORYLINE_CACHE_TTL_SECS") {
            match ttl.trim().parse() {
                Ok(secs) => self.cache.ttl_secs = secs,
                Err(_) => tracing::warn!(value = %ttl, "ignoring invalid STORYLINE_CACHE_TTL_SECS"),
            }
        }
        if let Some(timeout) = lookup("STORYLINE_REQUEST_TIMEOUT_MS") {
            match timeout.trim().parse() {
                Ok(ms) => self.request_timeout_ms = ms,
                Err(_) => {
                    tracing::warn!(
                        value = %timeout,
                        "ignoring invalid STORYLINE_REQUEST_TIMEOUT_MS",
                    )
                }
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Database file, resolved against the installation root when relative
    pub fn database_path(&self, project: Option<&Project>) -> PathBuf {
        match project {
            Some(p) => p.resolve(&self.database.path),
            None => self.database.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = Config::default();
        assert_eq!(c.database.max_connections, 100);
        assert_eq!(c.cache.ttl_secs, 300);
        assert_eq!(c.request_timeout_ms, 30_000);
        assert_eq!(c.comments.max_depth(), 2);
        assert!(c.user.is_none());
    }

    #[test]
    fn test_yaml_layer_overrides_only_given_fields() {
        let layer: ConfigLayer = serde_yml::from_str(
            "cache:\n  ttl_secs: 60\ncomments:\n  max_thread_levels: 5\nuser: alice\n",
        )
        .unwrap();
        let mut c = Config::default();
        c.merge(layer);
        assert_eq!(c.cache.ttl_secs, 60);
        assert!(c.cache.enabled);
        assert_eq!(c.comments.max_depth(), 4);
        assert_eq!(c.user.as_deref(), Some("alice"));
        assert_eq!(c.database.max_retries, 3);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STORYLINE_DB", "/tmp/x.db"),
            ("STORYLINE_USER", "bob"),
            ("STORYLINE_CACHE_TTL_SECS", "10"),
            ("STORYLINE_REQUEST_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.database.path, PathBuf::from("/tmp/x.db"));
        assert_eq!(c.user.as_deref(), Some("bob"));
        assert_eq!(c.cache.ttl_secs, 10);
        assert_eq!(c.request_timeout_ms, 30_000);
    }
}
