//! Configuration structures for livegit.
//!
//! This module provides configuration types for all components of the pipeline:
//!
//! - [`WatchConfig`] - Watched tree, debounce window, ignore file
//! - [`MirrorConfig`] - Workspace naming and publish retry policy
//! - [`ServeConfig`] - Listen address and URL prefix
//! - [`Config`] - Root configuration combining all settings
//!
//! Every component receives its section by value at construction; nothing is
//! read from process-wide state after startup.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for the change watcher.
///
/// # Examples
///
/// ```
/// use lg_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 500);
/// assert_eq!(config.ignore_file, ".gitignore");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Root of the watched tree.
    pub root: Utf8PathBuf,

    /// Debounce window in milliseconds.
    ///
    /// Events arriving within this window of the first event of a batch are
    /// coalesced into that batch.
    pub debounce_ms: u64,

    /// Name of the ignore file read from the watched root.
    pub ignore_file: String,

    /// Capacity of the channel between the filesystem watcher and the batcher.
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// Returns the debounce window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Returns the path of the ignore file under the watched root.
    #[must_use]
    pub fn ignore_path(&self) -> Utf8PathBuf {
        self.root.join(&self.ignore_file)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("."),
            debounce_ms: 500,
            ignore_file: ".gitignore".to_owned(),
            channel_capacity: 1024,
        }
    }
}

/// Configuration for the mirror workspace and publisher.
///
/// # Examples
///
/// ```
/// use lg_core::MirrorConfig;
///
/// let config = MirrorConfig::default();
/// assert_eq!(config.workspace_prefix, "livegit__");
/// assert_eq!(config.publish_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Prefix for the temporary workspace directory name.
    pub workspace_prefix: String,

    /// Number of attempts made for each publish before reporting failure.
    pub publish_attempts: u32,

    /// Backoff between publish attempts, multiplied by the attempt number.
    pub retry_backoff_ms: u64,
}

impl MirrorConfig {
    /// Returns the base retry backoff as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            workspace_prefix: "livegit__".to_owned(),
            publish_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

/// Configuration for the HTTP server exposing the published repository.
///
/// # Examples
///
/// ```
/// use lg_core::ServeConfig;
///
/// let config = ServeConfig {
///     prefix: "/user/module".to_owned(),
///     ..ServeConfig::default()
/// };
/// assert_eq!(config.port, 8000);
/// assert_eq!(config.normalized_prefix(), "/user/module/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Address to bind.
    pub host: String,

    /// Port to bind.
    pub port: u16,

    /// URL prefix under which the published repository is exposed.
    pub prefix: String,
}

impl ServeConfig {
    /// Returns the prefix with exactly one leading and one trailing slash.
    #[must_use]
    pub fn normalized_prefix(&self) -> String {
        let trimmed = self.prefix.trim_matches('/');
        if trimmed.is_empty() {
            "/".to_owned()
        } else {
            format!("/{trimmed}/")
        }
    }

    /// Returns the `host:port` string used for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            prefix: "/".to_owned(),
        }
    }
}

/// Root configuration for livegit.
///
/// # Examples
///
/// ```
/// use lg_core::Config;
///
/// let config = Config::default();
/// let json = serde_json::to_string_pretty(&config).unwrap();
/// assert!(json.contains("debounce_ms"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Change watcher configuration.
    pub watch: WatchConfig,

    /// Mirror and publisher configuration.
    pub mirror: MirrorConfig,

    /// HTTP server configuration.
    pub serve: ServeConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Fields missing from the file keep their default values.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Validates the configuration.
    ///
    /// Checks that the watched root is an existing directory and that the
    /// numeric and prefix options are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.watch.root;
        if !root.exists() {
            return Err(ConfigError::MissingDirectory(root.clone()));
        }
        if !root.is_dir() {
            return Err(ConfigError::invalid_path(root.clone(), "not a directory"));
        }
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid_option(
                "debounce_ms",
                "must be greater than zero",
            ));
        }
        if self.watch.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "channel_capacity",
                "must be greater than zero",
            ));
        }
        if self.mirror.publish_attempts == 0 {
            return Err(ConfigError::invalid_option(
                "publish_attempts",
                "must be at least one",
            ));
        }
        if !self.serve.prefix.starts_with('/') {
            return Err(ConfigError::invalid_option(
                "prefix",
                format!("must start with '/', got '{}'", self.serve.prefix),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.watch.root =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp dir");
        config
    }

    #[test]
    fn test_watch_config_defaults() {
        let config = WatchConfig::default();
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.debounce_window(), Duration::from_millis(500));
        assert_eq!(config.ignore_path(), Utf8PathBuf::from("./.gitignore"));
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = ServeConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.normalized_prefix(), "/");
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_normalized_prefix() {
        let mut config = ServeConfig::default();
        for (raw, expected) in [
            ("/", "/"),
            ("", "/"),
            ("/user/module", "/user/module/"),
            ("/user/module/", "/user/module/"),
            ("//repo//", "/repo/"),
        ] {
            config.prefix = raw.to_owned();
            assert_eq!(config.normalized_prefix(), expected, "prefix {raw:?}");
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"serve": {"port": 9000}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.serve.port, 9000);
        assert_eq!(config.serve.prefix, "/");
        assert_eq!(config.watch.debounce_ms, 500);
        assert_eq!(config.mirror.publish_attempts, 3);
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("livegit.json");
        std::fs::write(&path, r#"{"watch": {"debounce_ms": 50}}"#).unwrap();

        let path = Utf8PathBuf::from_path_buf(path).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.watch.debounce_ms, 50);
    }

    #[test]
    fn test_from_json_file_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let path = Utf8PathBuf::from_path_buf(path).unwrap();
        let result = Config::from_json_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate_accepts_defaults_on_existing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(config_for(&dir).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_root() {
        let mut config = Config::default();
        config.watch.root = Utf8PathBuf::from("/nonexistent/livegit/root");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingDirectory(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir);
        config.watch.debounce_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_validate_rejects_relative_prefix() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir);
        config.serve.prefix = "user/module".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prefix"));
    }

    #[test]
    fn test_validate_rejects_zero_publish_attempts() {
        let dir = TempDir::new().unwrap();
        let mut config = config_for(&dir);
        config.mirror.publish_attempts = 0;
        assert!(config.validate().is_err());
    }
}
