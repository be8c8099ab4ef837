//! Configuration module for KeepSync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DatasetId;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for KeepSync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub cleanup: CleanupConfig,
    pub validation: ValidationConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

/// Where device markers are stored on the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerScope {
    /// One marker per (dataset, owner).
    #[default]
    PerOwner,
    /// One marker per dataset, shared by every owner.
    PerDataset,
}

/// Synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Milliseconds to wait after a local change before syncing (debounce).
    pub debounce_delay_ms: u64,
    /// Marker timestamps closer than this are treated as equal.
    pub clock_skew_tolerance_ms: u64,
    /// Scope of the remote device marker.
    pub marker_scope: MarkerScope,
    /// Run a garbage-collection pass at the end of every sync cycle.
    pub cleanup_after_sync: bool,
}

/// Garbage-collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Records not read for this many seconds expire.
    pub default_ttl_secs: u64,
    /// Per-dataset TTL overrides, in seconds.
    pub dataset_ttl_secs: HashMap<String, u64>,
    /// Datasets swept by a full `clean_up` call.
    pub datasets: Vec<String>,
    /// Dataset whose record keys are the valid parents of other records.
    pub parent_dataset: Option<String>,
    /// Remove private records whose parent no longer exists.
    pub orphan_cleanup: bool,
}

/// Payload validation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Dataset name to required dot-separated field paths.
    pub required_fields: HashMap<String, Vec<String>>,
}

/// Local database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
}

/// Remote object store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the blob store. `None` disables the HTTP adapter.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/keepsync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("keepsync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

impl CleanupConfig {
    /// Time-to-live for records of `dataset`.
    pub fn ttl_for(&self, dataset: &DatasetId) -> Duration {
        let secs = self
            .dataset_ttl_secs
            .get(dataset.as_str())
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_delay_ms: 2_000,
            clock_skew_tolerance_ms: 1_000,
            marker_scope: MarkerScope::PerOwner,
            cleanup_after_sync: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 30 * 24 * 60 * 60,
            dataset_ttl_secs: HashMap::new(),
            datasets: Vec::new(),
            parent_dataset: None,
            orphan_cleanup: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("~/.local/share"))
                .join("keepsync")
                .join("records.db"),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.debounce_delay_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["pretty", "json"];

fn check_dataset(errors: &mut Vec<ValidationError>, field: String, name: &str) {
    if let Err(e) = DatasetId::new(name) {
        errors.push(ValidationError {
            field,
            message: e.to_string(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.debounce_delay_ms == 0 {
            errors.push(ValidationError {
                field: "sync.debounce_delay_ms".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.sync.clock_skew_tolerance_ms == 0 {
            errors.push(ValidationError {
                field: "sync.clock_skew_tolerance_ms".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- cleanup ---
        if self.cleanup.default_ttl_secs == 0 {
            errors.push(ValidationError {
                field: "cleanup.default_ttl_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        for (name, ttl) in &self.cleanup.dataset_ttl_secs {
            check_dataset(&mut errors, format!("cleanup.dataset_ttl_secs.{name}"), name);
            if *ttl == 0 {
                errors.push(ValidationError {
                    field: format!("cleanup.dataset_ttl_secs.{name}"),
                    message: "must be greater than 0".into(),
                });
            }
        }
        for name in &self.cleanup.datasets {
            check_dataset(&mut errors, "cleanup.datasets".into(), name);
        }
        match self.cleanup.parent_dataset {
            Some(ref parent) => {
                check_dataset(&mut errors, "cleanup.parent_dataset".into(), parent);
            }
            None if self.cleanup.orphan_cleanup => {
                errors.push(ValidationError {
                    field: "cleanup.parent_dataset".into(),
                    message: "required when cleanup.orphan_cleanup is enabled".into(),
                });
            }
            None => {}
        }

        // --- validation ---
        for (name, paths) in &self.validation.required_fields {
            check_dataset(
                &mut errors,
                format!("validation.required_fields.{name}"),
                name,
            );
            if paths.iter().any(|p| p.split('.').any(str::is_empty)) {
                errors.push(ValidationError {
                    field: format!("validation.required_fields.{name}"),
                    message: "field paths must not contain empty segments".into(),
                });
            }
        }

        // --- remote ---
        if self.remote.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(ref url) = self.remote.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError {
                    field: "remote.base_url".into(),
                    message: format!("must be an http(s) URL, got '{url}'"),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid log level '{}'; expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid log format '{}'; expected one of: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default()`] and lets callers override individual
/// fields before calling [`build`](ConfigBuilder::build).
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- sync ---

    pub fn debounce_delay_ms(mut self, ms: u64) -> Self {
        self.config.sync.debounce_delay_ms = ms;
        self
    }

    pub fn clock_skew_tolerance_ms(mut self, ms: u64) -> Self {
        self.config.sync.clock_skew_tolerance_ms = ms;
        self
    }

    pub fn marker_scope(mut self, scope: MarkerScope) -> Self {
        self.config.sync.marker_scope = scope;
        self
    }

    pub fn cleanup_after_sync(mut self, enabled: bool) -> Self {
        self.config.sync.cleanup_after_sync = enabled;
        self
    }

    // --- cleanup ---

    pub fn default_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cleanup.default_ttl_secs = secs;
        self
    }

    pub fn dataset_ttl_secs(mut self, dataset: impl Into<String>, secs: u64) -> Self {
        self.config
            .cleanup
            .dataset_ttl_secs
            .insert(dataset.into(), secs);
        self
    }

    pub fn cleanup_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.cleanup.datasets.push(dataset.into());
        self
    }

    pub fn parent_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.config.cleanup.parent_dataset = Some(dataset.into());
        self
    }

    pub fn orphan_cleanup(mut self, enabled: bool) -> Self {
        self.config.cleanup.orphan_cleanup = enabled;
        self
    }

    // --- validation ---

    pub fn required_fields<I, S>(mut self, dataset: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .validation
            .required_fields
            .insert(dataset.into(), paths.into_iter().map(Into::into).collect());
        self
    }

    // --- storage / remote / logging ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.storage.database_path = path;
        self
    }

    pub fn remote_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.remote.base_url = Some(url.into());
        self
    }

    pub fn remote_timeout_secs(mut self, secs: u64) -> Self {
        self.config.remote.timeout_secs = secs;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
