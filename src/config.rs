//! Configuration consumed once when storages and pipelines are constructed.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level configuration, usually loaded from TOML.
///
/// ```toml
/// [pipeline]
/// concurrency = 4
///
/// [storages.Position]
/// pre_allocate = 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Pipeline execution settings.
    pub pipeline: PipelineConfig,
    /// Storage settings keyed by component name.
    pub storages: HashMap<String, StorageConfig>,
}

impl Config {
    /// Parses a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> { Ok(toml::from_str(source)?) }

    /// Returns the storage configuration for a component, or the defaults.
    pub fn storage(&self, component: &str) -> StorageConfig {
        self.storages.get(component).cloned().unwrap_or_default()
    }
}

/// Pipeline execution settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of worker threads.
    ///
    /// `None` uses the available parallelism; `Some(1)` dispatches on the calling thread only.
    pub concurrency: Option<usize>,
}

/// Storage construction hints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Initial capacity of the dense tables.
    pub pre_allocate:   usize,
    /// Number of slots in each page of a paged storage.
    pub page_size:      usize,
    /// What a fixed-size batch does when it is full.
    pub batch_overflow: OverflowPolicy,
    /// Whether the storage traces changed entities from the start.
    pub trace_changes:  bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pre_allocate:   500,
            page_size:      200,
            batch_overflow: OverflowPolicy::Drop,
            trace_changes:  false,
        }
    }
}

/// Behaviour of a fixed-size batch that receives more components than its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Silently ignore the new component.
    #[default]
    Drop,
    /// Spill the batch to the heap and keep the component.
    Grow,
    /// Treat the overflow as a contract violation.
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let storage = config.storage("Anything");
        assert_eq!(storage.pre_allocate, 500);
        assert_eq!(storage.page_size, 200);
        assert_eq!(storage.batch_overflow, OverflowPolicy::Drop);
        assert!(!storage.trace_changes);
        assert_eq!(config.pipeline.concurrency, None);
    }

    #[test]
    fn test_from_toml() {
        let config = Config::from_toml_str(
            r#"
            [pipeline]
            concurrency = 2

            [storages.Contact]
            pre_allocate = 16
            batch_overflow = "grow"
            "#,
        )
        .unwrap();

        assert_eq!(config.pipeline.concurrency, Some(2));
        let contact = config.storage("Contact");
        assert_eq!(contact.pre_allocate, 16);
        assert_eq!(contact.page_size, 200);
        assert_eq!(contact.batch_overflow, OverflowPolicy::Grow);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml_str("[storages.Contact]\npreallocate = 3\n").unwrap_err();
        assert!(err.to_string().starts_with("invalid configuration"));
    }
}
