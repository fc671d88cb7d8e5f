//! Tunables of the transform tree.
//! The configuration is serialized in the RON format, like the rest of the workspace configs.

use crate::error::{TransformError, TransformResult};
use ron::extensions::Extensions;
use ron::Options;
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::Path;
use tf_clock::TfDuration;

/// What to do when a child frame shows up with a different parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReparentPolicy {
    /// Drop the old edge and its history, keep the latest one, log a warning.
    #[default]
    Replace,
    /// Keep the old edge and fail the ingestion with `AmbiguousReparent`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformTreeConfig {
    /// Upper bound of samples retained per edge.
    pub max_samples_per_edge: usize,
    /// Samples older than the newest one of their edge by more than this are evicted.
    pub max_storage_time: TfDuration,
    /// How far outside the known samples of an edge a query may fall.
    pub tolerance: TfDuration,
    pub reparent_policy: ReparentPolicy,
    /// Number of composed lookups memoized between two ingestions.
    pub cache_size: usize,
}

impl TransformTreeConfig {
    pub const DEFAULT_MAX_SAMPLES_PER_EDGE: usize = 10_000;
    pub const DEFAULT_MAX_STORAGE_TIME: TfDuration = TfDuration::from_secs(10);
    pub const DEFAULT_CACHE_SIZE: usize = 100;

    fn get_options() -> Options {
        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES)
    }

    pub fn from_ron(ron: &str) -> TransformResult<Self> {
        let config: Self = Self::get_options()
            .from_str(ron)
            .map_err(|e| TransformError::Config(format!("Syntax error in config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_ron(&self) -> TransformResult<String> {
        let pretty = ron::ser::PrettyConfig::default();
        Self::get_options()
            .to_string_pretty(self, pretty)
            .map_err(|e| TransformError::Config(e.to_string()))
    }

    pub fn validate(&self) -> TransformResult<()> {
        if self.max_samples_per_edge == 0 {
            return Err(TransformError::Config(
                "max_samples_per_edge must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TransformTreeConfig {
    fn default() -> Self {
        Self {
            max_samples_per_edge: Self::DEFAULT_MAX_SAMPLES_PER_EDGE,
            max_storage_time: Self::DEFAULT_MAX_STORAGE_TIME,
            tolerance: TfDuration::MIN,
            reparent_policy: ReparentPolicy::default(),
            cache_size: Self::DEFAULT_CACHE_SIZE,
        }
    }
}

/// Read a transform tree configuration from a file.
pub fn read_configuration(
    config_filename: impl AsRef<Path>,
) -> TransformResult<TransformTreeConfig> {
    let path = config_filename.as_ref();
    let config_content = read_to_string(path).map_err(|e| {
        TransformError::Config(format!(
            "Failed to read configuration file {}: {e}",
            path.display()
        ))
    })?;
    TransformTreeConfig::from_ron(&config_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_roundtrip() {
        let config = TransformTreeConfig::default();
        let serialized = config.to_ron().unwrap();
        let deserialized = TransformTreeConfig::from_ron(&serialized).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_partial_config() {
        let txt = r#"( tolerance: 5000000, reparent_policy: Reject )"#;
        let config = TransformTreeConfig::from_ron(txt).unwrap();
        assert_eq!(config.tolerance, TfDuration::from_millis(5));
        assert_eq!(config.reparent_policy, ReparentPolicy::Reject);
        assert_eq!(
            config.max_samples_per_edge,
            TransformTreeConfig::DEFAULT_MAX_SAMPLES_PER_EDGE
        );
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            TransformTreeConfig::from_ron("( tolerance: \"soon\" )"),
            Err(TransformError::Config(_))
        ));
        assert!(matches!(
            TransformTreeConfig::from_ron("( max_samples_per_edge: 0 )"),
            Err(TransformError::Config(_))
        ));
    }

    #[test]
    fn test_read_configuration() {
        let dir = tempdir::TempDir::new("tf_tree_config").unwrap();
        let path = dir.path().join("tree.ron");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "( max_storage_time: 2000000000, cache_size: 8 )").unwrap();
        let config = read_configuration(&path).unwrap();
        assert_eq!(config.max_storage_time, TfDuration::from_secs(2));
        assert_eq!(config.cache_size, 8);

        assert!(read_configuration("/nonexistent/tf_tree.ron").is_err());
    }
}
