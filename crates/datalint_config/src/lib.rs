//! Engine configuration files (YAML/TOML formats).
//!
//! An [`EngineConfig`] bundles the result cache settings with the default
//! inspection options. It can be loaded from a YAML or TOML file and then
//! adjusted through `DATALINT_*` environment variables.
//!
//! # Example
//!
//! ```rust
//! use datalint_config::parse_yaml;
//! use datalint_core::EvictionPolicy;
//!
//! let yaml = r#"
//! cache:
//!   capacity: 256
//!   eviction_policy:
//!     policy: ttl
//!     ttl_ms: 60000
//! inspection:
//!   sample_rows: 500
//! "#;
//!
//! let config = parse_yaml(yaml).expect("Failed to parse config");
//! assert_eq!(config.cache.capacity, 256);
//! assert_eq!(config.cache.eviction_policy, EvictionPolicy::Ttl { ttl_ms: 60000 });
//! assert_eq!(config.inspection.sample_rows, 500);
//! ```

use datalint_core::{CacheConfig, DatalintError, InspectionOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Overrides the cache capacity.
pub const ENV_CACHE_CAPACITY: &str = "DATALINT_CACHE_CAPACITY";
/// Overrides the record sample size.
pub const ENV_SAMPLE_ROWS: &str = "DATALINT_SAMPLE_ROWS";
/// Overrides the inspection timeout, in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "DATALINT_TIMEOUT_MS";
/// Overrides strict mode (`1`/`0`, `true`/`false`).
pub const ENV_STRICT: &str = "DATALINT_STRICT";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing or deserialization failed
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),

    /// TOML parsing or deserialization failed
    #[error("Failed to parse TOML: {0}")]
    TomlError(String),

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Unsupported file format
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Invalid file extension
    #[error("Invalid or missing file extension")]
    InvalidExtension,

    /// An environment override could not be parsed
    #[error("Invalid value '{value}' for {key}")]
    InvalidOverride {
        /// Variable name
        key: String,
        /// Rejected value
        value: String,
    },

    /// The configuration parsed but is not usable
    #[error(transparent)]
    Invalid(#[from] DatalintError),
}

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yml, .yaml)
    Yaml,
    /// TOML format (.toml)
    Toml,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Result cache settings
    pub cache: CacheConfig,
    /// Defaults applied to every inspection
    pub inspection: InspectionOptions,
}

impl EngineConfig {
    /// Checks the cache settings.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        Ok(())
    }

    /// Applies `DATALINT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup, so that callers and tests
    /// do not have to touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(capacity) = parse_override(&lookup, ENV_CACHE_CAPACITY)? {
            self.cache.capacity = capacity;
        }
        if let Some(rows) = parse_override(&lookup, ENV_SAMPLE_ROWS)? {
            self.inspection.sample_rows = rows;
        }
        if let Some(timeout_ms) = parse_override(&lookup, ENV_TIMEOUT_MS)? {
            self.inspection.timeout_ms = timeout_ms;
        }
        if let Some(raw) = lookup(ENV_STRICT) {
            self.inspection.strict = parse_flag(&raw).ok_or_else(|| ConfigError::InvalidOverride {
                key: ENV_STRICT.to_string(),
                value: raw.clone(),
            })?;
            debug!(key = ENV_STRICT, value = %raw, "applied environment override");
        }
        Ok(())
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let value = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key: key.to_string(),
            value: raw.clone(),
        })?;
    debug!(key, value = %raw, "applied environment override");
    Ok(Some(value))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a configuration from a YAML string.
pub fn parse_yaml(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_yaml_ng::from_str(content)?;
    Ok(config)
}

/// Parse a configuration from a TOML string.
///
/// # Example
///
/// ```rust
/// use datalint_config::parse_toml;
///
/// let toml = r#"
/// [cache]
/// capacity = 64
/// fingerprint_algorithm = "sha256"
///
/// [inspection]
/// strict = true
/// "#;
///
/// let config = parse_toml(toml).unwrap();
/// assert_eq!(config.cache.capacity, 64);
/// assert!(config.inspection.strict);
/// ```
pub fn parse_toml(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig =
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
    Ok(config)
}

/// Detect the configuration format from a file path based on its extension.
///
/// # Errors
///
/// Returns `ConfigError::InvalidExtension` if the file has no extension.
/// Returns `ConfigError::UnsupportedFormat` if the extension is not recognized.
pub fn detect_format(path: &Path) -> Result<ConfigFormat> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or(ConfigError::InvalidExtension)?;

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(ConfigFormat::Yaml),
        "toml" => Ok(ConfigFormat::Toml),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Parse a configuration file, choosing the parser by extension.
pub fn parse_file(path: &Path) -> Result<EngineConfig> {
    let content = std::fs::read_to_string(path)?;
    let format = detect_format(path)?;

    match format {
        ConfigFormat::Yaml => parse_yaml(&content),
        ConfigFormat::Toml => parse_toml(&content),
    }
}

/// Loads the effective configuration.
///
/// Starts from `path` when given (defaults otherwise), applies environment
/// overrides and validates the result.
pub fn load(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => {
            debug!(path = %path.display(), "loading engine config");
            parse_file(path)?
        }
        None => EngineConfig::default(),
    };
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::{EvictionPolicy, FingerprintAlgorithm, DEFAULT_CAPACITY};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_empty_yaml_gives_defaults() {
        let config = parse_yaml("{}").expect("Failed to parse empty YAML");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.cache.capacity, DEFAULT_CAPACITY);
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
cache:
  capacity: 32
  eviction_policy:
    policy: lru
  fingerprint_algorithm: sha256
  persist_path: .datalint/cache.json
inspection:
  sample_rows: 100
  sniff_bytes: 4096
  timeout_ms: 1500
  strict: true
"#;

        let config = parse_yaml(yaml).expect("Failed to parse YAML");
        assert_eq!(config.cache.capacity, 32);
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Lru);
        assert_eq!(
            config.cache.fingerprint_algorithm,
            FingerprintAlgorithm::Sha256
        );
        assert_eq!(
            config.cache.persist_path.as_deref(),
            Some(Path::new(".datalint/cache.json"))
        );
        assert_eq!(config.inspection.sample_rows, 100);
        assert_eq!(config.inspection.sniff_bytes, 4096);
        assert_eq!(config.inspection.timeout_ms, 1500);
        assert!(config.inspection.strict);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_yaml("cache: [unterminated");
        assert!(matches!(result.unwrap_err(), ConfigError::YamlError(_)));
    }

    #[test]
    fn test_parse_toml_ttl() {
        let toml = r#"
[cache]
capacity = 8

[cache.eviction_policy]
policy = "ttl"
ttl_ms = 250
"#;

        let config = parse_toml(toml).expect("Failed to parse TOML");
        assert_eq!(config.cache.eviction_policy, EvictionPolicy::Ttl { ttl_ms: 250 });
        assert_eq!(config.inspection, InspectionOptions::default());
    }

    #[test]
    fn test_parse_invalid_toml() {
        let result = parse_toml("[[[invalid syntax");
        assert!(matches!(result.unwrap_err(), ConfigError::TomlError(_)));
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("datalint.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(detect_format(Path::new("datalint.YAML")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(detect_format(Path::new("datalint.toml")).unwrap(), ConfigFormat::Toml);
        assert!(matches!(
            detect_format(Path::new("datalint.json")).unwrap_err(),
            ConfigError::UnsupportedFormat(_)
        ));
        assert!(matches!(
            detect_format(Path::new("datalint")).unwrap_err(),
            ConfigError::InvalidExtension
        ));
    }

    #[test]
    fn test_parse_file_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[inspection]\nsample_rows = 12").unwrap();

        let config = parse_file(file.path()).unwrap();
        assert_eq!(config.inspection.sample_rows, 12);
    }

    #[test]
    fn test_overrides() {
        let mut config = EngineConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_CACHE_CAPACITY, "64"),
                (ENV_SAMPLE_ROWS, " 10 "),
                (ENV_TIMEOUT_MS, "500"),
                (ENV_STRICT, "yes"),
            ]))
            .unwrap();

        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.inspection.sample_rows, 10);
        assert_eq!(config.inspection.timeout_ms, 500);
        assert!(config.inspection.strict);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_CACHE_CAPACITY, "lots")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidOverride { key, value } => {
                assert_eq!(key, ENV_CACHE_CAPACITY);
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = config
            .apply_overrides(env(&[(ENV_STRICT, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOverride { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = parse_yaml("cache:\n  capacity: 0\n").unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid(DatalintError::CacheConfig(_))
        ));
    }
}
