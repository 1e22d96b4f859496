//! Binder configuration.
//!
//! [`BinderConfig`] nests the core [`DecoderConfig`] with the limits the HTTP
//! layer enforces before handing anything to the decoder.
//!
//! ```toml
//! max_body_size = 1048576
//!
//! [decoder]
//! collect_errors = true
//!
//! [multipart]
//! max_fields = 20
//! ```

use crate::multipart::MultipartConfig;
use reqbind_core::{ConfigError, DecoderConfig};
use serde::{Deserialize, Serialize};
use std::env;

/// Default maximum body size (50 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Serializable binder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BinderConfig {
    /// Settings of the underlying decoder.
    pub decoder: DecoderConfig,

    /// Maximum body size in bytes for any body the binder reads.
    pub max_body_size: usize,

    /// Multipart limits.
    pub multipart: MultipartConfig,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            multipart: MultipartConfig::default(),
        }
    }
}

impl BinderConfig {
    /// Parses a configuration from `"toml"` or `"json"` content.
    ///
    /// # Example
    ///
    /// ```
    /// use reqbind_http::BinderConfig;
    ///
    /// let config = BinderConfig::from_str_format(
    ///     r#"{"max_body_size": 4096, "decoder": {"zero_empty": true}}"#,
    ///     "json",
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(config.max_body_size, 4096);
    /// assert!(config.decoder.zero_empty);
    /// ```
    pub fn from_str_format(content: &str, format: &str) -> Result<Self, ConfigError> {
        let config: Self = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => return Err(ConfigError::UnsupportedFormat(format.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from environment variables starting with `prefix`.
    ///
    /// Recognized keys: `PREFIX__MAX_BODY_SIZE`,
    /// `PREFIX__MULTIPART__MAX_FIELD_SIZE`, `PREFIX__MULTIPART__MAX_FIELDS`,
    /// and every decoder key under `PREFIX__DECODER__`.
    pub fn apply_env(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let prefix = prefix.to_uppercase();
        self.decoder.apply_env(&format!("{prefix}__DECODER"))?;

        for (key, value) in env::vars().filter(|(key, _)| key.starts_with(&prefix)) {
            let Some(rest) = key.strip_prefix(&prefix).and_then(|k| k.strip_prefix("__")) else {
                continue;
            };
            match rest {
                "MAX_BODY_SIZE" => self.max_body_size = parse_size(&key, &value)?,
                "MULTIPART__MAX_FIELD_SIZE" => {
                    self.multipart.max_field_size = parse_size(&key, &value)?;
                }
                "MULTIPART__MAX_FIELDS" => self.multipart.max_fields = parse_size(&key, &value)?,
                _ if rest.starts_with("DECODER__") => {}
                _ => tracing::debug!(var = %key, "Ignoring unknown environment override"),
            }
        }
        self.validate()
    }

    /// Validates the limits and the decoder settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_body_size == 0 {
            return Err(ConfigError::validation_error("max_body_size must be positive"));
        }
        if self.multipart.max_fields == 0 {
            return Err(ConfigError::validation_error(
                "multipart.max_fields must be positive",
            ));
        }
        self.decoder.validate()
    }
}

fn parse_size(key: &str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected a non-negative integer"))
}
