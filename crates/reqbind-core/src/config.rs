//! Decoder configuration.
//!
//! [`DecoderConfig`] holds every serializable decoder setting. It can be
//! built in code, parsed from TOML or JSON, and overridden from environment
//! variables of the form `PREFIX__KEY` (or `PREFIX__SYNTAX__KEY` for the path
//! syntax).
//!
//! ```toml
//! default_location = "query"
//! ignore_unknown_keys = false
//! collect_errors = true
//! list_delimiter = ","
//!
//! [syntax]
//! left = "["
//! right = "]"
//! ```

use crate::location::Location;
use crate::syntax::PathSyntax;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Errors raised while loading or validating a [`DecoderConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Unsupported configuration format.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParseError {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// Validation error after loading.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Create a new environment variable parse error.
    pub fn env_parse_error(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParseError {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Create a new validation error.
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }
}

/// Serializable decoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Grammar used to split source keys.
    pub syntax: PathSyntax,

    /// Location for fields without location annotations. `None` means body.
    pub default_location: Option<Location>,

    /// Drop keys that resolve to no field instead of reporting them.
    pub ignore_unknown_keys: bool,

    /// Reset fields to their zero value when the raw value is empty.
    pub zero_empty: bool,

    /// Accumulate every key error instead of stopping at the first.
    pub collect_errors: bool,

    /// Delimiter used to split a single value into several sequence
    /// elements when converting it whole fails. `None` disables splitting.
    pub list_delimiter: Option<char>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            syntax: PathSyntax::default(),
            default_location: None,
            ignore_unknown_keys: true,
            zero_empty: false,
            collect_errors: false,
            list_delimiter: Some(','),
        }
    }
}

impl DecoderConfig {
    /// Parses a configuration from a string.
    ///
    /// # Arguments
    ///
    /// * `content` - Configuration content
    /// * `format` - `"toml"` or `"json"`
    ///
    /// # Example
    ///
    /// ```
    /// use reqbind_core::{DecoderConfig, Location};
    ///
    /// let config = DecoderConfig::from_str_format(
    ///     r#"
    ///         default_location = "query"
    ///         collect_errors = true
    ///     "#,
    ///     "toml",
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(config.default_location, Some(Location::Query));
    /// assert!(config.collect_errors);
    /// assert!(config.ignore_unknown_keys);
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
    /// Recognized keys: `PREFIX__DEFAULT_LOCATION`, `PREFIX__IGNORE_UNKNOWN_KEYS`,
    /// `PREFIX__ZERO_EMPTY`, `PREFIX__COLLECT_ERRORS`, `PREFIX__LIST_DELIMITER`
    /// (`none` disables splitting), and `PREFIX__SYNTAX__LEFT`, `__RIGHT`,
    /// `__SEPARATOR` (`none` clears the character).
    pub fn apply_env(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let prefix = prefix.to_uppercase();
        let vars: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with(&prefix))
            .collect();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, &prefix)?;
        }
        self.validate()
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };
        let parts: Vec<&str> = rest.split("__").collect();

        match parts.as_slice() {
            ["DEFAULT_LOCATION"] => {
                self.default_location = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(value.parse().map_err(|_| {
                        ConfigError::env_parse_error(key, "expected a location or 'none'")
                    })?)
                };
            }
            ["IGNORE_UNKNOWN_KEYS"] => {
                self.ignore_unknown_keys = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["ZERO_EMPTY"] => {
                self.zero_empty = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["COLLECT_ERRORS"] => {
                self.collect_errors = parse_bool(value)
                    .ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))?;
            }
            ["LIST_DELIMITER"] => {
                self.list_delimiter = parse_char(key, value)?;
            }
            ["SYNTAX", "LEFT"] => {
                self.syntax.left = parse_char(key, value)?;
            }
            ["SYNTAX", "RIGHT"] => {
                self.syntax.right = parse_char(key, value)?;
            }
            ["SYNTAX", "SEPARATOR"] => {
                self.syntax.separator = parse_char(key, value)?;
            }
            _ => {
                tracing::debug!(var = %key, "Ignoring unknown environment override");
            }
        }
        Ok(())
    }

    /// Validates cross-field constraints.
    ///
    /// Brackets must be set in pairs, grammar characters must be distinct and
    /// none of them may be whitespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let PathSyntax {
            left,
            right,
            separator,
        } = self.syntax;

        if left.is_some() != right.is_some() {
            return Err(ConfigError::validation_error(
                "syntax.left and syntax.right must be set together",
            ));
        }
        if left.is_none() && separator.is_none() {
            tracing::debug!("No separator configured, keys will not be split");
        }

        let chars: Vec<char> = [left, right, separator].into_iter().flatten().collect();
        if chars.iter().any(|c| c.is_whitespace()) {
            return Err(ConfigError::validation_error(
                "syntax characters must not be whitespace",
            ));
        }
        for (i, c) in chars.iter().enumerate() {
            if chars[i + 1..].contains(c) {
                return Err(ConfigError::validation_error(format!(
                    "syntax character {c:?} is used twice"
                )));
            }
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_char(key: &str, value: &str) -> Result<Option<char>, ConfigError> {
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Some(c)),
        _ => Err(ConfigError::env_parse_error(
            key,
            "expected a single character or 'none'",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DecoderConfig::default();
        assert_eq!(config.syntax, PathSyntax::dotted());
        assert_eq!(config.default_location, None);
        assert!(config.ignore_unknown_keys);
        assert!(!config.zero_empty);
        assert!(!config.collect_errors);
        assert_eq!(config.list_delimiter, Some(','));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = DecoderConfig::from_str_format(
            r#"
                default_location = "header"
                zero_empty = true
                list_delimiter = ";"

                [syntax]
                left = "["
                right = "]"
                separator = "."
            "#,
            "toml",
        )
        .unwrap();
        assert_eq!(config.default_location, Some(Location::Header));
        assert!(config.zero_empty);
        assert_eq!(config.list_delimiter, Some(';'));
        assert_eq!(config.syntax, PathSyntax::bracketed('[', ']', Some('.')));
    }

    #[test]
    fn test_from_json() {
        let config = DecoderConfig::from_str_format(
            r#"{"default_location": "json", "ignore_unknown_keys": false}"#,
            "json",
        )
        .unwrap();
        assert_eq!(config.default_location, Some(Location::Body));
        assert!(!config.ignore_unknown_keys);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let result = DecoderConfig::from_str_format("max_memory = 10", "toml");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_unsupported_format() {
        let result = DecoderConfig::from_str_format("", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_rejects_bad_syntax() {
        let mut config = DecoderConfig::default();
        config.syntax.left = Some('[');
        assert!(config.validate().is_err());

        config.syntax = PathSyntax::bracketed('[', ']', Some('['));
        assert!(config.validate().is_err());

        config.syntax = PathSyntax::plain(' ');
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env_var() {
        let mut config = DecoderConfig::default();
        config
            .apply_env_var("BIND__COLLECT_ERRORS", "true", "BIND")
            .unwrap();
        config
            .apply_env_var("BIND__DEFAULT_LOCATION", "query", "BIND")
            .unwrap();
        config
            .apply_env_var("BIND__LIST_DELIMITER", "none", "BIND")
            .unwrap();
        config
            .apply_env_var("BIND__SYNTAX__LEFT", "(", "BIND")
            .unwrap();
        config
            .apply_env_var("BIND__SYNTAX__RIGHT", ")", "BIND")
            .unwrap();
        config
            .apply_env_var("BIND__SOMETHING_ELSE", "x", "BIND")
            .unwrap();

        assert!(config.collect_errors);
        assert_eq!(config.default_location, Some(Location::Query));
        assert_eq!(config.list_delimiter, None);
        assert_eq!(config.syntax.brackets(), Some(('(', ')')));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_var_errors() {
        let mut config = DecoderConfig::default();
        let err = config
            .apply_env_var("BIND__ZERO_EMPTY", "maybe", "BIND")
            .unwrap_err();
        assert!(err.to_string().contains("BIND__ZERO_EMPTY"));

        assert!(config
            .apply_env_var("BIND__LIST_DELIMITER", ",,", "BIND")
            .is_err());
        assert!(config
            .apply_env_var("BIND__DEFAULT_LOCATION", "cookie", "BIND")
            .is_err());
    }
}
