//! Decode error types.
//!
//! Per-key failures are [`FieldError`]s, gathered in a [`FieldErrors`] map
//! keyed by the offending source key. Failures that happen before per-key
//! processing starts (content type, body parsing) are reported directly as
//! [`DecodeError`] variants.

use crate::file::FileOpenError;
use crate::leaf::BoxError;
use crate::location::{format_locations, Location};
use indexmap::IndexMap;
use std::error::Error;
use std::fmt;
use thiserror::Error;

/// A raw value could not be coerced into the field's type.
#[derive(Debug)]
pub struct ConversionError {
    key: String,
    type_name: &'static str,
    index: Option<usize>,
    cause: Option<BoxError>,
}

impl ConversionError {
    pub(crate) fn new(
        key: impl Into<String>,
        type_name: &'static str,
        index: Option<usize>,
        cause: Option<BoxError>,
    ) -> Self {
        Self {
            key: key.into(),
            type_name,
            index,
            cause,
        }
    }

    /// Source key the value arrived under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Rust type the value was converted into.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Position of the failing value for sequence fields, `None` for scalars.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(
                f,
                "error converting value for index {index} of {:?}",
                self.key
            )?,
            None => write!(f, "error converting value for {:?}", self.key)?,
        }
        if let Some(cause) = &self.cause {
            write!(f, ". Details: {cause}")?;
        }
        Ok(())
    }
}

impl Error for ConversionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|cause| &**cause as &(dyn Error + 'static))
    }
}

/// An error tied to one source key.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The key does not resolve to any field.
    #[error("invalid param {key:?}")]
    UnknownKey {
        /// Offending key.
        key: String,
    },

    /// The key resolves, but arrived from a location the field does not allow.
    #[error("{key:?} param sent in {location} instead of {}", format_locations(.allowed))]
    Location {
        /// Offending key.
        key: String,
        /// Location the key was supplied from.
        location: Location,
        /// Locations the field accepts.
        allowed: Vec<Location>,
    },

    /// The value could not be converted.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// No conversion path exists for the field's type.
    #[error("converter not found for {type_name} (param {key:?})")]
    NoConverter {
        /// Offending key.
        key: String,
        /// Rust type of the field.
        type_name: &'static str,
    },

    /// An uploaded file could not be opened.
    #[error("param {key:?}: {source}")]
    FileOpen {
        /// Offending key.
        key: String,
        /// Underlying open failure.
        #[source]
        source: FileOpenError,
    },
}

impl FieldError {
    pub(crate) fn unknown(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    /// Returns the source key the error is about.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::UnknownKey { key }
            | Self::Location { key, .. }
            | Self::NoConverter { key, .. }
            | Self::FileOpen { key, .. } => key,
            Self::Conversion(err) => err.key(),
        }
    }
}

/// Per-key errors accumulated during one decode call, in the order they
/// were recorded.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: IndexMap<String, FieldError>,
}

impl FieldErrors {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` under `key`, replacing an earlier error for that key.
    pub fn insert(&mut self, key: impl Into<String>, error: FieldError) {
        self.errors.insert(key.into(), error);
    }

    /// Returns the error recorded for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldError> {
        self.errors.get(key)
    }

    /// Number of keys with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no error was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterates errors in recording order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldError)> {
        self.errors.iter().map(|(key, error)| (key.as_str(), error))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((_, first)) = self.errors.first() else {
            return f.write_str("(0 errors)");
        };
        write!(f, "{first}")?;
        match self.errors.len() {
            1 => Ok(()),
            2 => f.write_str(" (and 1 other error)"),
            n => write!(f, " (and {} other errors)", n - 1),
        }
    }
}

impl Error for FieldErrors {}

impl IntoIterator for FieldErrors {
    type Item = (String, FieldError);
    type IntoIter = indexmap::map::IntoIter<String, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Stage of request parsing that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    /// The JSON body.
    Json,
    /// A URL-encoded form body.
    Form,
    /// A multipart form body.
    Multipart,
    /// The URL query string.
    Query,
    /// Reading the raw request body.
    Body,
}

impl fmt::Display for ParseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON body"),
            Self::Form => write!(f, "form"),
            Self::Multipart => write!(f, "multipart form"),
            Self::Query => write!(f, "query string"),
            Self::Body => write!(f, "request body"),
        }
    }
}

/// Error returned by a decode call.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The request content type does not match what the record requires.
    #[error("Content-Type should be {expected:?} instead of {got:?}")]
    ContentType {
        /// Content type the request carried (empty when absent).
        got: String,
        /// Content type the record requires.
        expected: String,
    },

    /// A request component could not be parsed.
    #[error("cannot parse {stage}. Details: {source}")]
    Parsing {
        /// Which component failed.
        stage: ParseStage,
        /// Underlying parser error.
        #[source]
        source: BoxError,
    },

    /// One or more keys failed.
    #[error(transparent)]
    Fields(#[from] FieldErrors),
}

impl DecodeError {
    /// Creates a content type mismatch error.
    pub fn content_type(got: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::ContentType {
            got: got.into(),
            expected: expected.into(),
        }
    }

    /// Creates a parsing error.
    pub fn parsing(stage: ParseStage, source: impl Into<BoxError>) -> Self {
        Self::Parsing {
            stage,
            source: source.into(),
        }
    }

    /// Returns the per-key errors, if this is a key-level failure.
    #[must_use]
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Fields(errors) => Some(errors),
            _ => None,
        }
    }
}
