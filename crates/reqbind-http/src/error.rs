//! Binding error types.

use http::StatusCode;
use reqbind_core::{DecodeError, ParseStage};
use thiserror::Error;

/// Error returned by [`HttpBinder`](crate::HttpBinder).
///
/// Everything except body size violations is a [`DecodeError`]; the
/// variants map onto HTTP status codes for error responses.
///
/// # Example
///
/// ```rust
/// use reqbind_http::BindError;
/// use reqbind_core::DecodeError;
/// use http::StatusCode;
///
/// let err = BindError::from(DecodeError::content_type("text/plain", "multipart/form-data"));
/// assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
///
/// let err = BindError::payload_too_large(1024, 4096);
/// assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
/// ```
#[derive(Debug, Error)]
pub enum BindError {
    /// Content type, parsing or per-key failure.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The body, or one multipart field, exceeds its size limit.
    #[error("payload too large: {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
        /// Actual size in bytes.
        actual: usize,
    },
}

impl BindError {
    /// Creates a payload size error.
    #[must_use]
    pub fn payload_too_large(limit: usize, actual: usize) -> Self {
        Self::PayloadTooLarge { limit, actual }
    }

    /// Creates a multipart parsing error.
    pub(crate) fn multipart(source: impl Into<reqbind_core::BoxError>) -> Self {
        Self::Decode(DecodeError::parsing(ParseStage::Multipart, source))
    }

    /// Returns the decode error, if this is one.
    #[must_use]
    pub fn decode_error(&self) -> Option<&DecodeError> {
        match self {
            Self::Decode(err) => Some(err),
            Self::PayloadTooLarge { .. } => None,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decode(DecodeError::ContentType { .. }) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}
