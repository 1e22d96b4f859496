//! Multipart form parsing.
//!
//! The whole body is parsed up front with `multer`. Text parts become form
//! values and parts carrying a file name become in-memory [`UploadedFile`]s
//! that the core opens through the [`Upload`] trait.

use crate::error::BindError;
use bytes::Bytes;
use reqbind_core::{FileMap, FileHandle, Upload, ValueMap};
use serde::{Deserialize, Serialize};
use std::io::{self, Cursor, Read};

/// Default maximum size per part (10 MB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of parts.
pub const DEFAULT_MAX_FIELDS: usize = 100;

/// Limits applied while parsing multipart bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MultipartConfig {
    /// Maximum size per part in bytes.
    pub max_field_size: usize,
    /// Maximum number of parts.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: DEFAULT_MAX_FIELDS,
        }
    }
}

impl MultipartConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum part size.
    #[must_use]
    pub fn max_field_size(mut self, size: usize) -> Self {
        self.max_field_size = size;
        self
    }

    /// Set the maximum number of parts.
    #[must_use]
    pub fn max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }
}

/// A file received in a multipart body, held in memory.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

impl UploadedFile {
    /// Create a new uploaded file.
    #[must_use]
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Bytes) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
        }
    }

    /// The MIME type the client declared for this part.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The file content.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

impl Upload for UploadedFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.data.clone())))
    }
}

/// Values and files of one multipart body.
#[derive(Debug, Default)]
pub(crate) struct FormData {
    pub(crate) values: ValueMap,
    pub(crate) files: FileMap,
}

/// Parses a complete multipart body.
pub(crate) async fn parse(
    content_type: &str,
    body: Bytes,
    config: &MultipartConfig,
) -> Result<FormData, BindError> {
    let boundary = multer::parse_boundary(content_type).map_err(BindError::multipart)?;
    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut form = FormData::default();
    let mut count = 0;
    while let Some(field) = multipart.next_field().await.map_err(BindError::multipart)? {
        count += 1;
        if count > config.max_fields {
            return Err(BindError::multipart(format!(
                "too many fields (max {})",
                config.max_fields
            )));
        }

        let Some(name) = field.name().map(ToOwned::to_owned) else {
            tracing::debug!("Skipping multipart part without a name");
            continue;
        };
        let file_name = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field.bytes().await.map_err(BindError::multipart)?;
        if data.len() > config.max_field_size {
            return Err(BindError::payload_too_large(config.max_field_size, data.len()));
        }

        match file_name {
            Some(file_name) => {
                tracing::trace!(field = %name, file = %file_name, size = data.len(), "Received file part");
                let upload = UploadedFile::new(file_name, content_type, data);
                form.files.entry(name).or_default().push(FileHandle::new(upload));
            }
            None => {
                let text = String::from_utf8(data.to_vec()).map_err(BindError::multipart)?;
                form.values.entry(name).or_default().push(text);
            }
        }
    }
    Ok(form)
}
