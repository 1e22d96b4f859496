//! Uploaded file handles and the field shapes they can be written into.
//!
//! The core never parses multipart bodies itself. The HTTP layer hands it
//! [`FileHandle`]s wrapping anything that implements [`Upload`]; a field then
//! receives either the handles themselves or opened [`FileStream`]s,
//! depending on its declared type.

use std::any::Any;
use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use thiserror::Error;

/// An uploaded file as supplied by the request collaborator.
pub trait Upload: Send + Sync + fmt::Debug {
    /// Client-supplied file name.
    fn file_name(&self) -> &str;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Opens the file for reading.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the content cannot be opened.
    fn open(&self) -> io::Result<Box<dyn Read + Send>>;
}

/// A shareable handle to an uploaded file.
#[derive(Debug, Clone)]
pub struct FileHandle(Arc<dyn Upload>);

impl FileHandle {
    /// Wraps an upload.
    pub fn new(upload: impl Upload + 'static) -> Self {
        Self(Arc::new(upload))
    }

    /// Client-supplied file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.file_name()
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.0.size()
    }

    /// Opens the file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`FileOpenError`] naming the file when opening fails.
    pub fn open(&self) -> Result<FileStream, FileOpenError> {
        let reader = self.0.open().map_err(|source| FileOpenError {
            file_name: self.file_name().to_string(),
            source,
        })?;
        Ok(FileStream {
            file_name: self.file_name().to_string(),
            reader,
        })
    }
}

/// An opened upload, handed to the caller still open.
pub struct FileStream {
    file_name: String,
    reader: Box<dyn Read + Send>,
}

impl FileStream {
    /// Client-supplied file name.
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for FileStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStream")
            .field("file_name", &self.file_name)
            .finish_non_exhaustive()
    }
}

/// Opening an uploaded file failed.
#[derive(Debug, Error)]
#[error("cannot open uploaded file {file_name:?}: {source}")]
pub struct FileOpenError {
    /// Name of the file that failed to open.
    pub file_name: String,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// A field type that uploaded files can be written into.
///
/// Implemented for the four supported shapes: `Option<FileHandle>`,
/// `Vec<FileHandle>`, `Option<FileStream>` and `Vec<FileStream>`.
pub trait FileTarget: Any + Send + Default {
    /// True for sequence shapes.
    const MANY: bool;

    /// Writes `files` into `self`. Single shapes take the first file.
    ///
    /// # Errors
    ///
    /// Returns [`FileOpenError`] if a stream shape fails to open a file.
    fn assign(&mut self, files: &[FileHandle]) -> Result<(), FileOpenError>;
}

impl FileTarget for Option<FileHandle> {
    const MANY: bool = false;

    fn assign(&mut self, files: &[FileHandle]) -> Result<(), FileOpenError> {
        if let Some(file) = files.first() {
            *self = Some(file.clone());
        }
        Ok(())
    }
}

impl FileTarget for Vec<FileHandle> {
    const MANY: bool = true;

    fn assign(&mut self, files: &[FileHandle]) -> Result<(), FileOpenError> {
        *self = files.to_vec();
        Ok(())
    }
}

impl FileTarget for Option<FileStream> {
    const MANY: bool = false;

    fn assign(&mut self, files: &[FileHandle]) -> Result<(), FileOpenError> {
        if let Some(file) = files.first() {
            *self = Some(file.open()?);
        }
        Ok(())
    }
}

impl FileTarget for Vec<FileStream> {
    const MANY: bool = true;

    fn assign(&mut self, files: &[FileHandle]) -> Result<(), FileOpenError> {
        let mut opened = Vec::with_capacity(files.len());
        for file in files {
            match file.open() {
                Ok(stream) => opened.push(stream),
                Err(err) => {
                    if !opened.is_empty() {
                        tracing::warn!(
                            file_name = %err.file_name,
                            closed = opened.len(),
                            "Closing already opened uploads after open failure"
                        );
                    }
                    drop(opened);
                    return Err(err);
                }
            }
        }
        *self = opened;
        Ok(())
    }
}
