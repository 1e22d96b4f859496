//! The normalized request shape the decoder consumes.
//!
//! Whatever parses the request hands the decoder one [`Sources`] value: per
//! location, a map from raw key to its ordered raw values; a map from raw key
//! to uploaded files; and optionally a hook that yields the raw JSON body.

use crate::file::FileHandle;
use crate::leaf::BoxError;
use crate::location::Location;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;

/// Raw key to ordered raw values.
pub type ValueMap = HashMap<String, Vec<String>>;

/// Raw key to ordered uploaded files.
pub type FileMap = HashMap<String, Vec<FileHandle>>;

/// A deferred body read, invoked at most once.
pub struct Body(Box<dyn FnOnce() -> Result<Bytes, BoxError> + Send>);

impl Body {
    /// Wraps a body-reading hook.
    pub fn new<F>(read: F) -> Self
    where
        F: FnOnce() -> Result<Bytes, BoxError> + Send + 'static,
    {
        Self(Box::new(read))
    }

    pub(crate) fn read(self) -> Result<Bytes, BoxError> {
        (self.0)()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body(..)")
    }
}

/// All inputs of one decode call.
///
/// # Example
///
/// ```rust
/// use reqbind_core::{Location, Sources};
///
/// let sources = Sources::new()
///     .with(Location::Query, "page", "2")
///     .with(Location::Query, "tag", "a")
///     .with(Location::Query, "tag", "b")
///     .with(Location::Header, "x-token", "secret")
///     .with_body(r#"{"title": "hello"}"#);
///
/// assert_eq!(sources.values(Location::Query).unwrap()["tag"], vec!["a", "b"]);
/// assert!(sources.has_body());
/// ```
#[derive(Debug, Default)]
pub struct Sources {
    values: HashMap<Location, ValueMap>,
    files: FileMap,
    body: Option<Body>,
}

impl Sources {
    /// Creates empty sources.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one raw value for `key` at `location`.
    pub fn insert(&mut self, location: Location, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .entry(location)
            .or_default()
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Builder form of [`Sources::insert`].
    #[must_use]
    pub fn with(mut self, location: Location, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(location, key, value);
        self
    }

    /// Replaces the whole value map for `location`.
    pub fn set(&mut self, location: Location, values: ValueMap) {
        self.values.insert(location, values);
    }

    /// Appends an uploaded file under `key`.
    pub fn insert_file(&mut self, key: impl Into<String>, file: FileHandle) {
        self.files.entry(key.into()).or_default().push(file);
    }

    /// Builder form of [`Sources::insert_file`].
    #[must_use]
    pub fn with_file(mut self, key: impl Into<String>, file: FileHandle) -> Self {
        self.insert_file(key, file);
        self
    }

    /// Sets raw JSON body bytes.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        self.body = Some(Body::new(move || Ok(body)));
        self
    }

    /// Sets the JSON body from a reader, read on first use.
    #[must_use]
    pub fn with_body_reader<R: Read + Send + 'static>(mut self, mut reader: R) -> Self {
        self.body = Some(Body::new(move || {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            Ok(Bytes::from(buf))
        }));
        self
    }

    /// Sets a body hook.
    pub fn set_body(&mut self, body: Body) {
        self.body = Some(body);
    }

    /// Returns the value map for `location`, if any value was supplied.
    #[must_use]
    pub fn values(&self, location: Location) -> Option<&ValueMap> {
        self.values.get(&location)
    }

    /// Returns the uploaded files.
    #[must_use]
    pub fn files(&self) -> &FileMap {
        &self.files
    }

    /// True when a body hook is set.
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub(crate) fn take_values(&mut self, location: Location) -> ValueMap {
        self.values.remove(&location).unwrap_or_default()
    }

    pub(crate) fn take_files(&mut self) -> FileMap {
        std::mem::take(&mut self.files)
    }

    pub(crate) fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }
}
