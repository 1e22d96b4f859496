//! # Reqbind Core
//!
//! Binds raw request values onto statically declared record types.
//!
//! Request values arrive as flat string maps keyed by path-like names such
//! as `imgs[0][url]` or `user.address.city`, one map per location (path,
//! query, header, form, file, JSON body). The decoder resolves each key
//! against the target record's field metadata, checks that the key came
//! from a location the field allows, merges all sources into one map and
//! coerces the raw strings into the fields' types.
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Tokenize | [`PathSyntax`] | Split a key into field tokens |
//! | Describe | [`Record`], [`Fields`] | Declared fields, cached per type as [`RecordMetadata`] |
//! | Resolve | [`Address`] | Key to field path, with location authorization |
//! | Merge | [`Sources`] | Canonicalize keys, flatten the JSON body, append values |
//! | Write | [`Decoder`] | Materialize nested records and coerce values |
//!
//! ## Example
//!
//! ```rust
//! use reqbind_core::{Decoder, Fields, Location, Record, Sources};
//!
//! #[derive(Debug, Default)]
//! struct Image {
//!     url: String,
//!     width: u32,
//! }
//!
//! impl Record for Image {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.scalar("url", |r| &mut r.url);
//!         fields.scalar("width", |r| &mut r.width);
//!     }
//! }
//!
//! #[derive(Debug, Default)]
//! struct CreatePost {
//!     id: u64,
//!     title: String,
//!     images: Vec<Image>,
//! }
//!
//! impl Record for CreatePost {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.scalar("id", |r| &mut r.id).locations(&[Location::Path]);
//!         fields.scalar("title", |r| &mut r.title);
//!         fields.records("images", |r| &mut r.images).name("imgs");
//!     }
//! }
//!
//! let decoder = Decoder::new();
//! let sources = Sources::new()
//!     .with(Location::Path, "id", "42")
//!     .with_body(r#"{"title": "Hello", "imgs": [{"url": "a.png", "width": 640}]}"#);
//!
//! let mut post = CreatePost::default();
//! decoder.decode(&mut post, sources).unwrap();
//!
//! assert_eq!(post.id, 42);
//! assert_eq!(post.title, "Hello");
//! assert_eq!(post.images[0].url, "a.png");
//! assert_eq!(post.images[0].width, 640);
//! ```
//!
//! ## Error Handling
//!
//! Key-level failures are reported as [`FieldError`]s keyed by the source
//! key. By default decoding stops at the first one; set
//! [`DecoderConfig::collect_errors`] to gather all of them.
//!
//! ```rust
//! use reqbind_core::{Decoder, DecodeError, Fields, Location, Record, Sources};
//!
//! #[derive(Debug, Default)]
//! struct Paging {
//!     page: u32,
//! }
//!
//! impl Record for Paging {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.scalar("page", |r| &mut r.page).locations(&[Location::Query]);
//!     }
//! }
//!
//! let sources = Sources::new().with(Location::Query, "page", "two");
//! let err = Decoder::new().decode(&mut Paging::default(), sources).unwrap_err();
//!
//! let errors = err.field_errors().unwrap();
//! assert!(errors.get("page").is_some());
//! assert_eq!(
//!     err.to_string(),
//!     "error converting value for \"page\". Details: invalid digit found in string"
//! );
//! ```

#![doc(html_root_url = "https://docs.rs/reqbind-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod address;
mod config;
mod convert;
mod decoder;
mod error;
mod file;
mod leaf;
mod location;
mod merge;
mod metadata;
mod record;
mod sources;
mod syntax;
mod writer;

pub use address::Address;
pub use config::{ConfigError, DecoderConfig};
pub use convert::Converters;
pub use decoder::{Decoder, DecoderBuilder};
pub use error::{ConversionError, DecodeError, FieldError, FieldErrors, ParseStage};
pub use file::{FileHandle, FileOpenError, FileStream, FileTarget, Upload};
pub use leaf::{parse_text, BoxError, InvalidBool, Leaf, ScalarKind, TextDecoder};
pub use location::{Location, LocationSet, UnknownLocation};
pub use metadata::{FieldMeta, NameFn, RecordMetadata};
pub use record::{FieldDecl, FieldShape, Fields, Record};
pub use sources::{Body, FileMap, Sources, ValueMap};
pub use syntax::{InvalidPath, PathSyntax};
