//! # Reqbind HTTP
//!
//! Binds `http` requests onto [`reqbind_core::Record`] types.
//!
//! The binder extracts the locations a record reads from a
//! [`RequestContext`]: path parameters captured by the router, the query
//! string, headers, url-encoded forms, multipart bodies (files are held in
//! memory) and JSON bodies. It enforces the content type a record needs and
//! hands everything to the core [`Decoder`](reqbind_core::Decoder).
//!
//! ## Example
//!
//! ```rust
//! use reqbind_core::{Fields, FileHandle, Location, Record};
//! use reqbind_http::{HttpBinder, RequestContext};
//! use http::Method;
//!
//! #[derive(Debug, Default)]
//! struct Upload {
//!     title: String,
//!     attachment: Option<FileHandle>,
//! }
//!
//! impl Record for Upload {
//!     fn declare(fields: &mut Fields<Self>) {
//!         fields.scalar("title", |r| &mut r.title).locations(&[Location::Form]);
//!         fields.file("attachment", |r| &mut r.attachment);
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let body = "--XX\r\n\
//!     Content-Disposition: form-data; name=\"title\"\r\n\r\n\
//!     Report\r\n\
//!     --XX\r\n\
//!     Content-Disposition: form-data; name=\"attachment\"; filename=\"q3.csv\"\r\n\
//!     Content-Type: text/csv\r\n\r\n\
//!     a,b\r\n\
//!     --XX--\r\n";
//!
//! let ctx = RequestContext::builder()
//!     .method(Method::POST)
//!     .header("content-type", "multipart/form-data; boundary=XX")
//!     .body(body)
//!     .build();
//!
//! let upload: Upload = HttpBinder::default().bind(&ctx).await.unwrap();
//! assert_eq!(upload.title, "Report");
//! assert_eq!(upload.attachment.unwrap().file_name(), "q3.csv");
//! # });
//! ```
//!
//! ## Errors
//!
//! [`BindError::status_code`] maps failures onto responses: content type
//! mismatches are `415`, oversized bodies `413`, everything else `400`.

#![doc(html_root_url = "https://docs.rs/reqbind-http/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod binder;
mod config;
mod context;
mod error;
mod form;
mod multipart;

pub use binder::{HttpBinder, PathExtractor};
pub use config::{BinderConfig, DEFAULT_MAX_BODY_SIZE};
pub use context::{RequestContext, RequestContextBuilder};
pub use error::BindError;
pub use form::{is_multipart, is_urlencoded, MULTIPART_FORM_DATA, URL_ENCODED};
pub use multipart::{MultipartConfig, UploadedFile, DEFAULT_MAX_FIELDS, DEFAULT_MAX_FIELD_SIZE};
