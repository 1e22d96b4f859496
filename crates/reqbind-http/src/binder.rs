//! The HTTP binder.
//!
//! [`HttpBinder`] turns a [`RequestContext`] into [`Sources`] and runs the
//! core decoder. Only the locations the target record reads are extracted:
//! a record without header fields never looks at the header map, and bodies
//! are read for `POST`, `PUT` and `PATCH` only.
//!
//! | Record reads | Request must be | Source |
//! |--------------|-----------------|--------|
//! | files | `multipart/form-data` | multipart file parts |
//! | form (with files) | `multipart/form-data` | multipart text parts |
//! | form (no files) | `application/x-www-form-urlencoded` | url-encoded body |
//! | body | neither form type | JSON body |

use crate::config::BinderConfig;
use crate::context::RequestContext;
use crate::error::BindError;
use crate::form::{self, MULTIPART_FORM_DATA, URL_ENCODED};
use crate::multipart;
use reqbind_core::{
    Body, ConfigError, DecodeError, Decoder, Location, LocationSet, ParseStage, Record, Sources,
    ValueMap,
};
use std::fmt;
use std::sync::Arc;

/// Extracts path parameters from a request, replacing the router's.
pub type PathExtractor = Arc<dyn Fn(&RequestContext) -> Vec<(String, String)> + Send + Sync>;

/// Binds HTTP requests onto [`Record`] types.
///
/// Cloning is cheap; clones share the decoder and its metadata cache.
///
/// # Example
///
/// ```rust
/// use reqbind_core::{Fields, Location, Record};
/// use reqbind_http::{HttpBinder, RequestContext};
/// use http::{Method, Uri};
///
/// #[derive(Debug, Default)]
/// struct UpdateUser {
///     id: u64,
///     name: String,
///     notify: bool,
/// }
///
/// impl Record for UpdateUser {
///     fn declare(fields: &mut Fields<Self>) {
///         fields.scalar("id", |r| &mut r.id).locations(&[Location::Path]);
///         fields.scalar("name", |r| &mut r.name);
///         fields.scalar("notify", |r| &mut r.notify).locations(&[Location::Query]);
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let binder = HttpBinder::default();
/// let ctx = RequestContext::builder()
///     .method(Method::PUT)
///     .uri(Uri::from_static("/users/9?notify=true"))
///     .header("content-type", "application/json")
///     .body(r#"{"name": "Ada"}"#)
///     .path_param("id", "9")
///     .build();
///
/// let user: UpdateUser = binder.bind(&ctx).await.unwrap();
/// assert_eq!(user.id, 9);
/// assert_eq!(user.name, "Ada");
/// assert!(user.notify);
/// # });
/// ```
#[derive(Clone)]
pub struct HttpBinder {
    decoder: Arc<Decoder>,
    config: BinderConfig,
    path_extractor: Option<PathExtractor>,
}

impl HttpBinder {
    /// Creates a binder with its own decoder built from `config.decoder`.
    pub fn new(config: BinderConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let decoder = Decoder::with_config(config.decoder.clone())?;
        Ok(Self::with_decoder(decoder, config))
    }

    /// Creates a binder around an existing decoder.
    ///
    /// Use this when the decoder needs converters or a naming function.
    /// `config.decoder` is ignored in favor of the decoder's own settings.
    #[must_use]
    pub fn with_decoder(decoder: Decoder, config: BinderConfig) -> Self {
        Self {
            decoder: Arc::new(decoder),
            config,
            path_extractor: None,
        }
    }

    /// Sets a hook that supplies path parameters instead of
    /// [`RequestContext::path_params`].
    #[must_use]
    pub fn path_extractor<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&RequestContext) -> Vec<(String, String)> + Send + Sync + 'static,
    {
        self.path_extractor = Some(Arc::new(extractor));
        self
    }

    /// The underlying decoder.
    #[must_use]
    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// The binder configuration.
    #[must_use]
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Binds `ctx` onto a fresh `R`.
    pub async fn bind<R: Record>(&self, ctx: &RequestContext) -> Result<R, BindError> {
        let mut target = R::default();
        self.bind_into(&mut target, ctx).await?;
        Ok(target)
    }

    /// Binds `ctx` onto an existing record.
    ///
    /// Fields no request value addresses keep their current values.
    pub async fn bind_into<R: Record>(
        &self,
        target: &mut R,
        ctx: &RequestContext,
    ) -> Result<(), BindError> {
        let sources = self.sources::<R>(ctx).await?;
        self.decoder.decode(target, sources)?;
        Ok(())
    }

    /// Extracts the locations `R` reads into [`Sources`].
    pub async fn sources<R: Record>(&self, ctx: &RequestContext) -> Result<Sources, BindError> {
        let contains = self.decoder.locations::<R>();
        let mut sources = Sources::new();

        if ctx.reads_body() {
            self.body_sources(ctx, contains, &mut sources).await?;
        }

        if contains.contains(Location::Header) {
            sources.set(Location::Header, header_values(ctx));
        }

        if contains.contains(Location::Query) {
            let query = ctx.query_string().unwrap_or_default();
            let values = form::parse(query.as_bytes())
                .map_err(|err| DecodeError::parsing(ParseStage::Query, err))?;
            sources.set(Location::Query, values);
        }

        if contains.contains(Location::Path) {
            let params = match &self.path_extractor {
                Some(extract) => extract(ctx),
                None => ctx.path_params().to_vec(),
            };
            sources.set(Location::Path, form::collect(params));
        }

        Ok(sources)
    }

    async fn body_sources(
        &self,
        ctx: &RequestContext,
        contains: LocationSet,
        sources: &mut Sources,
    ) -> Result<(), BindError> {
        let body = ctx.body();
        if body.len() > self.config.max_body_size {
            return Err(BindError::payload_too_large(self.config.max_body_size, body.len()));
        }
        let content_type = ctx.content_type();
        let is_multipart = form::is_multipart(content_type);
        let is_urlencoded = form::is_urlencoded(content_type);

        let mut multipart_values = None;
        if contains.contains(Location::File) {
            if !is_multipart {
                return Err(DecodeError::content_type(content_type, MULTIPART_FORM_DATA).into());
            }
            let form = multipart::parse(content_type, body.clone(), &self.config.multipart).await?;
            for (key, files) in form.files {
                for file in files {
                    sources.insert_file(key.clone(), file);
                }
            }
            multipart_values = Some(form.values);
        }

        if contains.contains(Location::Form) && (is_urlencoded || is_multipart) {
            let values = match multipart_values {
                Some(values) => values,
                None if is_urlencoded => {
                    form::parse(body).map_err(|err| DecodeError::parsing(ParseStage::Form, err))?
                }
                None => return Err(DecodeError::content_type(content_type, URL_ENCODED).into()),
            };
            sources.set(Location::Form, values);
        } else if contains.contains(Location::Body) && !is_urlencoded && !is_multipart {
            let body = body.clone();
            sources.set_body(Body::new(move || Ok(body)));
        }
        Ok(())
    }
}

/// Header values keyed by lowercase name; non-text values are skipped.
fn header_values(ctx: &RequestContext) -> ValueMap {
    let mut values = ValueMap::new();
    for (name, value) in ctx.headers() {
        match value.to_str() {
            Ok(text) => values
                .entry(name.as_str().to_string())
                .or_default()
                .push(text.to_string()),
            Err(_) => tracing::debug!(header = %name, "Skipping non-text header value"),
        }
    }
    values
}

impl Default for HttpBinder {
    fn default() -> Self {
        Self::with_decoder(Decoder::new(), BinderConfig::default())
    }
}

impl fmt::Debug for HttpBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBinder")
            .field("decoder", &self.decoder)
            .field("config", &self.config)
            .field("path_extractor", &self.path_extractor.is_some())
            .finish()
    }
}
