//! The decoder entry point.
//!
//! A [`Decoder`] owns its configuration, converter registry and metadata
//! cache. It is `Send + Sync`; share one instance across request handlers so
//! metadata is built once per record type.

use crate::address::{resolve, Address};
use crate::config::{ConfigError, DecoderConfig};
use crate::convert::Converters;
use crate::error::{DecodeError, FieldError};
use crate::leaf::BoxError;
use crate::location::{Location, LocationSet};
use crate::merge::Merger;
use crate::metadata::{MetadataCache, NameFn, RecordMetadata, Settings};
use crate::record::{Record, RecordType};
use crate::sources::Sources;
use crate::writer::{Input, Writer};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Binds request sources onto [`Record`] types.
///
/// # Example
///
/// ```rust
/// use reqbind_core::{Decoder, Fields, Location, Record, Sources};
///
/// #[derive(Debug, Default)]
/// struct ListUsers {
///     page: u32,
///     tags: Vec<String>,
///     token: String,
/// }
///
/// impl Record for ListUsers {
///     fn declare(fields: &mut Fields<Self>) {
///         fields.scalar("page", |r| &mut r.page).locations(&[Location::Query]);
///         fields.list("tags", |r| &mut r.tags).locations(&[Location::Query]);
///         fields
///             .scalar("token", |r| &mut r.token)
///             .tag(Location::Header, "x-token");
///     }
/// }
///
/// let decoder = Decoder::new();
/// let sources = Sources::new()
///     .with(Location::Query, "page", "3")
///     .with(Location::Query, "tags[]", "a")
///     .with(Location::Query, "tags[]", "b")
///     .with(Location::Header, "x-token", "secret");
///
/// let mut req = ListUsers::default();
/// decoder.decode(&mut req, sources).unwrap();
/// assert_eq!(req.page, 3);
/// assert_eq!(req.tags, vec!["a", "b"]);
/// assert_eq!(req.token, "secret");
/// ```
///
/// Only record types can be decoded into:
///
/// ```compile_fail
/// use reqbind_core::{Decoder, Sources};
///
/// let mut n = 0u32;
/// Decoder::new().decode(&mut n, Sources::new()).unwrap();
/// ```
pub struct Decoder {
    settings: Settings,
    cache: MetadataCache,
}

impl Decoder {
    /// Creates a decoder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(Settings {
            config: DecoderConfig::default(),
            naming: None,
            converters: Converters::new(),
        })
    }

    /// Creates a decoder from a validated configuration.
    pub fn with_config(config: DecoderConfig) -> Result<Self, ConfigError> {
        Self::builder().config(config).build()
    }

    /// Returns a builder for a customized decoder.
    #[must_use]
    pub fn builder() -> DecoderBuilder {
        DecoderBuilder::default()
    }

    fn from_settings(settings: Settings) -> Self {
        Self {
            settings,
            cache: MetadataCache::new(),
        }
    }

    /// The decoder configuration.
    #[must_use]
    pub fn config(&self) -> &DecoderConfig {
        &self.settings.config
    }

    /// Returns the cached metadata for `R`, building it on first use.
    #[must_use]
    pub fn metadata<R: Record>(&self) -> Arc<RecordMetadata> {
        self.cache.get(RecordType::of::<R>(), &self.settings)
    }

    /// Locations `R` reads from, including nested records.
    ///
    /// Request adapters use this to skip parsing sources nobody reads.
    #[must_use]
    pub fn locations<R: Record>(&self) -> LocationSet {
        let meta = self.metadata::<R>();
        self.cache.contains(&meta, &self.settings)
    }

    /// Resolves `key`, as supplied from `location`, against `R`.
    pub fn resolve<R: Record>(&self, key: &str, location: Location) -> Result<Address, FieldError> {
        let root = self.metadata::<R>();
        resolve(key, &root, location, &self.cache, &self.settings)
            .map_err(crate::address::Unresolved::into_field_error)
    }

    /// Decodes `sources` into `target`.
    ///
    /// Fields no key addresses keep their current values. With
    /// `collect_errors` unset the call stops at the first failing key; the
    /// target may then be partially written.
    pub fn decode<R: Record>(&self, target: &mut R, mut sources: Sources) -> Result<(), DecodeError> {
        let root = self.metadata::<R>();
        let contains = self.cache.contains(&root, &self.settings);
        let mut merged = Merger::new(&self.cache, &self.settings, Arc::clone(&root))
            .run(&mut sources, contains)?;

        let mut errors = std::mem::take(&mut merged.errors);
        let collect = self.settings.config.collect_errors;
        if errors.is_empty() || collect {
            let mut writer = Writer::new(&self.settings);
            let target: &mut dyn Any = target;
            for key in merged.keys() {
                let Some(address) = merged.addresses.get(&key) else {
                    continue;
                };
                let input = match (merged.values.get(&key), merged.files.get(&key)) {
                    (Some(values), _) => Input::Values(values),
                    (None, Some(files)) => Input::Files(files),
                    (None, None) => continue,
                };
                if let Err(err) = writer.write(target, address, input) {
                    errors.insert(key, err);
                    if !collect {
                        break;
                    }
                }
            }
        }

        if errors.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            record = root.name(),
            errors = errors.len(),
            "Decode finished with errors"
        );
        Err(DecodeError::Fields(errors))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("config", &self.settings.config)
            .field("converters", &self.settings.converters)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Decoder`].
///
/// # Example
///
/// ```rust
/// use reqbind_core::{Decoder, DecoderConfig, Location, PathSyntax};
///
/// let decoder = Decoder::builder()
///     .config(DecoderConfig {
///         syntax: PathSyntax::bracketed('[', ']', None),
///         collect_errors: true,
///         ..DecoderConfig::default()
///     })
///     .naming(|name, locations| {
///         if locations.contains(&Location::Header) {
///             format!("x-{}", name.replace('_', "-"))
///         } else {
///             name.to_string()
///         }
///     })
///     .converter(|raw: &str| raw.parse::<std::net::IpAddr>().map_err(Into::into))
///     .build()
///     .unwrap();
///
/// assert!(decoder.config().collect_errors);
/// ```
#[derive(Default)]
pub struct DecoderBuilder {
    config: DecoderConfig,
    naming: Option<NameFn>,
    converters: Converters,
}

impl DecoderBuilder {
    /// Replaces the configuration.
    #[must_use]
    pub fn config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the function deriving aliases for fields without one.
    #[must_use]
    pub fn naming<F>(mut self, naming: F) -> Self
    where
        F: Fn(&str, &[Location]) -> String + Send + Sync + 'static,
    {
        self.naming = Some(Arc::new(naming));
        self
    }

    /// Registers a converter for `T`, replacing any earlier one.
    #[must_use]
    pub fn converter<T, F>(mut self, convert: F) -> Self
    where
        T: Any + Send,
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        self.converters.register::<T, F>(convert);
        self
    }

    /// Replaces the whole converter registry.
    #[must_use]
    pub fn converters(mut self, converters: Converters) -> Self {
        self.converters = converters;
        self
    }

    /// Validates the configuration and builds the decoder.
    pub fn build(self) -> Result<Decoder, ConfigError> {
        self.config.validate()?;
        tracing::debug!(
            converters = self.converters.len(),
            collect_errors = self.config.collect_errors,
            "Building decoder"
        );
        Ok(Decoder::from_settings(Settings {
            config: self.config,
            naming: self.naming,
            converters: self.converters,
        }))
    }
}

impl fmt::Debug for DecoderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderBuilder")
            .field("config", &self.config)
            .field("naming", &self.naming.is_some())
            .field("converters", &self.converters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Fields;

    #[derive(Debug, Default)]
    struct Ping {
        n: u8,
    }

    impl Record for Ping {
        fn declare(fields: &mut Fields<Self>) {
            fields.scalar("n", |r| &mut r.n);
        }
    }

    #[test]
    fn test_decoder_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Decoder>();
    }

    #[test]
    fn test_builder_validates_config() {
        let mut config = DecoderConfig::default();
        config.syntax.left = Some('[');
        assert!(Decoder::with_config(config).is_err());
    }

    #[test]
    fn test_resolve_through_decoder() {
        let decoder = Decoder::new();
        let address = decoder.resolve::<Ping>("N", Location::Body).unwrap();
        assert_eq!(address.field().name(), "n");
        assert!(matches!(
            decoder.resolve::<Ping>("m", Location::Body),
            Err(FieldError::UnknownKey { .. })
        ));
        assert!(matches!(
            decoder.resolve::<Ping>("n", Location::Query),
            Err(FieldError::Location { .. })
        ));
    }

    #[test]
    fn test_locations() {
        let decoder = Decoder::new();
        let locations: Vec<Location> = decoder.locations::<Ping>().iter().collect();
        assert_eq!(locations, vec![Location::Body]);
    }
}
