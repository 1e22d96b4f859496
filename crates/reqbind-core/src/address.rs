//! Resolving raw source keys into field addresses.
//!
//! A key such as `imgs[0][caption]` is tokenized, then walked against the
//! record metadata one token per field. Crossing a sequence-of-records field
//! consumes the following token as the element index and starts a new
//! segment. The walk also authorizes the key's source location.

use crate::error::FieldError;
use crate::location::Location;
use crate::metadata::{FieldMeta, MetadataCache, RecordMetadata, Settings};
use crate::record::Slot;
use crate::syntax::InvalidPath;
use std::fmt;
use std::sync::Arc;

/// A run of field hops ending either at an index checkpoint or at the
/// terminal field.
#[derive(Clone)]
pub(crate) struct Segment {
    pub(crate) hops: Vec<Arc<FieldMeta>>,
    pub(crate) index: Option<usize>,
}

/// A resolved key: the fields to walk from the root record to the target
/// field, with element indices where the walk crosses into a sequence.
#[derive(Clone)]
pub struct Address {
    key: String,
    pub(crate) segments: Vec<Segment>,
}

impl Address {
    /// The source key this address was resolved from.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The terminal field.
    #[must_use]
    pub fn field(&self) -> &FieldMeta {
        let hops = &self.segments[self.segments.len() - 1].hops;
        &hops[hops.len() - 1]
    }

    /// Raw element indices of the sequences crossed, outermost first.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.segments.iter().filter_map(|segment| segment.index)
    }

    /// Structural field names along the address, with indices inlined.
    #[must_use]
    pub fn path(&self) -> Vec<String> {
        let mut path = Vec::new();
        for segment in &self.segments {
            path.extend(segment.hops.iter().map(|hop| hop.name().to_string()));
            if let Some(index) = segment.index {
                path.push(index.to_string());
            }
        }
        path
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("key", &self.key)
            .field("path", &self.path())
            .finish()
    }
}

/// Why a key failed to resolve.
#[derive(Debug)]
pub(crate) enum Unresolved {
    /// Malformed key or no matching field.
    Path(InvalidPath),
    /// The key resolved but is not authorized for the location.
    Field(FieldError),
}

impl Unresolved {
    /// Maps structural failures to the caller-facing unknown-key error.
    pub(crate) fn into_field_error(self) -> FieldError {
        match self {
            Self::Path(err) => FieldError::unknown(err.key()),
            Self::Field(err) => err,
        }
    }
}

/// Resolves `key`, supplied from `location`, against `root`.
pub(crate) fn resolve(
    key: &str,
    root: &Arc<RecordMetadata>,
    location: Location,
    cache: &MetadataCache,
    settings: &Settings,
) -> Result<Address, Unresolved> {
    let invalid = || Unresolved::Path(InvalidPath::new(key));
    let tokens = settings
        .config
        .syntax
        .tokenize(key)
        .map_err(Unresolved::Path)?;

    let mut current = Some(Arc::clone(root));
    let mut segments = Vec::new();
    let mut hops: Vec<Arc<FieldMeta>> = Vec::new();
    let mut governing: Option<Arc<FieldMeta>> = None;

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        let record = current.take().ok_or_else(invalid)?;
        let field = Arc::clone(record.lookup(token).ok_or_else(invalid)?);
        if field.is_explicit() {
            governing = Some(Arc::clone(&field));
        }
        hops.push(Arc::clone(&field));

        match &field.slot {
            Slot::Records { record, .. } => {
                let index = tokens
                    .next()
                    .and_then(|token| token.parse::<usize>().ok())
                    .ok_or_else(invalid)?;
                segments.push(Segment {
                    hops: std::mem::take(&mut hops),
                    index: Some(index),
                });
                current = Some(cache.get(*record, settings));
            }
            Slot::Record { record, .. } | Slot::Embedded { record, .. } => {
                current = Some(cache.get(*record, settings));
            }
            _ => {}
        }
    }

    // `imgs[0]` names an element, not a field.
    let Some(terminal) = hops.last() else {
        return Err(invalid());
    };
    let allowed = governing.as_ref().unwrap_or(terminal).locations();
    if !allowed.contains(&location) {
        return Err(Unresolved::Field(FieldError::Location {
            key: key.to_string(),
            location,
            allowed: allowed.to_vec(),
        }));
    }

    segments.push(Segment { hops, index: None });
    tracing::trace!(key = %key, %location, depth = segments.len(), "Resolved key");
    Ok(Address {
        key: key.to_string(),
        segments,
    })
}
