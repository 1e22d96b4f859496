//! Per-type field metadata, built once per record type and cached.
//!
//! Building a record's metadata runs its [`Record::declare`] table, derives
//! each field's alias and allowed locations, promotes the fields of embedded
//! records, and eagerly caches every nested record type it discovers. The
//! result is immutable and shared across concurrent decode calls.
//!
//! [`Record::declare`]: crate::Record::declare

use crate::config::DecoderConfig;
use crate::convert::Converters;
use crate::location::{Location, LocationSet};
use crate::record::{Accessor, FieldDecl, FieldShape, MaterializeFn, RecordType, Slot};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Derives a field alias from its structural name and resolved locations.
pub type NameFn = Arc<dyn Fn(&str, &[Location]) -> String + Send + Sync>;

/// Immutable decoder settings consulted while building metadata and decoding.
pub(crate) struct Settings {
    pub(crate) config: DecoderConfig,
    pub(crate) naming: Option<NameFn>,
    pub(crate) converters: Converters,
}

/// One hop through an embedded record on the way to a promoted field.
#[derive(Clone)]
pub(crate) struct EmbedHop {
    access: Accessor,
    materialize: MaterializeFn,
}

/// Metadata for one bindable field.
pub struct FieldMeta {
    name: &'static str,
    alias: String,
    key: String,
    locations: Vec<Location>,
    explicit: bool,
    embedded_in: Vec<&'static str>,
    route: Vec<EmbedHop>,
    pub(crate) slot: Slot,
    access: Option<Accessor>,
}

impl FieldMeta {
    /// Structural field name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// External name the field answers to.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Locations the field may be supplied from.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// True when the location list was declared (or inherited from an
    /// embedding record) rather than taken from the decoder default.
    #[must_use]
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// The field's shape.
    #[must_use]
    pub fn shape(&self) -> FieldShape {
        self.slot.shape()
    }

    /// Structural names of the embedded records the field was promoted
    /// through, outermost first. Empty for direct fields.
    #[must_use]
    pub fn embedded_in(&self) -> &[&'static str] {
        &self.embedded_in
    }

    /// True when the field resolves but is never written.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.access.is_none()
    }

    /// Walks from the owning record to this field's value.
    ///
    /// Returns `None` for reserved fields.
    pub(crate) fn reach<'a>(&self, record: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let mut current = record;
        for hop in &self.route {
            current = (hop.materialize)((hop.access)(current)?)?;
        }
        let access = self.access.as_ref()?;
        access(current)
    }
}

impl fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldMeta")
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("locations", &self.locations)
            .field("explicit", &self.explicit)
            .field("shape", &self.shape())
            .finish_non_exhaustive()
    }
}

/// Metadata for one record type.
pub struct RecordMetadata {
    id: TypeId,
    name: &'static str,
    fields: Vec<Arc<FieldMeta>>,
    has_files: bool,
    body_keys: Vec<String>,
    contains: OnceLock<LocationSet>,
}

impl RecordMetadata {
    /// Rust type name of the record.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fields in resolution order: direct fields, then promoted ones.
    pub fn fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().map(AsRef::as_ref)
    }

    /// Looks a field up by alias, ignoring case.
    #[must_use]
    pub fn field(&self, alias: &str) -> Option<&FieldMeta> {
        self.lookup(alias).map(AsRef::as_ref)
    }

    /// True when the record, or any record nested in it, declares file fields.
    #[must_use]
    pub fn has_files(&self) -> bool {
        self.has_files
    }

    pub(crate) fn lookup(&self, alias: &str) -> Option<&Arc<FieldMeta>> {
        let key = alias.to_lowercase();
        self.fields.iter().find(|field| field.key == key)
    }

    /// True when `key` is the alias of a body-routed field, ignoring case.
    pub(crate) fn accepts_body_key(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.body_keys.iter().any(|alias| *alias == key)
    }
}

impl fmt::Debug for RecordMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordMetadata")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("has_files", &self.has_files)
            .finish_non_exhaustive()
    }
}

/// Thread-safe memo of record metadata keyed by type.
#[derive(Default)]
pub(crate) struct MetadataCache {
    records: RwLock<HashMap<TypeId, Arc<RecordMetadata>>>,
}

struct Scope {
    inherited: Option<Vec<Location>>,
    route: Vec<EmbedHop>,
    embedded_in: Vec<&'static str>,
    has_files: bool,
}

impl MetadataCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the metadata for `record`, building it on first use.
    ///
    /// Concurrent first uses may both build; the results are equivalent and
    /// the last insert wins.
    pub(crate) fn get(&self, record: RecordType, settings: &Settings) -> Arc<RecordMetadata> {
        if let Some(meta) = self.records.read().get(&record.id) {
            return Arc::clone(meta);
        }
        self.build(record, settings, &mut Vec::new())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.records.read().len()
    }

    fn build(
        &self,
        record: RecordType,
        settings: &Settings,
        building: &mut Vec<TypeId>,
    ) -> Arc<RecordMetadata> {
        building.push(record.id);
        let scope = Scope {
            inherited: None,
            route: Vec::new(),
            embedded_in: Vec::new(),
            has_files: has_files(record, &mut Vec::new()),
        };
        let has_files = scope.has_files;
        let mut fields = Vec::new();
        self.collect((record.declare)(), scope, settings, building, &mut fields);
        building.pop();

        let body_keys = fields
            .iter()
            .filter(|field| field.locations.contains(&Location::Body))
            .map(|field| field.key.clone())
            .collect();
        let meta = Arc::new(RecordMetadata {
            id: record.id,
            name: record.name,
            fields,
            has_files,
            body_keys,
            contains: OnceLock::new(),
        });
        tracing::debug!(
            record = meta.name,
            fields = meta.fields.len(),
            "Built record metadata"
        );
        self.records.write().insert(record.id, Arc::clone(&meta));
        meta
    }

    /// Collects the fields of `decls` and, breadth first, the fields
    /// promoted from its embedded records.
    ///
    /// Every field at one embedding depth is placed before any field at the
    /// next, so the shallower field wins an alias collision.
    fn collect(
        &self,
        decls: Vec<FieldDecl>,
        scope: Scope,
        settings: &Settings,
        building: &mut Vec<TypeId>,
        fields: &mut Vec<Arc<FieldMeta>>,
    ) {
        let mut pending = VecDeque::from([(decls, scope)]);

        while let Some((decls, scope)) = pending.pop_front() {
            for decl in decls {
                let Some((alias, locations, explicit)) = derive(&decl, &scope, settings) else {
                    continue;
                };
                if !is_supported(&decl.slot, &settings.converters) {
                    tracing::debug!(
                        field = decl.name,
                        type_name = decl.slot.type_name(),
                        "Skipping field without a converter"
                    );
                    continue;
                }
                if let Some(child) = decl.slot.child() {
                    let cached = self.records.read().contains_key(&child.id);
                    if !cached && !building.contains(&child.id) {
                        self.build(child, settings, building);
                    }
                }

                if let Slot::Embedded {
                    record,
                    materialize,
                } = &decl.slot
                {
                    let Some(access) = decl.access.clone() else {
                        continue;
                    };
                    let mut route = scope.route.clone();
                    route.push(EmbedHop {
                        access,
                        materialize: *materialize,
                    });
                    let mut embedded_in = scope.embedded_in.clone();
                    embedded_in.push(decl.name);
                    let child_scope = Scope {
                        inherited: Some(locations),
                        route,
                        embedded_in,
                        has_files: has_files(*record, &mut Vec::new()),
                    };
                    pending.push_back(((record.declare)(), child_scope));
                    continue;
                }

                let key = alias.to_lowercase();
                if fields.iter().any(|field| field.key == key) {
                    tracing::debug!(field = decl.name, alias = %alias, "Dropping duplicate alias");
                    continue;
                }
                fields.push(Arc::new(FieldMeta {
                    name: decl.name,
                    key,
                    alias,
                    locations,
                    explicit,
                    embedded_in: scope.embedded_in.clone(),
                    route: scope.route.clone(),
                    slot: decl.slot,
                    access: decl.access,
                }));
            }
        }
    }

    /// Locations the record reads from, including nested records.
    pub(crate) fn contains(&self, meta: &RecordMetadata, settings: &Settings) -> LocationSet {
        *meta
            .contains
            .get_or_init(|| self.collect_contains(meta, settings, &mut Vec::new()))
    }

    fn collect_contains(
        &self,
        meta: &RecordMetadata,
        settings: &Settings,
        visited: &mut Vec<TypeId>,
    ) -> LocationSet {
        visited.push(meta.id);
        let mut set = LocationSet::empty();
        for field in &meta.fields {
            set.extend(field.locations.iter().copied());
            if let Some(child) = field.slot.child() {
                if !visited.contains(&child.id) {
                    let child = self.get(child, settings);
                    set.extend_from(self.collect_contains(&child, settings, visited));
                }
            }
        }
        set
    }
}

/// Resolves a declaration's alias, locations and explicitness.
///
/// Returns `None` when the field is excluded.
fn derive(
    decl: &FieldDecl,
    scope: &Scope,
    settings: &Settings,
) -> Option<(String, Vec<Location>, bool)> {
    if decl.skip {
        return None;
    }
    if let Some((location, alias)) = &decl.tag {
        return Some((alias.clone(), vec![*location], true));
    }

    let (mut locations, explicit) = match (&decl.locations, scope.inherited.as_deref()) {
        (Some(list), _) if !list.is_empty() => (list.clone(), true),
        (Some(_), inherited) => (
            inherited.map_or_else(|| vec![Location::Body], <[Location]>::to_vec),
            true,
        ),
        (None, Some(inherited)) => (inherited.to_vec(), true),
        (None, None) if matches!(decl.slot, Slot::File { .. }) => (vec![Location::File], true),
        (None, None) if scope.has_files => (vec![Location::Form], true),
        (None, None) => (
            vec![settings.config.default_location.unwrap_or(Location::Body)],
            false,
        ),
    };
    if decl.not_in_body {
        locations.retain(|location| *location != Location::Body);
    }
    if locations.is_empty() {
        return None;
    }

    let alias = match (&decl.alias, &settings.naming) {
        (Some(alias), _) => alias.clone(),
        (None, Some(naming)) => naming(decl.name, &locations),
        (None, None) => decl.name.to_string(),
    };
    if alias == "-" {
        return None;
    }
    Some((alias, locations, explicit))
}

fn is_supported(slot: &Slot, converters: &Converters) -> bool {
    match slot {
        Slot::Scalar { leaf, .. } => {
            leaf.kind.is_some() || leaf.text.is_some() || converters.contains_id(leaf.id)
        }
        Slot::Sequence { leaf, whole, .. } => {
            leaf.kind.is_some()
                || leaf.text.is_some()
                || converters.contains_id(leaf.id)
                || converters.contains_id(*whole)
        }
        _ => true,
    }
}

/// True when `record` declares a file field, directly or in any nested record.
fn has_files(record: RecordType, visited: &mut Vec<TypeId>) -> bool {
    visited.push(record.id);
    (record.declare)().iter().any(|decl| match &decl.slot {
        Slot::File { .. } => true,
        slot => slot
            .child()
            .is_some_and(|child| !visited.contains(&child.id) && has_files(child, visited)),
    })
}
