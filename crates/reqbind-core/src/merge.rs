//! Merging per-location sources into one address-keyed value map.
//!
//! Every source key is canonicalized (a trailing `[]` is stripped), resolved
//! against the target record and authorized for the location it came from.
//! Values of keys that canonicalize identically are appended in pass order:
//! files, form, body, header, query, path. Within a location, keys are
//! visited in natural order so results never depend on map iteration order.

use crate::address::{resolve, Address, Unresolved};
use crate::error::{DecodeError, FieldError, FieldErrors, ParseStage};
use crate::location::{Location, LocationSet};
use crate::metadata::{MetadataCache, RecordMetadata, Settings};
use crate::sources::{FileMap, Sources, ValueMap};
use crate::syntax::PathSyntax;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Passes after files, in merge order.
const VALUE_PASSES: [Location; 5] = [
    Location::Form,
    Location::Body,
    Location::Header,
    Location::Query,
    Location::Path,
];

/// Result of the merge step of one decode call.
#[derive(Default)]
pub(crate) struct Merged {
    pub(crate) values: ValueMap,
    pub(crate) files: FileMap,
    pub(crate) addresses: HashMap<String, Address>,
    pub(crate) errors: FieldErrors,
}

impl Merged {
    /// Every merged key, in natural order.
    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.addresses.keys().cloned().collect();
        keys.sort_by(|a, b| natural_cmp(a, b));
        keys
    }
}

pub(crate) struct Merger<'d> {
    cache: &'d MetadataCache,
    settings: &'d Settings,
    root: Arc<RecordMetadata>,
    merged: Merged,
}

impl<'d> Merger<'d> {
    pub(crate) fn new(
        cache: &'d MetadataCache,
        settings: &'d Settings,
        root: Arc<RecordMetadata>,
    ) -> Self {
        Self {
            cache,
            settings,
            root,
            merged: Merged::default(),
        }
    }

    /// Runs every pass the record needs.
    ///
    /// Body read and parse failures abort with an error regardless of the
    /// error policy. Key-level errors are left in the merged result.
    pub(crate) fn run(
        mut self,
        sources: &mut Sources,
        contains: LocationSet,
    ) -> Result<Merged, DecodeError> {
        if self.passes(sources, contains)?.is_break() {
            tracing::trace!(
                errors = self.merged.errors.len(),
                "Merge stopped at first error"
            );
        }
        Ok(self.merged)
    }

    fn passes(
        &mut self,
        sources: &mut Sources,
        contains: LocationSet,
    ) -> Result<ControlFlow<()>, DecodeError> {
        if contains.contains(Location::File) {
            let files = sources.take_files();
            if let ControlFlow::Break(()) = self.merge_files(files) {
                return Ok(ControlFlow::Break(()));
            }
        }
        for location in VALUE_PASSES {
            if !contains.contains(location) {
                continue;
            }
            let values = if location == Location::Body {
                match sources.take_body() {
                    Some(body) => {
                        let bytes = body
                            .read()
                            .map_err(|err| DecodeError::parsing(ParseStage::Body, err))?;
                        match self.body_values(&bytes)? {
                            ControlFlow::Continue(values) => values,
                            ControlFlow::Break(()) => return Ok(ControlFlow::Break(())),
                        }
                    }
                    None => ValueMap::new(),
                }
            } else {
                sources.take_values(location)
            };
            if let ControlFlow::Break(()) = self.merge_values(values, location) {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn merge_files(&mut self, files: FileMap) -> ControlFlow<()> {
        for (key, handles) in sorted(files) {
            let canonical = self.settings.config.syntax.canonical(&key).to_string();
            if self.admit(&canonical, Location::File)? {
                self.merged
                    .files
                    .entry(canonical)
                    .or_default()
                    .extend(handles);
            }
        }
        ControlFlow::Continue(())
    }

    fn merge_values(&mut self, values: ValueMap, location: Location) -> ControlFlow<()> {
        for (key, raw) in sorted(values) {
            let canonical = self.settings.config.syntax.canonical(&key).to_string();
            if self.admit(&canonical, location)? {
                self.merged
                    .values
                    .entry(canonical)
                    .or_default()
                    .extend(raw);
            }
        }
        ControlFlow::Continue(())
    }

    /// Resolves and authorizes `key` for `location`.
    ///
    /// Yields `true` when the key's values should be merged.
    fn admit(&mut self, key: &str, location: Location) -> ControlFlow<(), bool> {
        match resolve(key, &self.root, location, self.cache, self.settings) {
            Ok(address) => {
                self.merged
                    .addresses
                    .entry(key.to_string())
                    .or_insert(address);
                ControlFlow::Continue(true)
            }
            Err(Unresolved::Path(_)) if self.settings.config.ignore_unknown_keys => {
                tracing::debug!(key = %key, %location, "Dropping unknown key");
                ControlFlow::Continue(false)
            }
            Err(err) => {
                self.fail(key, err.into_field_error())?;
                ControlFlow::Continue(false)
            }
        }
    }

    fn fail(&mut self, key: &str, error: FieldError) -> ControlFlow<()> {
        self.merged.errors.insert(key, error);
        if self.settings.config.collect_errors {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(())
        }
    }

    /// Parses and flattens the JSON body, rejecting unknown top-level keys.
    fn body_values(&mut self, bytes: &[u8]) -> Result<ControlFlow<(), ValueMap>, DecodeError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(ControlFlow::Continue(ValueMap::new()));
        }
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|err| DecodeError::parsing(ParseStage::Json, err))?;
        let Value::Object(object) = value else {
            return Err(DecodeError::parsing(
                ParseStage::Json,
                "JSON body must be an object",
            ));
        };

        let mut accepted = serde_json::Map::new();
        for (key, value) in sorted(object) {
            if self.root.accepts_body_key(&key) {
                accepted.insert(key, value);
            } else if !self.settings.config.ignore_unknown_keys {
                if let ControlFlow::Break(()) = self.fail(&key, FieldError::unknown(&key)) {
                    return Ok(ControlFlow::Break(()));
                }
            } else {
                tracing::debug!(key = %key, "Dropping unknown body key");
            }
        }

        let mut values = ValueMap::new();
        flatten(
            &Value::Object(accepted),
            &mut Vec::new(),
            &self.settings.config.syntax,
            &mut values,
        );
        Ok(ControlFlow::Continue(values))
    }
}

fn sorted<V>(map: impl IntoIterator<Item = (String, V)>) -> Vec<(String, V)> {
    let mut entries: Vec<(String, V)> = map.into_iter().collect();
    entries.sort_by(|(a, _), (b, _)| natural_cmp(a, b));
    entries
}

/// Flattens a JSON value into joined keys.
///
/// Objects nest, arrays of objects get an index token, scalar arrays append
/// values, nested arrays are kept as JSON text and nulls are skipped.
pub(crate) fn flatten(
    value: &Value,
    prefix: &mut Vec<String>,
    syntax: &PathSyntax,
    out: &mut ValueMap,
) {
    match value {
        Value::Null => {}
        Value::Object(object) => {
            for (key, child) in object {
                prefix.push(key.clone());
                flatten(child, prefix, syntax, out);
                prefix.pop();
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Null => {}
                    Value::Object(_) => {
                        prefix.push(index.to_string());
                        flatten(item, prefix, syntax, out);
                        prefix.pop();
                    }
                    Value::Array(_) => push_text(out, syntax, prefix, item.to_string()),
                    scalar => push_text(out, syntax, prefix, scalar_text(scalar)),
                }
            }
        }
        scalar => push_text(out, syntax, prefix, scalar_text(scalar)),
    }
}

fn push_text(out: &mut ValueMap, syntax: &PathSyntax, prefix: &[String], text: String) {
    if prefix.is_empty() {
        return;
    }
    out.entry(syntax.join(prefix)).or_default().push(text);
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Orders strings with embedded numbers numerically: `a2 < a10`.
pub(crate) fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut left, mut right) = (a, b);
    loop {
        match (chunk(left), chunk(right)) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((x, x_rest)), Some((y, y_rest))) => {
                let order = match (is_digits(x), is_digits(y)) {
                    (true, true) => compare_digits(x, y),
                    _ => x.cmp(y),
                };
                if order != Ordering::Equal {
                    return order;
                }
                left = x_rest;
                right = y_rest;
            }
        }
    }
}

/// Splits off the leading run of digits or non-digits.
fn chunk(s: &str) -> Option<(&str, &str)> {
    let first = s.chars().next()?;
    let digits = first.is_ascii_digit();
    let end = s
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit() != digits)
        .map_or(s.len(), |(i, _)| i);
    Some(s.split_at(end))
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn compare_digits(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}
