//! Writing merged values into a target record.
//!
//! The writer walks an [`Address`] from the root record, materializing
//! nested records and sequence elements on the way, then coerces the raw
//! values into the terminal field.
//!
//! Sequence elements are appended in the order their raw indices are first
//! seen; a per-call memo maps each raw index to the position it was given,
//! so `imgs.7.url` and `imgs.7.alt` land on the same element while
//! `imgs.3` and `imgs.7` still produce a dense two-element vector.

use crate::address::Address;
use crate::error::{ConversionError, FieldError};
use crate::file::FileHandle;
use crate::leaf::{BoxError, LeafType};
use crate::metadata::{FieldMeta, Settings};
use crate::record::Slot;
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Raw input for one key.
#[derive(Clone, Copy)]
pub(crate) enum Input<'v> {
    Values(&'v [String]),
    Files(&'v [FileHandle]),
}

pub(crate) struct Writer<'d> {
    settings: &'d Settings,
    positions: HashMap<String, HashMap<usize, usize>>,
}

impl<'d> Writer<'d> {
    pub(crate) fn new(settings: &'d Settings) -> Self {
        Self {
            settings,
            positions: HashMap::new(),
        }
    }

    /// Writes `input` into the field `address` designates.
    ///
    /// Addresses that cannot be reached (reserved fields) are a no-op.
    pub(crate) fn write(
        &mut self,
        target: &mut dyn Any,
        address: &Address,
        input: Input<'_>,
    ) -> Result<(), FieldError> {
        let key = address.key();
        let Some((terminal, checkpoints)) = address.segments.split_last() else {
            return Ok(());
        };

        let mut current = target;
        let mut scope = String::new();
        for segment in checkpoints {
            let Some((sequence, through)) = segment.hops.split_last() else {
                return Ok(());
            };
            let Some(record) = descend(current, through, &mut scope) else {
                return Ok(());
            };
            let Slot::Records { enter, .. } = &sequence.slot else {
                return Ok(());
            };
            let Some(items) = sequence.reach(record) else {
                return Ok(());
            };

            push_scope(&mut scope, sequence);
            let memo = self.positions.entry(scope.clone()).or_default();
            let raw = segment.index.unwrap_or_default();
            let known = memo.get(&raw).copied();
            let Some((position, item)) = enter(items, known) else {
                debug_assert!(known.is_none(), "stale position for {key}");
                tracing::warn!(key = %key, field = sequence.name(), "Sequence element unreachable");
                return Ok(());
            };
            memo.insert(raw, position);
            let _ = write!(scope, "[{position}]");
            current = item;
        }

        let Some((field, through)) = terminal.hops.split_last() else {
            return Ok(());
        };
        let Some(record) = descend(current, through, &mut scope) else {
            return Ok(());
        };
        let Some(slot) = field.reach(record) else {
            tracing::trace!(key = %key, field = field.name(), "Skipping reserved field");
            return Ok(());
        };

        match input {
            Input::Values(values) => self.write_values(key, field, slot, values),
            Input::Files(files) => write_files(key, field, slot, files),
        }
    }

    fn write_values(
        &self,
        key: &str,
        field: &FieldMeta,
        slot: &mut dyn Any,
        values: &[String],
    ) -> Result<(), FieldError> {
        let Some(last) = values.last() else {
            return Ok(());
        };
        match &field.slot {
            Slot::Scalar {
                leaf,
                assign,
                reset,
                ..
            } => {
                let value = if let Some(converter) = self.settings.converters.get(leaf.id) {
                    (converter.convert)(last)
                        .map_err(|err| conversion(key, leaf.name, None, err))?
                } else if let Some(text) = &leaf.text {
                    text(last).map_err(|err| conversion(key, leaf.name, None, err))?
                } else if last.is_empty() {
                    if self.settings.config.zero_empty {
                        reset(slot);
                    }
                    return Ok(());
                } else if let Some(kind) = leaf.kind {
                    kind.convert(last)
                        .map_err(|err| conversion(key, leaf.name, None, err))?
                } else {
                    return Err(no_converter(key, leaf.name));
                };
                let written = assign(slot, value);
                debug_assert!(written, "converter produced a foreign type");
                Ok(())
            }
            Slot::Sequence {
                leaf,
                whole,
                whole_name,
                assign_items,
                assign_whole,
            } => {
                if let Some(converter) = self.settings.converters.get(*whole) {
                    let value = (converter.convert)(last)
                        .map_err(|err| conversion(key, *whole_name, None, err))?;
                    let written = assign_whole(slot, value);
                    debug_assert!(written, "converter produced a foreign type");
                    return Ok(());
                }
                let items = self.sequence_items(key, leaf, *whole_name, values)?;
                let written = assign_items(slot, items);
                debug_assert!(written, "converter produced a foreign type");
                Ok(())
            }
            _ if last.is_empty() => Ok(()),
            other => Err(no_converter(key, other.type_name())),
        }
    }

    fn sequence_items(
        &self,
        key: &str,
        leaf: &LeafType,
        whole_name: &'static str,
        values: &[String],
    ) -> Result<Vec<Box<dyn Any + Send>>, FieldError> {
        let zero_empty = self.settings.config.zero_empty;
        let mut items = Vec::with_capacity(values.len());

        if let Some(text) = &leaf.text {
            for (index, raw) in values.iter().enumerate() {
                if raw.is_empty() {
                    if zero_empty {
                        items.push((leaf.zero)());
                    }
                    continue;
                }
                items.push(text(raw).map_err(|err| conversion(key, whole_name, Some(index), err))?);
            }
            return Ok(items);
        }

        let registered = self.settings.converters.get(leaf.id);
        let convert = |raw: &str| -> Option<Result<Box<dyn Any + Send>, BoxError>> {
            match (registered, leaf.kind) {
                (Some(converter), _) => Some((converter.convert)(raw)),
                (None, Some(kind)) => Some(kind.convert(raw)),
                (None, None) => None,
            }
        };

        for (index, raw) in values.iter().enumerate() {
            if raw.is_empty() {
                if zero_empty {
                    items.push((leaf.zero)());
                }
                continue;
            }
            let Some(result) = convert(raw) else {
                return Err(no_converter(key, leaf.name));
            };
            let err = match result {
                Ok(item) => {
                    items.push(item);
                    continue;
                }
                Err(err) => err,
            };

            // `ids=1,2,3` in a single value.
            let Some(delimiter) = self
                .settings
                .config
                .list_delimiter
                .filter(|delimiter| raw.contains(*delimiter))
            else {
                return Err(conversion(key, leaf.name, Some(index), err));
            };
            for part in raw.split(delimiter) {
                if part.is_empty() {
                    if zero_empty {
                        items.push((leaf.zero)());
                    }
                    continue;
                }
                if let Some(result) = convert(part) {
                    items.push(result.map_err(|err| conversion(key, leaf.name, Some(index), err))?);
                }
            }
        }
        Ok(items)
    }
}

/// Walks nested-record hops, materializing each record on the way.
fn descend<'a>(
    mut current: &'a mut dyn Any,
    hops: &[Arc<FieldMeta>],
    scope: &mut String,
) -> Option<&'a mut dyn Any> {
    for hop in hops {
        let Slot::Record { materialize, .. } = &hop.slot else {
            return None;
        };
        current = materialize(hop.reach(current)?)?;
        push_scope(scope, hop);
    }
    Some(current)
}

/// Appends `field` to a memo scope, including the embedded records it was
/// promoted through, so same-named fields of different embeds stay apart.
fn push_scope(scope: &mut String, field: &FieldMeta) {
    for embedded in field.embedded_in() {
        let _ = write!(scope, "/{embedded}");
    }
    let _ = write!(scope, "/{}", field.name());
}

fn write_files(
    key: &str,
    field: &FieldMeta,
    slot: &mut dyn Any,
    files: &[FileHandle],
) -> Result<(), FieldError> {
    let Slot::File { assign, .. } = &field.slot else {
        tracing::debug!(key = %key, field = field.name(), "Ignoring files sent to a non-file field");
        return Ok(());
    };
    assign(slot, files).map_err(|source| FieldError::FileOpen {
        key: key.to_string(),
        source,
    })
}

fn conversion(key: &str, type_name: &'static str, index: Option<usize>, cause: BoxError) -> FieldError {
    FieldError::Conversion(ConversionError::new(key, type_name, index, Some(cause)))
}

fn no_converter(key: &str, type_name: &'static str) -> FieldError {
    FieldError::NoConverter {
        key: key.to_string(),
        type_name,
    }
}
