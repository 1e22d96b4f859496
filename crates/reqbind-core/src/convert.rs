//! Registry of custom converters keyed by target type.

use crate::leaf::{BoxError, ErasedConvert};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct Converter {
    pub(crate) name: &'static str,
    pub(crate) convert: ErasedConvert,
}

/// Custom converters registered on a decoder.
///
/// A converter registered for `T` takes precedence over every other
/// conversion path for fields of type `T`, and for elements of `Vec<T>`.
/// Registering for `Vec<T>` itself makes the whole sequence convert from a
/// single raw value.
#[derive(Clone, Default)]
pub struct Converters {
    by_type: HashMap<TypeId, Converter>,
}

impl Converters {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a converter for `T`, replacing any earlier one.
    pub fn register<T, F>(&mut self, convert: F)
    where
        T: Any + Send,
        F: Fn(&str) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let convert: ErasedConvert =
            Arc::new(move |raw| convert(raw).map(|value| Box::new(value) as Box<dyn Any + Send>));
        self.by_type.insert(
            TypeId::of::<T>(),
            Converter {
                name: std::any::type_name::<T>(),
                convert,
            },
        );
    }

    /// Returns true if a converter exists for `T`.
    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    pub(crate) fn get(&self, id: TypeId) -> Option<&Converter> {
        self.by_type.get(&id)
    }

    pub(crate) fn contains_id(&self, id: TypeId) -> bool {
        self.by_type.contains_key(&id)
    }

    /// Returns the number of registered converters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Converters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.by_type.values().map(|c| c.name))
            .finish()
    }
}
