//! Leaf value types and their builtin string conversions.
//!
//! A leaf is any field value that is written from one raw string rather than
//! walked into. Builtin scalars convert through [`ScalarKind`]; user types opt
//! in through [`Leaf::text_decoder`], the self-describing textual decode
//! capability.

use std::any::{Any, TypeId};
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Boxed error carried as the cause of a conversion failure.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Decodes a leaf value from one raw string.
pub type TextDecoder<T> = fn(&str) -> Result<T, BoxError>;

/// A type-erased converter producing a boxed value of a known [`TypeId`].
pub(crate) type ErasedConvert =
    Arc<dyn Fn(&str) -> Result<Box<dyn Any + Send>, BoxError> + Send + Sync>;

/// A value type that can be written from raw request strings.
///
/// Builtin numbers, `bool` and `String` map to a [`ScalarKind`]. User types
/// implement [`Leaf::text_decoder`] to decode themselves, or rely on a
/// converter registered on the decoder.
///
/// ```rust
/// use reqbind_core::{parse_text, Leaf, TextDecoder};
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Port(u16);
///
/// impl std::str::FromStr for Port {
///     type Err = std::num::ParseIntError;
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         s.parse().map(Port)
///     }
/// }
///
/// impl Leaf for Port {
///     fn text_decoder() -> Option<TextDecoder<Self>> {
///         Some(parse_text::<Port>)
///     }
/// }
///
/// assert_eq!((Port::text_decoder().unwrap())("8080").unwrap(), Port(8080));
/// ```
pub trait Leaf: Any + Send + Default {
    /// Builtin conversion kind, if this is a builtin scalar.
    fn scalar_kind() -> Option<ScalarKind> {
        None
    }

    /// Self-describing textual decoder, if the type provides one.
    fn text_decoder() -> Option<TextDecoder<Self>> {
        None
    }
}

/// Parses any [`FromStr`] type, boxing its error.
///
/// Convenient as a [`TextDecoder`] for types that already implement
/// `FromStr`.
///
/// # Errors
///
/// Returns the boxed `FromStr` error.
pub fn parse_text<T>(text: &str) -> Result<T, BoxError>
where
    T: FromStr,
    T::Err: Into<BoxError>,
{
    text.parse::<T>().map_err(Into::into)
}

/// Closed set of builtin scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `isize`
    Isize,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `usize`
    Usize,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// `String`
    Str,
}

/// A `bool` token outside the accepted set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid boolean {0:?}")]
pub struct InvalidBool(String);

fn parse_bool(text: &str) -> Result<bool, InvalidBool> {
    match text {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(InvalidBool(text.to_string())),
    }
}

fn boxed<T: Any + Send>(value: T) -> Box<dyn Any + Send> {
    Box::new(value)
}

impl ScalarKind {
    /// Every kind, used to validate the builtin table.
    pub const ALL: [ScalarKind; 14] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::Isize,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::Usize,
        Self::F32,
        Self::F64,
        Self::Str,
    ];

    /// Returns the Rust type this kind converts into.
    #[must_use]
    pub fn type_id(self) -> TypeId {
        match self {
            Self::Bool => TypeId::of::<bool>(),
            Self::I8 => TypeId::of::<i8>(),
            Self::I16 => TypeId::of::<i16>(),
            Self::I32 => TypeId::of::<i32>(),
            Self::I64 => TypeId::of::<i64>(),
            Self::Isize => TypeId::of::<isize>(),
            Self::U8 => TypeId::of::<u8>(),
            Self::U16 => TypeId::of::<u16>(),
            Self::U32 => TypeId::of::<u32>(),
            Self::U64 => TypeId::of::<u64>(),
            Self::Usize => TypeId::of::<usize>(),
            Self::F32 => TypeId::of::<f32>(),
            Self::F64 => TypeId::of::<f64>(),
            Self::Str => TypeId::of::<String>(),
        }
    }

    /// Converts `text` into a boxed value of this kind.
    ///
    /// Numbers are base 10 and must consume the whole token.
    ///
    /// # Errors
    ///
    /// Returns the underlying parse error.
    pub fn convert(self, text: &str) -> Result<Box<dyn Any + Send>, BoxError> {
        Ok(match self {
            Self::Bool => boxed(parse_bool(text)?),
            Self::I8 => boxed(text.parse::<i8>()?),
            Self::I16 => boxed(text.parse::<i16>()?),
            Self::I32 => boxed(text.parse::<i32>()?),
            Self::I64 => boxed(text.parse::<i64>()?),
            Self::Isize => boxed(text.parse::<isize>()?),
            Self::U8 => boxed(text.parse::<u8>()?),
            Self::U16 => boxed(text.parse::<u16>()?),
            Self::U32 => boxed(text.parse::<u32>()?),
            Self::U64 => boxed(text.parse::<u64>()?),
            Self::Usize => boxed(text.parse::<usize>()?),
            Self::F32 => boxed(text.parse::<f32>()?),
            Self::F64 => boxed(text.parse::<f64>()?),
            Self::Str => boxed(text.to_string()),
        })
    }
}

macro_rules! builtin_leaf {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Leaf for $ty {
                fn scalar_kind() -> Option<ScalarKind> {
                    Some(ScalarKind::$kind)
                }
            }
        )*
    };
}

builtin_leaf! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => Str,
}

/// Type-erased description of a leaf type, captured at declaration time.
#[derive(Clone)]
pub(crate) struct LeafType {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    pub(crate) kind: Option<ScalarKind>,
    pub(crate) text: Option<ErasedConvert>,
    pub(crate) zero: fn() -> Box<dyn Any + Send>,
}

impl LeafType {
    pub(crate) fn of<T: Leaf>() -> Self {
        let text = T::text_decoder().map(|decode| -> ErasedConvert {
            Arc::new(move |raw| decode(raw).map(|value| Box::new(value) as Box<dyn Any + Send>))
        });
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            kind: T::scalar_kind(),
            text,
            zero: || Box::new(T::default()),
        }
    }
}

impl fmt::Debug for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("text", &self.text.is_some())
            .finish_non_exhaustive()
    }
}
