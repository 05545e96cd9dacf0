//! The scalar value cell.
//!
//! [`Value`] is a type-safe variant capable of holding any one of the
//! closed set of scalar kinds carried over the wire, or nothing at all.
//! It replaces the usual "dynamically typed any" with a discriminated
//! union plus exhaustive per-kind conversion tables: [`extract_exact`]
//! fails unless the stored kind matches the requested Rust type, while
//! [`extract_converted`] applies the defined numeric/textual conversions.
//!
//! [`extract_exact`]: Value::extract_exact
//! [`extract_converted`]: Value::extract_converted

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of scalar kinds a [`Value`] can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
}

/// A scalar cell: exactly one active representation, or empty.
///
/// Copy is deep copy (`Clone`), move is a storage transfer: [`take`]
/// leaves the source empty, matching the move semantics call sites rely
/// on when shuttling readings between bindings.
///
/// [`take`]: Value::take
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// No value held.
    #[default]
    Empty,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
}

impl Value {
    /// Creates an empty cell.
    #[must_use]
    pub const fn empty() -> Self {
        Value::Empty
    }

    /// Returns the kind currently stored, or `None` when empty.
    #[must_use]
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Empty => None,
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Int8(_) => Some(ScalarKind::Int8),
            Value::Int16(_) => Some(ScalarKind::Int16),
            Value::Int32(_) => Some(ScalarKind::Int32),
            Value::Int64(_) => Some(ScalarKind::Int64),
            Value::UInt8(_) => Some(ScalarKind::UInt8),
            Value::UInt16(_) => Some(ScalarKind::UInt16),
            Value::UInt32(_) => Some(ScalarKind::UInt32),
            Value::UInt64(_) => Some(ScalarKind::UInt64),
            Value::Float32(_) => Some(ScalarKind::Float32),
            Value::Float64(_) => Some(ScalarKind::Float64),
            Value::String(_) => Some(ScalarKind::String),
        }
    }

    /// Returns true when no value is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Moves the stored value out, leaving the cell empty.
    #[must_use]
    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }

    /// Swaps the contents of two cells.
    pub fn swap(&mut self, other: &mut Value) {
        std::mem::swap(self, other);
    }

    /// Extracts the stored value as `T`, failing with
    /// [`Error::TypeMismatch`] unless the stored kind is exactly `T`'s.
    pub fn extract_exact<T: Scalar>(&self) -> Result<T> {
        T::unwrap_exact(self).ok_or(Error::TypeMismatch {
            held: self.kind(),
            requested: T::KIND,
        })
    }

    /// Extracts the stored value as `T`, converting across kinds.
    ///
    /// Integer/float casts truncate toward zero, booleans map to 0/1,
    /// any scalar formats to text, and text parses to the requested
    /// kind. Fails with [`Error::EmptyValue`] on an empty cell.
    pub fn extract_converted<T: Scalar>(&self) -> Result<T> {
        if self.is_empty() {
            return Err(Error::EmptyValue);
        }
        T::convert(self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => write!(f, "(nil)"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt8(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
        }
    }
}

/// A Rust type that maps onto one of the scalar kinds.
///
/// Implemented for the closed set only; the engines are generic over
/// this trait rather than over arbitrary types.
pub trait Scalar: Sized {
    /// The kind tag corresponding to this Rust type.
    const KIND: ScalarKind;

    /// Wraps a plain value into a cell.
    fn wrap(self) -> Value;

    /// Unwraps only when the stored kind matches exactly.
    fn unwrap_exact(value: &Value) -> Option<Self>;

    /// Converts from any non-empty stored kind. The cell is guaranteed
    /// non-empty by the caller.
    fn convert(value: &Value) -> Result<Self>;
}

macro_rules! impl_numeric_scalar {
    ($ty:ty, $kind:ident) => {
        impl Scalar for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn wrap(self) -> Value {
                Value::$kind(self)
            }

            fn unwrap_exact(value: &Value) -> Option<Self> {
                match value {
                    Value::$kind(v) => Some(*v),
                    _ => None,
                }
            }

            fn convert(value: &Value) -> Result<Self> {
                match value {
                    Value::Empty => Err(Error::EmptyValue),
                    Value::Bool(v) => Ok((*v as u8) as $ty),
                    Value::Int8(v) => Ok(*v as $ty),
                    Value::Int16(v) => Ok(*v as $ty),
                    Value::Int32(v) => Ok(*v as $ty),
                    Value::Int64(v) => Ok(*v as $ty),
                    Value::UInt8(v) => Ok(*v as $ty),
                    Value::UInt16(v) => Ok(*v as $ty),
                    Value::UInt32(v) => Ok(*v as $ty),
                    Value::UInt64(v) => Ok(*v as $ty),
                    Value::Float32(v) => Ok(*v as $ty),
                    Value::Float64(v) => Ok(*v as $ty),
                    Value::String(s) => {
                        s.trim().parse::<$ty>().map_err(|_| Error::Unparseable {
                            text: s.clone(),
                            requested: ScalarKind::$kind,
                        })
                    }
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$kind(v)
            }
        }
    };
}

impl_numeric_scalar!(i8, Int8);
impl_numeric_scalar!(i16, Int16);
impl_numeric_scalar!(i32, Int32);
impl_numeric_scalar!(i64, Int64);
impl_numeric_scalar!(u8, UInt8);
impl_numeric_scalar!(u16, UInt16);
impl_numeric_scalar!(u32, UInt32);
impl_numeric_scalar!(u64, UInt64);
impl_numeric_scalar!(f32, Float32);
impl_numeric_scalar!(f64, Float64);

impl Scalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn wrap(self) -> Value {
        Value::Bool(self)
    }

    fn unwrap_exact(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn convert(value: &Value) -> Result<Self> {
        match value {
            Value::Empty => Err(Error::EmptyValue),
            Value::Bool(v) => Ok(*v),
            Value::Int8(v) => Ok(*v != 0),
            Value::Int16(v) => Ok(*v != 0),
            Value::Int32(v) => Ok(*v != 0),
            Value::Int64(v) => Ok(*v != 0),
            Value::UInt8(v) => Ok(*v != 0),
            Value::UInt16(v) => Ok(*v != 0),
            Value::UInt32(v) => Ok(*v != 0),
            Value::UInt64(v) => Ok(*v != 0),
            Value::Float32(v) => Ok(*v != 0.0),
            Value::Float64(v) => Ok(*v != 0.0),
            Value::String(s) => s.trim().parse::<bool>().map_err(|_| Error::Unparseable {
                text: s.clone(),
                requested: ScalarKind::Bool,
            }),
        }
    }
}

impl Scalar for String {
    const KIND: ScalarKind = ScalarKind::String;

    fn wrap(self) -> Value {
        Value::String(self)
    }

    fn unwrap_exact(value: &Value) -> Option<Self> {
        match value {
            Value::String(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn convert(value: &Value) -> Result<Self> {
        match value {
            Value::Empty => Err(Error::EmptyValue),
            other => Ok(other.to_string()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
