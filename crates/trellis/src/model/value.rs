//! Cell payloads exchanged with the data provider.
//!
//! A [`CellValue`] carries whatever the provider supplies for one cell or
//! header. The bridge caches these values and hands them to the view; it
//! never interprets their contents. [`CellValue::None`] is a valid,
//! displayable "nothing here" value, distinct from a provider failure.

use std::any::Any;
use std::sync::Arc;

/// Type-erased container for cell and header data.
///
/// # Example
///
/// ```
/// use trellis::model::CellValue;
///
/// let value = CellValue::from("label");
/// assert_eq!(value.as_str(), Some("label"));
///
/// let count = CellValue::from(42i64);
/// assert_eq!(count.as_int(), Some(42));
/// ```
#[derive(Clone, Default)]
pub enum CellValue {
    /// No data. A valid, displayable value (an empty cell).
    #[default]
    None,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text value.
    String(String),
    /// Raw binary payload.
    Bytes(Vec<u8>),
    /// Application-specific payload the bridge passes through untouched.
    User(Arc<dyn Any + Send + Sync>),
}

impl CellValue {
    /// Returns `true` if this is [`CellValue::None`].
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, CellValue::None)
    }

    /// Returns the text value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Consumes the value and returns the text, if this is a string.
    pub fn into_string(self) -> Option<String> {
        match self {
            CellValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            CellValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the floating-point value, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the binary payload, if this holds bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CellValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Downcasts a user payload to a concrete type.
    pub fn as_user<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            CellValue::User(any) => any.downcast_ref(),
            _ => None,
        }
    }
}

impl std::fmt::Debug for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::None => write!(f, "CellValue::None"),
            CellValue::Bool(b) => f.debug_tuple("CellValue::Bool").field(b).finish(),
            CellValue::Int(n) => f.debug_tuple("CellValue::Int").field(n).finish(),
            CellValue::Float(x) => f.debug_tuple("CellValue::Float").field(x).finish(),
            CellValue::String(s) => f.debug_tuple("CellValue::String").field(s).finish(),
            CellValue::Bytes(b) => write!(f, "CellValue::Bytes({} bytes)", b.len()),
            CellValue::User(_) => write!(f, "CellValue::User(..)"),
        }
    }
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellValue::None, CellValue::None) => true,
            (CellValue::Bool(a), CellValue::Bool(b)) => a == b,
            (CellValue::Int(a), CellValue::Int(b)) => a == b,
            (CellValue::Float(a), CellValue::Float(b)) => a == b,
            (CellValue::String(a), CellValue::String(b)) => a == b,
            (CellValue::Bytes(a), CellValue::Bytes(b)) => a == b,
            // User payloads compare by identity, not contents.
            (CellValue::User(a), CellValue::User(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<&String> for CellValue {
    fn from(s: &String) -> Self {
        CellValue::String(s.clone())
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Int(n)
    }
}

impl From<i32> for CellValue {
    fn from(n: i32) -> Self {
        CellValue::Int(n as i64)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<Vec<u8>> for CellValue {
    fn from(b: Vec<u8>) -> Self {
        CellValue::Bytes(b)
    }
}
