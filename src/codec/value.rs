//! Typed field values.

use serde::{Deserialize, Serialize};

use crate::protocol::WireType;

/// Value carried by a field.
///
/// Every variant corresponds to one scalar wire type; `Array` holds a
/// homogeneous list of scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    Blob(Vec<u8>),
    Array(Vec<Value>),
}

impl Value {
    /// Wire type this value is encoded as when no type is imposed.
    ///
    /// Returns `None` for an empty array, whose element type cannot be inferred.
    pub fn natural_wire_type(&self) -> Option<WireType> {
        let ty = match self {
            Self::String(_) => WireType::STRING,
            Self::Bool(_) => WireType::BOOL,
            Self::Int8(_) => WireType::SINT8,
            Self::UInt8(_) => WireType::UINT8,
            Self::Int16(_) => WireType::SINT16,
            Self::UInt16(_) => WireType::UINT16,
            Self::Int32(_) => WireType::SINT32,
            Self::UInt32(_) => WireType::UINT32,
            Self::Int64(_) => WireType::SINT64,
            Self::UInt64(_) => WireType::UINT64,
            Self::Double(_) => WireType::DOUBLE,
            Self::Blob(_) => WireType::BLOB,
            Self::Array(items) => {
                let base = items.first()?.natural_wire_type()?;
                if base.is_array() {
                    return None;
                }
                WireType::array_of(base)
            }
        };
        Some(ty)
    }

    /// Check whether this value can be written as `ty`.
    pub fn fits(&self, ty: WireType) -> bool {
        match self {
            Self::Array(items) => {
                ty.is_array()
                    && items
                        .iter()
                        .all(|item| !matches!(item, Self::Array(_)) && item.fits(ty.base()))
            }
            _ if ty.is_array() => false,
            Self::String(_) => ty == WireType::STRING,
            Self::Bool(_) => ty == WireType::BOOL,
            Self::Int8(_) => ty == WireType::SINT8,
            Self::UInt8(_) => ty == WireType::UINT8,
            Self::Int16(_) => ty == WireType::SINT16,
            Self::UInt16(_) => ty == WireType::UINT16,
            Self::Int32(_) => ty == WireType::SINT32 || ty == WireType::INTEGER,
            Self::UInt32(_) => ty == WireType::UINT32 || ty == WireType::UNSIGNED,
            Self::Int64(_) => ty == WireType::SINT64,
            Self::UInt64(_) => ty == WireType::UINT64,
            Self::Double(_) => ty == WireType::DOUBLE,
            Self::Blob(_) => ty == WireType::BLOB,
        }
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer or boolean value converted losslessly to `u32`.
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Self::Bool(b) => Some(u32::from(b)),
            Self::UInt8(v) => Some(u32::from(v)),
            Self::UInt16(v) => Some(u32::from(v)),
            Self::UInt32(v) => Some(v),
            Self::UInt64(v) => u32::try_from(v).ok(),
            Self::Int8(v) => u32::try_from(v).ok(),
            Self::Int16(v) => u32::try_from(v).ok(),
            Self::Int32(v) => u32::try_from(v).ok(),
            Self::Int64(v) => u32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Integer value converted losslessly to `i32`.
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Self::Int8(v) => Some(i32::from(v)),
            Self::Int16(v) => Some(i32::from(v)),
            Self::Int32(v) => Some(v),
            Self::Int64(v) => i32::try_from(v).ok(),
            Self::UInt8(v) => Some(i32::from(v)),
            Self::UInt16(v) => Some(i32::from(v)),
            Self::UInt32(v) => i32::try_from(v).ok(),
            Self::UInt64(v) => i32::try_from(v).ok(),
            _ => None,
        }
    }

    /// Elements, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}
