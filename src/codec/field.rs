//! Single typed fields and their byte-level encoding.

use bytes::{Buf, BufMut, BytesMut};

use super::Value;
use crate::error::{ResmgrError, Result};
use crate::protocol::{SemanticTag, WireType};

/// Size of the tag + data-type prefix of every field.
pub const FIELD_HEADER_SIZE: usize = 4;

/// A tagged, typed value as it travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    tag: SemanticTag,
    data_type: WireType,
    value: Value,
}

impl Field {
    /// Create a field whose wire type comes from the protocol catalog.
    ///
    /// Array values under a fixed-type tag become arrays of that type. Tags
    /// without a fixed type (`AttributeValue`) use the value's natural type.
    pub fn new(tag: SemanticTag, value: Value) -> Result<Self> {
        let data_type = match (tag.wire_type(), &value) {
            (Some(base), Value::Array(_)) => WireType::array_of(base),
            (Some(ty), _) => ty,
            (None, _) => value.natural_wire_type().ok_or(ResmgrError::TypeMismatch {
                tag,
                expected: WireType::INVALID,
            })?,
        };
        Self::with_type(tag, data_type, value)
    }

    /// Create a field with an explicit wire type.
    pub fn with_type(tag: SemanticTag, data_type: WireType, value: Value) -> Result<Self> {
        if !value.fits(data_type) {
            return Err(ResmgrError::TypeMismatch {
                tag,
                expected: data_type,
            });
        }
        Ok(Self {
            tag,
            data_type,
            value,
        })
    }

    /// Semantic tag.
    #[inline]
    pub fn tag(&self) -> SemanticTag {
        self.tag
    }

    /// Wire type the value was (or will be) encoded as.
    #[inline]
    pub fn data_type(&self) -> WireType {
        self.data_type
    }

    /// Borrow the value.
    #[inline]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the field, returning its value.
    #[inline]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Append the encoded field to `buf`.
    ///
    /// Fails if a string, blob or array is too long for its `u32` length
    /// prefix.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.tag.code());
        buf.put_u16(self.data_type.code());
        write_value(buf, &self.value)
    }
}

fn write_value(buf: &mut BytesMut, value: &Value) -> Result<()> {
    match value {
        Value::String(s) => {
            buf.put_u32(length_prefix(s.len(), 1, "string")?);
            buf.put_slice(s.as_bytes());
            buf.put_u8(0);
        }
        Value::Bool(b) => buf.put_u32(u32::from(*b)),
        Value::Int8(v) => buf.put_i8(*v),
        Value::UInt8(v) => buf.put_u8(*v),
        Value::Int16(v) => buf.put_i16(*v),
        Value::UInt16(v) => buf.put_u16(*v),
        Value::Int32(v) => buf.put_i32(*v),
        Value::UInt32(v) => buf.put_u32(*v),
        Value::Int64(v) => buf.put_i64(*v),
        Value::UInt64(v) => buf.put_u64(*v),
        Value::Double(v) => buf.put_slice(&v.to_ne_bytes()),
        Value::Blob(data) => {
            buf.put_u32(length_prefix(data.len(), 0, "blob")?);
            buf.put_slice(data);
        }
        Value::Array(items) => {
            buf.put_u32(length_prefix(items.len(), 0, "array")?);
            for item in items {
                write_value(buf, item)?;
            }
        }
    }
    Ok(())
}

/// `len + extra` as a `u32` length prefix.
fn length_prefix(len: usize, extra: usize, what: &str) -> Result<u32> {
    len.checked_add(extra)
        .and_then(|total| u32::try_from(total).ok())
        .ok_or_else(|| {
            ResmgrError::Protocol(format!("{what} length {len} does not fit a u32 prefix"))
        })
}

/// Decode one field from the front of `data`.
///
/// Returns the field and the number of bytes consumed.
pub(crate) fn decode(data: &[u8]) -> Result<(Field, usize)> {
    let mut cursor = data;

    ensure(cursor, FIELD_HEADER_SIZE, "field header")?;
    let tag_code = cursor.get_u16();
    let type_code = cursor.get_u16();

    let tag = SemanticTag::try_from(tag_code)
        .map_err(|code| malformed(format!("unknown field tag {code:#06x}")))?;
    let data_type = WireType::from_code(type_code)
        .ok_or_else(|| malformed(format!("unknown data type {type_code:#06x} for {tag}")))?;

    let value = read_value(&mut cursor, data_type)?;
    let consumed = data.len() - cursor.len();

    Ok((
        Field {
            tag,
            data_type,
            value,
        },
        consumed,
    ))
}

fn read_value(cursor: &mut &[u8], ty: WireType) -> Result<Value> {
    if !ty.is_array() {
        return read_scalar(cursor, ty);
    }

    let count = read_len(cursor, "array count")?;
    // Every element takes at least one byte.
    if count > cursor.len() {
        return Err(malformed(format!(
            "array count {count} exceeds remaining {} bytes",
            cursor.len()
        )));
    }

    let base = ty.base();
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(read_scalar(cursor, base)?);
    }
    Ok(Value::Array(items))
}

fn read_scalar(cursor: &mut &[u8], ty: WireType) -> Result<Value> {
    let value = match ty {
        WireType::STRING => {
            let len = read_len(cursor, "string length")?;
            if len == 0 {
                return Err(malformed("string length must include the terminator".into()));
            }
            ensure(cursor, len, "string")?;
            if cursor[len - 1] != 0 {
                return Err(malformed("string is not NUL-terminated".into()));
            }
            let text = std::str::from_utf8(&cursor[..len - 1])
                .map_err(|e| malformed(format!("string is not valid UTF-8: {e}")))?
                .to_string();
            cursor.advance(len);
            Value::String(text)
        }
        WireType::BOOL => {
            ensure(cursor, 4, "bool")?;
            Value::Bool(cursor.get_u32() != 0)
        }
        WireType::UINT8 => {
            ensure(cursor, 1, "uint8")?;
            Value::UInt8(cursor.get_u8())
        }
        WireType::SINT8 => {
            ensure(cursor, 1, "sint8")?;
            Value::Int8(cursor.get_i8())
        }
        WireType::UINT16 => {
            ensure(cursor, 2, "uint16")?;
            Value::UInt16(cursor.get_u16())
        }
        WireType::SINT16 => {
            ensure(cursor, 2, "sint16")?;
            Value::Int16(cursor.get_i16())
        }
        WireType::UINT32 | WireType::UNSIGNED => {
            ensure(cursor, 4, "uint32")?;
            Value::UInt32(cursor.get_u32())
        }
        WireType::SINT32 | WireType::INTEGER => {
            ensure(cursor, 4, "sint32")?;
            Value::Int32(cursor.get_i32())
        }
        WireType::UINT64 => {
            ensure(cursor, 8, "uint64")?;
            Value::UInt64(cursor.get_u64())
        }
        WireType::SINT64 => {
            ensure(cursor, 8, "sint64")?;
            Value::Int64(cursor.get_i64())
        }
        WireType::DOUBLE => {
            ensure(cursor, 8, "double")?;
            let mut raw = [0u8; 8];
            cursor.copy_to_slice(&mut raw);
            Value::Double(f64::from_ne_bytes(raw))
        }
        WireType::BLOB => {
            let len = read_len(cursor, "blob length")?;
            ensure(cursor, len, "blob")?;
            let data = cursor[..len].to_vec();
            cursor.advance(len);
            Value::Blob(data)
        }
        other => return Err(malformed(format!("unexpected element type {other}"))),
    };
    Ok(value)
}

fn read_len(cursor: &mut &[u8], what: &str) -> Result<usize> {
    ensure(cursor, 4, what)?;
    Ok(cursor.get_u32() as usize)
}

fn ensure(cursor: &[u8], needed: usize, what: &str) -> Result<()> {
    if cursor.len() < needed {
        return Err(malformed(format!(
            "{what} needs {needed} bytes, {} remaining",
            cursor.len()
        )));
    }
    Ok(())
}

fn malformed(reason: String) -> ResmgrError {
    ResmgrError::MalformedField(reason)
}
