//! Field codec - typed fields to and from bytes.
//!
//! This module knows how single fields look on the wire and nothing about
//! what a message means:
//!
//! - [`Value`] - tagged union of every value the protocol can carry
//! - [`Field`] - a semantic tag, a wire type and a value
//! - [`FieldCodec`] - encode/decode of single fields
//!
//! # Design
//!
//! Like the message framer, the codec is a marker struct with static methods.
//! The wire type of a field is resolved through the protocol catalog when the
//! field is built, so callers only state the tag and the value.
//!
//! # Example
//!
//! ```
//! use resmgr_client::codec::{decode_field, encode_field, Value};
//! use resmgr_client::protocol::SemanticTag;
//!
//! let bytes = encode_field(SemanticTag::ZoneName, Value::from("driver")).unwrap();
//! let (field, consumed) = decode_field(&bytes).unwrap();
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(field.value().as_str(), Some("driver"));
//! ```

mod field;
mod value;

use bytes::{Bytes, BytesMut};

pub use field::{Field, FIELD_HEADER_SIZE};
pub use value::Value;

use crate::error::Result;
use crate::protocol::SemanticTag;

/// Codec for single fields.
pub struct FieldCodec;

impl FieldCodec {
    /// Encode a field into a fresh buffer.
    #[inline]
    pub fn encode(field: &Field) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        field.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a field onto the end of `buf`.
    #[inline]
    pub fn encode_into(field: &Field, buf: &mut BytesMut) -> Result<()> {
        field.encode_into(buf)
    }

    /// Decode one field from the front of `data`.
    ///
    /// Returns the field and the number of bytes it occupied.
    #[inline]
    pub fn decode(data: &[u8]) -> Result<(Field, usize)> {
        field::decode(data)
    }
}

/// Encode `value` under `tag`, taking the wire type from the catalog.
pub fn encode_field(tag: SemanticTag, value: Value) -> Result<Bytes> {
    let field = Field::new(tag, value)?;
    FieldCodec::encode(&field)
}

/// Decode one field from the front of `data` (standalone function).
#[inline]
pub fn decode_field(data: &[u8]) -> Result<(Field, usize)> {
    FieldCodec::decode(data)
}
