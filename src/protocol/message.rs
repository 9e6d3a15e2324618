//! Messages and the length-prefixed envelope around them.
//!
//! A [`Message`] is an ordered list of fields. [`frame`] wraps fields in the
//! default envelope; [`Message::decode_body`] undoes it once the length
//! prefix has been stripped by the [`MessageBuffer`](super::MessageBuffer).
//!
//! # Example
//!
//! ```
//! use resmgr_client::codec::{Field, Value};
//! use resmgr_client::protocol::{Message, SemanticTag, LENGTH_SIZE};
//!
//! let message = Message::new(vec![
//!     Field::new(SemanticTag::SequenceNo, Value::UInt32(1)).unwrap(),
//!     Field::new(SemanticTag::RequestType, Value::UInt16(0)).unwrap(),
//! ]);
//! let bytes = message.encode().unwrap();
//! let decoded = Message::decode_body(&bytes[LENGTH_SIZE..]).unwrap();
//!
//! assert_eq!(decoded, message);
//! assert_eq!(decoded.seq_num(), Some(1));
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::catalog::{RequestKind, SemanticTag};
use super::wire_format::{ENVELOPE_SIZE, LENGTH_SIZE, MESSAGE_TAG_DEFAULT};
use crate::codec::{Field, FieldCodec, Value};
use crate::error::{ResmgrError, Result};

/// A decoded or under-construction protocol message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    /// Create a message from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Append a field while building a request.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// All fields in wire order.
    #[inline]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the message has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First field with the given tag.
    pub fn field(&self, tag: SemanticTag) -> Option<&Field> {
        self.fields.iter().find(|f| f.tag() == tag)
    }

    /// Sequence number of the request this message belongs to.
    pub fn seq_num(&self) -> Option<u32> {
        self.field(SemanticTag::SequenceNo)?.value().as_u32()
    }

    /// Request kind, if present and known.
    pub fn req_type(&self) -> Option<RequestKind> {
        let code = self.field(SemanticTag::RequestType)?.value().as_u32()?;
        RequestKind::try_from(u16::try_from(code).ok()?).ok()
    }

    /// Status code reported by the manager (0 = success).
    pub fn status(&self) -> Option<i32> {
        self.field(SemanticTag::RequestStatus)?.value().as_i32()
    }

    /// Resource set id carried by the message.
    pub fn set_id(&self) -> Option<u32> {
        self.field(SemanticTag::ResourceSetId)?.value().as_u32()
    }

    /// Encode the message with its envelope and length prefix.
    #[inline]
    pub fn encode(&self) -> Result<Bytes> {
        frame(&self.fields)
    }

    /// Decode a message body (everything after the length prefix).
    ///
    /// A tag other than the default is rejected with
    /// [`ResmgrError::UnsupportedMessageType`].
    pub fn decode_body(body: &[u8]) -> Result<Self> {
        let mut cursor = body;
        if cursor.len() < ENVELOPE_SIZE {
            return Err(ResmgrError::MalformedField(format!(
                "message body of {} bytes is shorter than its envelope",
                cursor.len()
            )));
        }

        let tag = cursor.get_u16();
        if tag != MESSAGE_TAG_DEFAULT {
            return Err(ResmgrError::UnsupportedMessageType(tag));
        }

        let field_count = cursor.get_u16();
        let mut fields = Vec::with_capacity(usize::from(field_count));

        for _ in 0..field_count {
            let (field, consumed) = FieldCodec::decode(cursor)?;
            cursor.advance(consumed);
            fields.push(field);
        }

        if !cursor.is_empty() {
            tracing::debug!("Ignoring {} trailing bytes after last field", cursor.len());
        }

        Ok(Self { fields })
    }
}

/// Wrap fields in the default envelope and prefix the total length.
pub fn frame(fields: &[Field]) -> Result<Bytes> {
    let field_count = u16::try_from(fields.len()).map_err(|_| {
        ResmgrError::Protocol(format!("{} fields do not fit in one message", fields.len()))
    })?;

    let mut buf = BytesMut::with_capacity(64);
    buf.put_u32(0); // patched below
    buf.put_u16(MESSAGE_TAG_DEFAULT);
    buf.put_u16(field_count);
    for field in fields {
        FieldCodec::encode_into(field, &mut buf)?;
    }

    let body_length = u32::try_from(buf.len() - LENGTH_SIZE).map_err(|_| {
        ResmgrError::Protocol(format!("message body of {} bytes is too large", buf.len()))
    })?;
    buf[..LENGTH_SIZE].copy_from_slice(&body_length.to_be_bytes());

    Ok(buf.freeze())
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Message:")?;
        writeln!(f, "\tType: Default ({MESSAGE_TAG_DEFAULT})")?;
        writeln!(f, "\tFields: {}", self.fields.len())?;

        for field in &self.fields {
            let tag = field.tag();
            write!(f, "\tField: {} ({}) | ", tag, tag.code())?;
            let kind = (tag == SemanticTag::RequestType)
                .then(|| field.value().as_u32())
                .flatten()
                .and_then(|code| u16::try_from(code).ok())
                .and_then(|code| RequestKind::try_from(code).ok());

            match (kind, field.value()) {
                (Some(kind), _) => writeln!(f, "{} ({})", kind, kind.wire_value())?,
                (None, Value::String(s)) => writeln!(f, "{s}")?,
                (None, value) => writeln!(f, "{value:?}")?,
            }
        }
        Ok(())
    }
}
