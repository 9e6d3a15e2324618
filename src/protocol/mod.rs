//! Protocol module - wire types, catalog, messages and framing.
//!
//! This module implements the manager's message protocol:
//! - wire data types and envelope constants
//! - the catalog of semantic tags and request kinds
//! - messages, their length-prefixed framing and the request builders
//! - a message buffer for accumulating partial reads

mod catalog;
mod message;
mod message_buffer;
mod requests;
mod wire_format;

pub use catalog::{request_kind_wire_value, tag_wire_type, RequestKind, SemanticTag};
pub use message::{frame, Message};
pub use message_buffer::{MessageBuffer, MessageReader};
pub use requests::{create_set_request, query_request, set_request};
pub use wire_format::{
    WireType, DEFAULT_MAX_MESSAGE_SIZE, ENVELOPE_SIZE, LENGTH_SIZE, MESSAGE_TAG_DEFAULT,
};
