//! Error types for resmgr-client.

use thiserror::Error;

use crate::protocol::{SemanticTag, WireType};

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ResmgrError {
    /// I/O error on the underlying socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A field could not be decoded (truncated buffer, bad length, unknown type).
    #[error("Malformed field: {0}")]
    MalformedField(String),

    /// The message envelope carried a tag other than the default one.
    #[error("Unsupported message type: {0:#06x}")]
    UnsupportedMessageType(u16),

    /// An attribute value arrived without a preceding attribute name.
    #[error("Attribute value without a name in resource {resource:?}")]
    OrphanAttributeValue {
        /// Name of the resource group the value appeared in, if known yet.
        resource: Option<String>,
    },

    /// A value handed to the encoder does not fit the tag's wire type.
    #[error("Value for {tag} does not match wire type {expected}")]
    TypeMismatch {
        /// Tag being encoded.
        tag: SemanticTag,
        /// Wire type the value should have had.
        expected: WireType,
    },

    /// A message length header exceeds the configured maximum.
    #[error("Message size {size} exceeds maximum {max}")]
    MessageTooLarge {
        /// Declared body length.
        size: u32,
        /// Configured limit.
        max: u32,
    },

    /// The manager answered with a nonzero status code.
    #[error("Request rejected with status {0}")]
    RequestRejected(i32),

    /// No correlated reply arrived before the deadline.
    #[error("Timed out waiting for reply")]
    Timeout,

    /// The transport failed while the request was outstanding.
    #[error("Connection lost")]
    ConnectionLost,

    /// The session was closed before the operation started.
    #[error("Session closed")]
    SessionClosed,

    /// The set id is not known to this session.
    #[error("Unknown resource set {0}")]
    UnknownSet(u32),

    /// The transport address could not be parsed.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A reply was missing data the operation needs.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ResmgrError {
    /// Check if this error only affects a single message body.
    ///
    /// Decode errors leave the stream aligned on the next message, so a
    /// receive loop can log them and keep reading.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedField(_) | Self::UnsupportedMessageType(_)
        )
    }
}

/// Result type alias using ResmgrError.
pub type Result<T> = std::result::Result<T, ResmgrError>;
