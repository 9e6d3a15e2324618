//! Message buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented messages:
//! - `WaitingForLength`: Need at least 4 bytes
//! - `WaitingForBody`: Length parsed, need N more body bytes
//!
//! Bodies are split off by length alone, before any field is decoded, so a
//! body that fails to decode never knocks the stream out of alignment.
//!
//! # Example
//!
//! ```
//! use resmgr_client::protocol::{frame, MessageBuffer};
//!
//! let bytes = frame(&[]).unwrap();
//! let mut buffer = MessageBuffer::new();
//!
//! // Data arrives in chunks from the socket
//! assert!(buffer.push(&bytes[..3]).unwrap().is_empty());
//! let bodies = buffer.push(&bytes[3..]).unwrap();
//! assert_eq!(bodies.len(), 1);
//! ```

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::message::Message;
use super::wire_format::{DEFAULT_MAX_MESSAGE_SIZE, LENGTH_SIZE};
use crate::error::{ResmgrError, Result};

/// Size of a single socket read in [`MessageReader`].
const READ_CHUNK_SIZE: usize = 4096;

/// State machine for message parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the complete length prefix (need 4 bytes).
    WaitingForLength,
    /// Length parsed, waiting for body bytes.
    WaitingForBody { remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete message bodies.
pub struct MessageBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_message_size: u32,
}

impl MessageBuffer {
    /// Create a new message buffer with default settings.
    ///
    /// Default capacity: 4KB, max body: 16MB.
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a new message buffer with a custom maximum body size.
    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            state: State::WaitingForLength,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete message bodies.
    ///
    /// Each returned body starts at the message tag (the length prefix is
    /// stripped). Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns [`ResmgrError::MessageTooLarge`] if a length prefix exceeds
    /// the configured maximum. The stream cannot be resynchronised after this.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(data);

        let mut bodies = Vec::new();
        while let Some(body) = self.try_extract_one()? {
            bodies.push(body);
        }
        Ok(bodies)
    }

    /// Try to extract a single body from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(body))` if a complete body was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the length prefix is over the limit
    pub fn try_extract_one(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::WaitingForLength => {
                    if self.buffer.len() < LENGTH_SIZE {
                        return Ok(None);
                    }

                    let b = &self.buffer[..LENGTH_SIZE];
                    let length = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
                    if length > self.max_message_size {
                        return Err(ResmgrError::MessageTooLarge {
                            size: length,
                            max: self.max_message_size,
                        });
                    }

                    self.buffer.advance(LENGTH_SIZE);
                    self.state = State::WaitingForBody { remaining: length };
                }

                State::WaitingForBody { remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForLength;
                    return Ok(Some(body));
                }
            }
        }
    }

    /// Append data to the buffer without extracting bodies.
    ///
    /// Prefer using `push()` which does extend + extract in one call.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForLength => "WaitingForLength",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads whole messages from a byte stream, one at a time.
///
/// The transport may hand back fewer bytes than requested per read; the
/// reader keeps issuing reads until a complete body is buffered.
pub struct MessageReader<R> {
    reader: R,
    buffer: MessageBuffer,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Wrap a reader using the default maximum message size.
    pub fn new(reader: R) -> Self {
        Self::with_max_message_size(reader, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Wrap a reader with a custom maximum message size.
    pub fn with_max_message_size(reader: R, max_message_size: u32) -> Self {
        Self {
            reader,
            buffer: MessageBuffer::with_max_message_size(max_message_size),
            chunk: vec![0u8; READ_CHUNK_SIZE],
        }
    }

    /// Read the next complete message body without decoding it.
    ///
    /// A clean end of stream yields [`ResmgrError::ConnectionLost`].
    pub async fn read_body(&mut self) -> Result<Bytes> {
        loop {
            if let Some(body) = self.buffer.try_extract_one()? {
                return Ok(body);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                return Err(ResmgrError::ConnectionLost);
            }
            self.buffer.extend(&self.chunk[..n]);
        }
    }

    /// Read and decode the next message.
    ///
    /// Decode failures ([`ResmgrError::is_decode_error`]) leave the stream
    /// aligned on the next message; any other error is fatal for the stream.
    pub async fn read_one_message(&mut self) -> Result<Message> {
        let body = self.read_body().await?;
        Message::decode_body(&body)
    }
}
