//! Transport module - manager addresses and socket connection.
//!
//! Provides:
//! - parsing of `unxs:`, `tcp4:` and `tcp6:` addresses
//! - connecting to abstract (Linux) and filesystem Unix sockets, and TCP

mod address;

pub use address::{Address, BoxedTransport, Transport, DEFAULT_ADDRESS};
