//! # resmgr-client
//!
//! Rust client for the resource manager's native socket protocol.
//!
//! Applications group the resources they need (an audio stream, a display
//! plane, ...) into resource sets and ask the manager to acquire or release
//! them. The manager arbitrates between clients and pushes state changes
//! back as events.
//!
//! ## Architecture
//!
//! - **Codec**: typed fields (`tag`, `wire type`, `value`) to and from bytes
//! - **Protocol**: tag/request catalog, length-prefixed messages, request builders
//! - **Model**: resource sets rebuilt from messages, grant/advice bitmask merge
//! - **Session**: correlated request/reply over one socket, unsolicited event queue
//!
//! ## Example
//!
//! ```no_run
//! use resmgr_client::{ResourceSet, Session, DEFAULT_ADDRESS};
//!
//! #[tokio::main]
//! async fn main() -> resmgr_client::Result<()> {
//!     let session = Session::connect(DEFAULT_ADDRESS).await?;
//!
//!     println!("classes: {:?}", session.list_classes().await?);
//!
//!     let template = ResourceSet::from_names(["audio_playback"]);
//!     let id = session.create_set(&template, "player", "driver").await?;
//!     session.acquire_set(id).await?;
//!     println!("{:?}", session.get_set(id)?.state());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod model;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use codec::{Field, Value};
pub use error::{ResmgrError, Result};
pub use model::{Attribute, Resource, ResourceSet, SetState};
pub use protocol::{Message, RequestKind, SemanticTag, WireType};
pub use session::{Session, SessionBuilder, SessionState};
pub use transport::{Address, DEFAULT_ADDRESS};
