//! Background receive task.

use std::sync::Arc;

use tokio::io::AsyncRead;

use super::Shared;
use crate::error::ResmgrError;
use crate::protocol::{Message, MessageReader, RequestKind};

/// Read messages until the transport fails or the session is closed.
///
/// Undecodable messages are dropped and reading continues. Any other error
/// ends the loop; on exit the session is closed and every waiter released.
pub(super) async fn receive_loop<R>(mut reader: MessageReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            _ = shared.shutdown.notified() => {
                tracing::debug!("Receive loop stopped");
                break;
            }
            result = reader.read_one_message() => match result {
                Ok(message) => dispatch(&shared, message),
                Err(e) if e.is_decode_error() => {
                    tracing::warn!("Dropping undecodable message: {}", e);
                }
                Err(ResmgrError::ConnectionLost) => {
                    tracing::debug!("Manager closed the connection");
                    break;
                }
                Err(e) => {
                    tracing::error!("Receive loop error: {}", e);
                    break;
                }
            },
        }
    }

    shared.close_all();
}

/// Route one message to its waiter or the event queue.
fn dispatch(shared: &Shared, message: Message) {
    let kind = message.req_type();
    let Some(key) = message.seq_num().zip(kind) else {
        if kind == Some(RequestKind::ResourcesEvent) {
            tracing::debug!("Queueing resource event without sequence number");
            shared.lock().events.push_back(message);
        } else {
            tracing::warn!("Discarding message without sequence number or request type");
        }
        return;
    };

    let mut inner = shared.lock();
    match inner.waiters.fulfill(key, message) {
        Ok(()) => tracing::debug!(seq = key.0, kind = %key.1, "Delivered reply"),
        Err(message) if key.1 == RequestKind::ResourcesEvent => {
            tracing::debug!(seq = key.0, set = ?message.set_id(), "Queueing unsolicited event");
            inner.events.push_back(message);
        }
        Err(_) => {
            tracing::warn!(seq = key.0, kind = %key.1, "Discarding reply nobody is waiting for");
        }
    }
}
