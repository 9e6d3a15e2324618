//! Client session: one connection to the manager.
//!
//! A [`Session`] owns the transport. Requests are framed and queued on the
//! writer task; a background receive task reads every incoming message and
//! routes it:
//!
//! 1. to the waiter registered for its `(sequence number, request kind)`;
//! 2. otherwise, if it is a resource event, to the session's event queue
//!    (drained by [`Session::parse_received_events`]);
//! 3. otherwise it is logged and dropped.
//!
//! Create, acquire and release are answered twice by the manager: first a
//! status reply, then a resource event carrying the authoritative set. The
//! session waits for both and keeps the resulting set in its known-sets
//! table.
//!
//! # Example
//!
//! ```no_run
//! use resmgr_client::{ResourceSet, Session};
//!
//! # async fn run() -> resmgr_client::Result<()> {
//! let session = Session::connect("unxs:@murphy-resource-native").await?;
//!
//! let template = ResourceSet::from_names(["audio_playback"]);
//! let id = session.create_set(&template, "player", "driver").await?;
//! session.acquire_set(id).await?;
//!
//! let set = session.get_set(id)?;
//! println!("acquired: {}", set.acquired);
//!
//! session.release_set(id).await?;
//! session.destroy_set(id).await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod correlation;
mod receive;

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;

use crate::codec::Value;
use crate::error::{ResmgrError, Result};
use crate::model::{build_resource_set, build_resources, Resource, ResourceSet};
use crate::protocol::{
    create_set_request, query_request, set_request, Message, MessageReader, RequestKind,
    SemanticTag, DEFAULT_MAX_MESSAGE_SIZE,
};
use crate::transport::Address;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

pub use correlation::{Outcome, WaiterKey, Waiters};

/// Default time to wait for each correlated reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a session. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// State shared between callers and the receive task, behind one lock.
#[derive(Debug)]
struct Inner {
    state: SessionState,
    waiters: Waiters,
    known_sets: HashMap<u32, ResourceSet>,
    events: VecDeque<Message>,
}

#[derive(Debug)]
struct Shared {
    inner: Mutex<Inner>,
    shutdown: Notify,
}

impl Shared {
    fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Connecting,
                waiters: Waiters::new(),
                known_sets: HashMap::new(),
                events: VecDeque::new(),
            }),
            shutdown: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the session closed and release every blocked caller.
    fn close_all(&self) {
        let mut inner = self.lock();
        inner.state = SessionState::Closed;
        let released = inner.waiters.fail_all();
        if released > 0 {
            tracing::debug!("Released {} waiters with ConnectionLost", released);
        }
    }
}

/// A registered waiter. Dropping it deregisters the waiter.
struct Ticket {
    shared: Arc<Shared>,
    key: WaiterKey,
    rx: oneshot::Receiver<Outcome>,
}

impl Ticket {
    async fn wait(mut self, timeout: Duration) -> Result<Message> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(Outcome::Reply(message))) => Ok(message),
            Ok(Ok(Outcome::ConnectionLost)) | Ok(Err(_)) => Err(ResmgrError::ConnectionLost),
            Err(_) => {
                // Deregister under the receive loop's lock. If the waiter is
                // already gone, the reply won the race and is in the channel.
                let still_waiting = self.shared.lock().waiters.cancel(&self.key);
                if !still_waiting {
                    if let Ok(Outcome::Reply(message)) = self.rx.try_recv() {
                        return Ok(message);
                    }
                }
                tracing::debug!(seq = self.key.0, kind = %self.key.1, "Request timed out");
                Err(ResmgrError::Timeout)
            }
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.shared.lock().waiters.cancel(&self.key);
    }
}

/// Builder for configuring and creating a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    request_timeout: Duration,
    writer_config: WriterConfig,
    max_message_size: u32,
}

impl SessionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            writer_config: WriterConfig::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set how long each correlated reply is waited for.
    ///
    /// Default: 5 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Set the largest message body the session accepts.
    ///
    /// A larger length header closes the session. Default: 16 MiB
    pub fn max_message_size(mut self, size: u32) -> Self {
        self.max_message_size = size;
        self
    }

    /// Connect to the manager at `address` (e.g. `unxs:@murphy-resource-native`).
    pub async fn connect(self, address: &str) -> Result<Session> {
        let address = Address::parse(address)?;
        let stream = address.connect().await?;
        Ok(self.from_stream(stream))
    }

    /// Start a session over an already connected stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(self, stream: S) -> Session
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (writer, writer_task) = spawn_writer_task(write_half, self.writer_config);

        let shared = Arc::new(Shared::new());
        shared.lock().state = SessionState::Open;
        tracing::debug!("Session open");

        let reader = MessageReader::with_max_message_size(read_half, self.max_message_size);
        let receive_task = tokio::spawn(receive::receive_loop(reader, shared.clone()));

        Session {
            shared,
            writer,
            next_seq: AtomicU32::new(1),
            request_timeout: self.request_timeout,
            receive_task: Mutex::new(Some(receive_task)),
            writer_task,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Status reply of a request, plus the event waiter for two-phase requests.
struct Exchange {
    status: Message,
    event: Option<Ticket>,
}

/// A connection to the manager.
///
/// All operations take `&self`; a session can be shared between tasks
/// behind an `Arc`.
pub struct Session {
    shared: Arc<Shared>,
    writer: WriterHandle,
    next_seq: AtomicU32,
    request_timeout: Duration,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: JoinHandle<Result<()>>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Connect with default settings.
    pub async fn connect(address: &str) -> Result<Self> {
        SessionBuilder::new().connect(address).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// List the resource definitions the manager knows about.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let seq = self.next_seq();
        let request = query_request(seq, RequestKind::QueryResources)?;
        let exchange = self.call(seq, RequestKind::QueryResources, request).await?;
        let (resources, _issues) = build_resources(exchange.status.fields());
        Ok(resources)
    }

    /// Look up a single resource definition by name.
    pub async fn get_resource(&self, name: &str) -> Result<Option<Resource>> {
        let resources = self.list_resources().await?;
        Ok(resources.into_iter().find(|r| r.name == name))
    }

    /// List the application classes defined by the manager.
    pub async fn list_classes(&self) -> Result<Vec<String>> {
        self.list_names(RequestKind::QueryClasses, SemanticTag::ClassName)
            .await
    }

    /// List the zones defined by the manager.
    pub async fn list_zones(&self) -> Result<Vec<String>> {
        self.list_names(RequestKind::QueryZones, SemanticTag::ZoneName)
            .await
    }

    /// Create a resource set from `template` in the given class and zone.
    ///
    /// Returns the id the manager assigned. The created set, as reported by
    /// the manager's event, is stored in the known-sets table.
    pub async fn create_set(&self, template: &ResourceSet, class: &str, zone: &str) -> Result<u32> {
        let seq = self.next_seq();
        let request = create_set_request(seq, template, class, zone)?;
        let exchange = self
            .call(seq, RequestKind::CreateResourceSet, request)
            .await?;
        let event = self.wait_event(exchange.event).await?;

        let id = event
            .set_id()
            .or_else(|| exchange.status.set_id())
            .ok_or_else(|| ResmgrError::Protocol("create reply carries no set id".into()))?;

        let mut set = build_resource_set(&event, Some(template)).set;
        set.id = Some(id);
        self.shared.lock().known_sets.insert(id, set);

        tracing::debug!(id, class, zone, "Created resource set");
        Ok(id)
    }

    /// Destroy a resource set and forget it.
    pub async fn destroy_set(&self, id: u32) -> Result<()> {
        let seq = self.next_seq();
        let request = set_request(seq, RequestKind::DestroyResourceSet, id)?;
        self.call(seq, RequestKind::DestroyResourceSet, request)
            .await?;
        self.shared.lock().known_sets.remove(&id);
        Ok(())
    }

    /// Ask the manager to acquire a set.
    ///
    /// Completes once the manager's event for the request has been merged
    /// into the known set; check [`ResourceSet::acquired`] for the grant.
    pub async fn acquire_set(&self, id: u32) -> Result<()> {
        self.update_set(RequestKind::AcquireResourceSet, id).await
    }

    /// Ask the manager to release a set.
    pub async fn release_set(&self, id: u32) -> Result<()> {
        self.update_set(RequestKind::ReleaseResourceSet, id).await
    }

    /// Snapshot of a known set.
    pub fn get_set(&self, id: u32) -> Result<ResourceSet> {
        self.shared
            .lock()
            .known_sets
            .get(&id)
            .cloned()
            .ok_or(ResmgrError::UnknownSet(id))
    }

    /// Ids of all known sets, in ascending order.
    pub fn known_set_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.shared.lock().known_sets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Merge queued unsolicited events into the known sets.
    ///
    /// Events for sets this session does not know yet stay queued. Returns
    /// how many events were applied.
    pub fn parse_received_events(&self) -> usize {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        let queued = std::mem::take(&mut inner.events);
        let mut applied = 0;

        for event in queued {
            let Some(id) = event.set_id() else {
                tracing::warn!("Dropping resource event without a set id");
                continue;
            };
            match inner.known_sets.get(&id) {
                Some(known) => {
                    let set = build_resource_set(&event, Some(known)).set;
                    inner.known_sets.insert(id, set);
                    applied += 1;
                }
                None => inner.events.push_back(event),
            }
        }

        if applied > 0 {
            tracing::debug!("Applied {} resource events", applied);
        }
        applied
    }

    /// Number of unsolicited events waiting for [`Self::parse_received_events`].
    pub fn pending_events(&self) -> usize {
        self.shared.lock().events.len()
    }

    /// Number of registered waiters.
    pub fn outstanding_requests(&self) -> usize {
        self.shared.lock().waiters.len()
    }

    /// Close the session.
    ///
    /// Stops the receive task and the writer; callers still blocked get
    /// [`ResmgrError::ConnectionLost`]. Closing twice is a no-op.
    pub async fn close(&self) {
        {
            let mut inner = self.shared.lock();
            if inner.state == SessionState::Open {
                inner.state = SessionState::Closing;
            }
        }
        self.shared.shutdown.notify_one();

        let task = self
            .receive_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Receive task failed: {}", e);
            }
        }

        self.writer_task.abort();
        self.shared.close_all();
    }

    fn next_seq(&self) -> u32 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    async fn list_names(&self, kind: RequestKind, tag: SemanticTag) -> Result<Vec<String>> {
        let seq = self.next_seq();
        let request = query_request(seq, kind)?;
        let exchange = self.call(seq, kind, request).await?;
        Ok(collect_strings(&exchange.status, tag))
    }

    async fn update_set(&self, kind: RequestKind, id: u32) -> Result<()> {
        let seq = self.next_seq();
        let request = set_request(seq, kind, id)?;
        let exchange = self.call(seq, kind, request).await?;
        let event = self.wait_event(exchange.event).await?;

        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        let mut set = build_resource_set(&event, inner.known_sets.get(&id)).set;
        set.id.get_or_insert(id);
        tracing::debug!(id, acquired = set.acquired, "{} completed", kind);
        inner.known_sets.insert(id, set);
        Ok(())
    }

    /// Register waiters, send `request` and wait for its status reply.
    ///
    /// A nonzero `RequestStatus` fails with [`ResmgrError::RequestRejected`]
    /// and drops the event waiter.
    async fn call(&self, seq: u32, kind: RequestKind, request: Message) -> Result<Exchange> {
        let bytes = request.encode()?;
        let (status_ticket, event_ticket) = self.register(seq, kind)?;

        tracing::debug!(seq, kind = %kind, "Sending request");
        self.writer.send(bytes).await?;

        let status = status_ticket.wait(self.request_timeout).await?;
        match status.status() {
            Some(0) | None => {}
            Some(code) => {
                tracing::debug!(seq, kind = %kind, code, "Request rejected");
                return Err(ResmgrError::RequestRejected(code));
            }
        }

        Ok(Exchange {
            status,
            event: event_ticket,
        })
    }

    async fn wait_event(&self, ticket: Option<Ticket>) -> Result<Message> {
        let ticket = ticket.ok_or_else(|| ResmgrError::Protocol("no event waiter".into()))?;
        ticket.wait(self.request_timeout).await
    }

    fn register(&self, seq: u32, kind: RequestKind) -> Result<(Ticket, Option<Ticket>)> {
        let mut inner = self.shared.lock();
        if inner.state != SessionState::Open {
            return Err(ResmgrError::SessionClosed);
        }

        let status = self.ticket(&mut inner, (seq, kind));
        let event = kind
            .expects_event()
            .then(|| self.ticket(&mut inner, (seq, RequestKind::ResourcesEvent)));
        Ok((status, event))
    }

    fn ticket(&self, inner: &mut Inner, key: WaiterKey) -> Ticket {
        Ticket {
            shared: self.shared.clone(),
            key,
            rx: inner.waiters.register(key),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shared.shutdown.notify_one();
        self.writer_task.abort();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

/// Every string carried under `tag`, flattening array fields.
fn collect_strings(message: &Message, tag: SemanticTag) -> Vec<String> {
    message
        .fields()
        .iter()
        .filter(|f| f.tag() == tag)
        .flat_map(|f| match f.value().as_array() {
            Some(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect::<Vec<_>>(),
            None => f.value().as_str().map(str::to_string).into_iter().collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Field;

    #[test]
    fn test_builder_defaults() {
        let builder = SessionBuilder::default();
        assert_eq!(builder.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(builder.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert_eq!(builder.writer_config.channel_capacity, 64);
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = Session::builder()
            .request_timeout(Duration::from_millis(250))
            .channel_capacity(8)
            .max_message_size(1024);
        assert_eq!(builder.request_timeout, Duration::from_millis(250));
        assert_eq!(builder.writer_config.channel_capacity, 8);
        assert_eq!(builder.max_message_size, 1024);
    }

    #[test]
    fn test_collect_strings_array_and_scalar() {
        let message = Message::new(vec![
            Field::new(
                SemanticTag::ClassName,
                Value::Array(vec![Value::from("player"), Value::from("game")]),
            )
            .unwrap(),
            Field::new(SemanticTag::ClassName, Value::from("navigator")).unwrap(),
            Field::new(SemanticTag::ZoneName, Value::from("driver")).unwrap(),
        ]);
        assert_eq!(
            collect_strings(&message, SemanticTag::ClassName),
            ["player", "game", "navigator"]
        );
        assert_eq!(collect_strings(&message, SemanticTag::ZoneName), ["driver"]);
    }

    #[tokio::test]
    async fn test_close_is_terminal() {
        let (client, _server) = tokio::io::duplex(1024);
        let session = Session::builder().from_stream(client);
        assert_eq!(session.state(), SessionState::Open);

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(
            session.list_zones().await,
            Err(ResmgrError::SessionClosed)
        ));

        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_unknown_set() {
        let (client, _server) = tokio::io::duplex(1024);
        let session = Session::builder().from_stream(client);
        assert!(matches!(session.get_set(3), Err(ResmgrError::UnknownSet(3))));
        assert!(session.known_set_ids().is_empty());
    }
}
