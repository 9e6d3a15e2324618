//! Session tests against a simulated manager over an in-memory stream.

use std::time::Duration;

use resmgr_client::codec::{Field, Value};
use resmgr_client::protocol::{frame, Message, MessageReader, RequestKind, SemanticTag};
use resmgr_client::{ResmgrError, ResourceSet, Session, SessionState};
use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

/// Manager side of the connection.
struct Manager {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
}

impl Manager {
    async fn recv(&mut self) -> Message {
        self.reader.read_one_message().await.unwrap()
    }

    async fn send(&mut self, fields: Vec<Field>) {
        self.send_raw(&frame(&fields).unwrap()).await;
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    /// Reply to `request` with a status and extra fields.
    async fn reply(&mut self, request: &Message, status: i16, extra: Vec<Field>) {
        let mut fields = header(request.seq_num().unwrap(), request.req_type().unwrap());
        fields.push(field(SemanticTag::RequestStatus, Value::Int16(status)));
        fields.extend(extra);
        self.send(fields).await;
    }
}

fn field(tag: SemanticTag, value: impl Into<Value>) -> Field {
    Field::new(tag, value.into()).unwrap()
}

fn header(seq: u32, kind: RequestKind) -> Vec<Field> {
    vec![
        field(SemanticTag::SequenceNo, seq),
        field(SemanticTag::RequestType, Value::UInt16(kind.wire_value())),
    ]
}

/// A resource event for set 7 holding `audio_playback` (id 0).
fn set_event(seq: u32, grant: u32, advice: u32, with_resource: bool) -> Vec<Field> {
    let mut fields = header(seq, RequestKind::ResourcesEvent);
    fields.extend([
        field(SemanticTag::ResourceSetId, 7u32),
        field(SemanticTag::ResourceState, Value::UInt16(u16::from(grant != 0))),
        field(SemanticTag::ResourceGrant, grant),
        field(SemanticTag::ResourceAdvice, advice),
    ]);
    if with_resource {
        fields.extend([
            field(SemanticTag::ResourceId, 0u32),
            field(SemanticTag::ResourceName, "audio_playback"),
            field(SemanticTag::ResourceFlags, 3u32),
            field(SemanticTag::SectionEnd, Value::UInt8(0)),
        ]);
    }
    fields
}

fn connect_with(builder: resmgr_client::SessionBuilder) -> (Session, Manager) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let session = builder.from_stream(client);
    let (read_half, writer) = tokio::io::split(server);
    let manager = Manager {
        reader: MessageReader::new(read_half),
        writer,
    };
    (session, manager)
}

fn connect() -> (Session, Manager) {
    connect_with(Session::builder())
}

async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// Run the create handshake for set 7 on the manager side.
async fn serve_create(manager: &mut Manager) -> Message {
    let request = manager.recv().await;
    manager
        .reply(&request, 0, vec![field(SemanticTag::ResourceSetId, 7u32)])
        .await;
    manager
        .send(set_event(request.seq_num().unwrap(), 0, 0b1, true))
        .await;
    request
}

async fn create_playback_set(session: &Session, manager: &mut Manager) {
    let template = ResourceSet::from_names(["audio_playback"]);
    let (id, _) = tokio::join!(
        session.create_set(&template, "player", "driver"),
        serve_create(manager)
    );
    assert_eq!(id.unwrap(), 7);
}

#[tokio::test]
async fn test_create_set_end_to_end() {
    let (session, mut manager) = connect();
    let template = ResourceSet::from_names(["audio_playback"]);

    let (id, request) = tokio::join!(
        session.create_set(&template, "player", "driver"),
        serve_create(&mut manager)
    );
    assert_eq!(id.unwrap(), 7);

    assert_eq!(request.req_type(), Some(RequestKind::CreateResourceSet));
    assert_eq!(request.len(), 9);
    let class = request.field(SemanticTag::ClassName).unwrap();
    assert_eq!(class.value().as_str(), Some("player"));
    let zone = request.field(SemanticTag::ZoneName).unwrap();
    assert_eq!(zone.value().as_str(), Some("driver"));

    assert_eq!(session.known_set_ids(), [7]);
    let set = session.get_set(7).unwrap();
    assert_eq!(set.id, Some(7));
    assert!(!set.acquired);
    assert_eq!(set.resources.len(), 1);
    let playback = set.resource("audio_playback").unwrap();
    assert_eq!(playback.id, Some(0));
    assert!(playback.available && !playback.acquired);

    assert_eq!(session.outstanding_requests(), 0);
}

#[tokio::test]
async fn test_acquire_then_unsolicited_loss() {
    let (session, mut manager) = connect();
    create_playback_set(&session, &mut manager).await;

    let serve_acquire = async {
        let request = manager.recv().await;
        assert_eq!(request.set_id(), Some(7));
        manager.reply(&request, 0, vec![]).await;
        manager
            .send(set_event(request.seq_num().unwrap(), 0b1, 0b1, true))
            .await;
    };
    let (acquired, _) = tokio::join!(session.acquire_set(7), serve_acquire);
    acquired.unwrap();

    let state = session.get_set(7).unwrap().state();
    assert!(state.acquired);
    assert_eq!(state.resources.get("audio_playback"), Some(&true));

    // Another client takes the resource; the event names no resources.
    manager.send(set_event(0, 0, 0, false)).await;
    // An event for a set this session never created.
    let mut foreign = header(0, RequestKind::ResourcesEvent);
    foreign.push(field(SemanticTag::ResourceSetId, 99u32));
    manager.send(foreign).await;

    eventually(|| session.pending_events() == 2).await;
    assert_eq!(session.parse_received_events(), 1);
    assert_eq!(session.pending_events(), 1);

    let set = session.get_set(7).unwrap();
    assert!(!set.acquired);
    let playback = set.resource("audio_playback").unwrap();
    assert!(!playback.acquired && !playback.available);
}

#[tokio::test]
async fn test_timeout_cleans_up_waiter() {
    let (session, mut manager) = connect_with(
        Session::builder().request_timeout(Duration::from_millis(50)),
    );

    let (result, request) = tokio::join!(session.list_zones(), manager.recv());
    assert!(matches!(result, Err(ResmgrError::Timeout)));
    assert_eq!(session.outstanding_requests(), 0);

    // The late reply is dropped, not queued as an event.
    manager.reply(&request, 0, vec![]).await;

    let serve = async {
        let request = manager.recv().await;
        manager
            .reply(&request, 0, vec![field(SemanticTag::ZoneName, "driver")])
            .await;
    };
    let (zones, _) = tokio::join!(session.list_zones(), serve);
    assert_eq!(zones.unwrap(), ["driver"]);
    assert_eq!(session.pending_events(), 0);
}

#[tokio::test]
async fn test_acquire_without_reply_times_out() {
    let (session, mut manager) = connect_with(
        Session::builder().request_timeout(Duration::from_millis(50)),
    );

    let (result, request) = tokio::join!(session.acquire_set(7), manager.recv());
    assert_eq!(request.req_type(), Some(RequestKind::AcquireResourceSet));
    assert!(matches!(result, Err(ResmgrError::Timeout)));

    // Both the status and the event waiter are gone.
    assert_eq!(session.outstanding_requests(), 0);
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test]
async fn test_acquire_event_phase_times_out() {
    let (session, mut manager) = connect_with(
        Session::builder().request_timeout(Duration::from_millis(50)),
    );

    let serve = async {
        let request = manager.recv().await;
        manager.reply(&request, 0, vec![]).await;
        request
    };
    let (result, request) = tokio::join!(session.acquire_set(7), serve);
    assert!(matches!(result, Err(ResmgrError::Timeout)));
    assert_eq!(session.outstanding_requests(), 0);
    assert_eq!(session.state(), SessionState::Open);

    // The late event no longer has a waiter and lands in the event queue.
    manager
        .send(set_event(request.seq_num().unwrap(), 0b1, 0b1, true))
        .await;
    eventually(|| session.pending_events() == 1).await;
    assert!(session.known_set_ids().is_empty());
}

#[tokio::test]
async fn test_undecodable_messages_are_skipped() {
    let (session, mut manager) = connect();

    let serve = async {
        let request = manager.recv().await;
        // A string field cut off before its length.
        manager
            .send_raw(&[0, 0, 0, 8, 0, 0, 0, 1, 0x00, 0x0f, 0x00, 0x01])
            .await;
        // An envelope with an unknown message tag.
        manager.send_raw(&[0, 0, 0, 4, 0x12, 0x34, 0, 0]).await;
        manager
            .reply(&request, 0, vec![field(SemanticTag::ZoneName, "driver")])
            .await;
    };
    let (zones, _) = tokio::join!(session.list_zones(), serve);

    assert_eq!(zones.unwrap(), ["driver"]);
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.outstanding_requests(), 0);
    assert_eq!(session.pending_events(), 0);
}

#[tokio::test]
async fn test_rejected_request() {
    let (session, mut manager) = connect();

    let serve = async {
        let request = manager.recv().await;
        manager.reply(&request, -1, vec![]).await;
    };
    let (result, _) = tokio::join!(session.acquire_set(3), serve);
    assert!(matches!(result, Err(ResmgrError::RequestRejected(-1))));
    assert_eq!(session.outstanding_requests(), 0);
    assert!(session.known_set_ids().is_empty());
}

#[tokio::test]
async fn test_connection_lost_releases_callers() {
    let (session, mut manager) = connect();

    let serve = async move {
        manager.recv().await;
        manager.recv().await;
        drop(manager);
    };
    let (classes, zones, _) = tokio::join!(session.list_classes(), session.list_zones(), serve);
    assert!(matches!(classes, Err(ResmgrError::ConnectionLost)));
    assert!(matches!(zones, Err(ResmgrError::ConnectionLost)));

    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(
        session.list_resources().await,
        Err(ResmgrError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_oversized_message_closes_session() {
    let (session, mut manager) = connect_with(Session::builder().max_message_size(64));

    let serve = async {
        manager.recv().await;
        manager.send_raw(&[0x00, 0x01, 0x00, 0x00]).await;
    };
    let (result, _) = tokio::join!(session.list_zones(), serve);
    assert!(matches!(result, Err(ResmgrError::ConnectionLost)));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_concurrent_requests_matched_by_sequence() {
    let (session, mut manager) = connect();

    let serve = async {
        let first = manager.recv().await;
        let second = manager.recv().await;
        // Answer in reverse order.
        for request in [&second, &first] {
            let zone = format!("zone_{}", request.seq_num().unwrap());
            manager
                .reply(request, 0, vec![field(SemanticTag::ZoneName, zone)])
                .await;
        }
    };
    let (a, b, _) = tokio::join!(session.list_zones(), session.list_zones(), serve);
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_list_queries() {
    let (session, mut manager) = connect();

    let serve = async {
        let request = manager.recv().await;
        assert_eq!(request.req_type(), Some(RequestKind::QueryClasses));
        let classes = Value::Array(vec![Value::from("player"), Value::from("navigator")]);
        manager
            .reply(&request, 0, vec![field(SemanticTag::ClassName, classes)])
            .await;

        let request = manager.recv().await;
        assert_eq!(request.req_type(), Some(RequestKind::QueryResources));
        let mut listing = Vec::new();
        for name in ["audio_playback", "audio_recording"] {
            listing.extend([
                field(SemanticTag::ResourceName, name),
                field(SemanticTag::AttributeName, "role"),
                field(SemanticTag::AttributeValue, "music"),
                field(SemanticTag::SectionEnd, Value::UInt8(0)),
            ]);
        }
        manager.reply(&request, 0, listing).await;
    };
    let lists = async {
        let classes = session.list_classes().await.unwrap();
        let resources = session.list_resources().await.unwrap();
        (classes, resources)
    };
    let ((classes, resources), _) = tokio::join!(lists, serve);

    assert_eq!(classes, ["player", "navigator"]);
    assert_eq!(resources.len(), 2);
    assert!(resources
        .iter()
        .all(|r| r.attribute("role").is_some() && !r.is_resolved()));
}

#[tokio::test]
async fn test_destroy_forgets_set() {
    let (session, mut manager) = connect();
    create_playback_set(&session, &mut manager).await;

    let serve = async {
        let request = manager.recv().await;
        assert_eq!(request.req_type(), Some(RequestKind::DestroyResourceSet));
        manager.reply(&request, 0, vec![]).await;
    };
    let (result, _) = tokio::join!(session.destroy_set(7), serve);
    result.unwrap();

    assert!(matches!(session.get_set(7), Err(ResmgrError::UnknownSet(7))));
}

#[tokio::test]
async fn test_close_releases_blocked_caller() {
    let (session, mut manager) = connect();

    let (result, _) = tokio::join!(session.list_zones(), async {
        manager.recv().await;
        session.close().await;
    });
    assert!(matches!(result, Err(ResmgrError::ConnectionLost)));
    assert_eq!(session.state(), SessionState::Closed);
}
