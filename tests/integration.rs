//! Integration tests for blegui-client.
//!
//! These drive a full session against an in-memory characteristic.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use blegui_client::codec::{encode_value, BufferReader};
use blegui_client::protocol::{
    build_inbound_packet, ClientKind, CustomControlAnnounce, OutboundHeader, PeerKind, ValueUpdate,
};
use blegui_client::session::{Session, SessionEvent, SessionState};
use blegui_client::transport::MemoryCharacteristic;
use blegui_client::value::{ColorChannels, RgbwColor, TaggedValue};
use blegui_client::{GuiError, ValueTree};

const DOC: &str = r#"{"type":"root","name":"Device1","elements":[{"type":"range","name":"Brightness","min":0,"max":255,"value":10}]}"#;

struct Harness {
    session: Session,
    peer: Arc<MemoryCharacteristic>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Harness {
    fn start() -> Self {
        let (peer, notifications) = MemoryCharacteristic::new();
        let (session, events) = Session::builder()
            .retry_delay(Duration::from_millis(1))
            .start("Device1", peer.clone(), notifications);
        Self {
            session,
            peer,
            events,
        }
    }

    /// Answer the first descriptor request with `doc` split at `mtu`.
    async fn synchronize(&mut self, doc: &str, mtu: usize) {
        self.peer.wait_for_writes(1).await;
        let id = OutboundHeader::decode(&self.peer.writes()[0])
            .unwrap()
            .request_id;
        self.peer
            .notify_packet(PeerKind::DescriptorData, id, doc.as_bytes(), mtu);
        self.wait_for(|e| *e == SessionEvent::StateChanged(SessionState::Synchronized))
            .await;
    }

    async fn wait_for(&mut self, matches: impl Fn(&SessionEvent) -> bool) -> SessionEvent {
        loop {
            let event = self.events.recv().await.expect("event stream ended");
            if matches(&event) {
                return event;
            }
        }
    }

    fn push_update(&self, request_id: u32, path: &[&str], value: TaggedValue) {
        let payload = ValueUpdate::new(path.iter().map(|s| s.to_string()).collect(), value)
            .encode_payload()
            .unwrap();
        self.peer
            .notify_packet(PeerKind::ValueUpdate, request_id, &payload, 20);
    }

    fn brightness(&self) -> Option<TaggedValue> {
        self.session.value_at(&["Device1", "Brightness"]).unwrap()
    }

    fn tree(&self) -> ValueTree {
        self.session.with_tree(|tree| tree.clone())
    }
}

/// Decode a SetValue packet into (request id, path, value).
fn decode_set_value(packet: &Bytes) -> (u32, String, TaggedValue) {
    let mut reader = BufferReader::new(packet);
    assert_eq!(reader.read_u8().unwrap(), ClientKind::SetValue as u8);
    let id = reader.read_u32().unwrap();
    let path = reader.read_string().unwrap();
    let value = reader.read_value().unwrap();
    assert_eq!(reader.remaining(), 0);
    (id, path, value)
}

/// A single-notification descriptor builds the tree.
#[tokio::test]
async fn test_single_fragment_descriptor() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    assert_eq!(h.brightness(), Some(TaggedValue::Int32(10)));
    assert_eq!(h.session.state(), SessionState::Synchronized);
    h.session.close().await;
}

/// A descriptor split mid-document yields the same tree.
#[tokio::test]
async fn test_two_fragment_descriptor_matches_single() {
    let mut single = Harness::start();
    single.synchronize(DOC, 512).await;

    let mut split = Harness::start();
    let mtu = (DOC.len() + 9) / 2 + 1;
    split.synchronize(DOC, mtu).await;

    assert_eq!(split.tree(), single.tree());
    single.session.close().await;
    split.session.close().await;
}

/// setValue queues exactly one SetValue packet with the joined path.
#[tokio::test]
async fn test_set_value_packet() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    let id = h
        .session
        .set_value(&["Device1", "Brightness"], TaggedValue::Int32(200))
        .unwrap();
    h.peer.wait_for_writes(2).await;

    let writes = h.peer.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(
        decode_set_value(&writes[1]),
        (id, "Device1,Brightness".to_string(), TaggedValue::Int32(200))
    );
    h.session.close().await;
}

/// An echo of our own write does not touch the tree; a foreign update does.
#[tokio::test]
async fn test_echo_and_foreign_updates() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    let id = h
        .session
        .set_value(&["Brightness"], TaggedValue::Int32(200))
        .unwrap();
    h.push_update(id, &["Brightness"], TaggedValue::Int32(200));
    h.wait_for(|e| matches!(e, SessionEvent::EchoAcknowledged { .. }))
        .await;
    assert_eq!(h.brightness(), Some(TaggedValue::Int32(10)));

    h.push_update(id.wrapping_add(1000), &["Brightness"], TaggedValue::Int32(77));
    let applied = h
        .wait_for(|e| matches!(e, SessionEvent::RemoteValueApplied { .. }))
        .await;
    assert_eq!(
        applied,
        SessionEvent::RemoteValueApplied {
            path: vec!["Device1".into(), "Brightness".into()],
            value: TaggedValue::Int32(77),
        }
    );
    assert_eq!(h.brightness(), Some(TaggedValue::Int32(77)));
    h.session.close().await;
}

/// A bad remote update is reported and leaves the tree as it was.
#[tokio::test]
async fn test_failed_remote_update_is_an_event() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;
    let before = h.tree();

    h.push_update(5, &["Nope"], TaggedValue::Int32(1));
    let failed = h
        .wait_for(|e| matches!(e, SessionEvent::UpdateFailed { .. }))
        .await;
    assert!(matches!(failed, SessionEvent::UpdateFailed { path, .. } if path == ["Nope"]));

    assert_eq!(h.tree(), before);
    assert_eq!(h.session.state(), SessionState::Synchronized);
    h.session.close().await;
}

/// Rapid edits of one control while a write is in flight collapse into one.
#[tokio::test]
async fn test_rapid_local_edits_coalesce() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;
    h.peer.hold_writes();

    h.session
        .edit(&["Device1", "Brightness"], TaggedValue::Int32(1))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    for v in 2..=50 {
        h.session
            .edit(&["Device1", "Brightness"], TaggedValue::Int32(v))
            .unwrap();
    }
    assert_eq!(h.session.pending_writes(), 1);

    h.peer.release_writes();
    h.peer.wait_for_writes(3).await;
    while h.session.pending_writes() > 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let writes = h.peer.writes();
    assert_eq!(writes.len(), 3);
    let values: Vec<(String, TaggedValue)> = writes[1..]
        .iter()
        .map(|p| {
            let (_, path, value) = decode_set_value(p);
            (path, value)
        })
        .collect();
    assert_eq!(
        values,
        vec![
            ("Brightness".to_string(), TaggedValue::Int32(1)),
            ("Brightness".to_string(), TaggedValue::Int32(50)),
        ]
    );
    assert_eq!(h.brightness(), Some(TaggedValue::Int32(50)));
    h.session.close().await;
}

/// Edits coalesced away before sending leave no request pending.
#[tokio::test]
async fn test_coalesced_edits_release_request_ids() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;
    h.peer.hold_writes();

    h.session
        .edit(&["Device1", "Brightness"], TaggedValue::Int32(0))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    for v in 1..=200 {
        h.session
            .edit(&["Device1", "Brightness"], TaggedValue::Int32(v))
            .unwrap();
    }
    // The write in flight and its single queued successor
    assert_eq!(h.session.pending_requests(), 2);

    h.peer.release_writes();
    h.peer.wait_for_writes(3).await;

    let ids: Vec<u32> = h.peer.writes()[1..]
        .iter()
        .map(|p| decode_set_value(p).0)
        .collect();
    for &id in &ids {
        h.push_update(id, &["Brightness"], TaggedValue::Int32(200));
        h.wait_for(|e| matches!(e, SessionEvent::EchoAcknowledged { request_id, .. } if *request_id == id))
            .await;
    }
    assert_eq!(h.session.pending_requests(), 0);
    h.session.close().await;
}

/// A permanently failing characteristic stops retrying at the bound.
#[tokio::test]
async fn test_write_retry_bound() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;
    h.peer.fail_all_writes(true);

    h.session
        .set_value(&["Brightness"], TaggedValue::Int32(3))
        .unwrap();
    let aborted = h
        .wait_for(|e| matches!(e, SessionEvent::WriteAborted { .. }))
        .await;

    assert!(matches!(
        aborted,
        SessionEvent::WriteAborted { ref group_key, failures: 10, .. } if group_key == "Brightness"
    ));
    // One successful descriptor request plus ten failed attempts
    assert_eq!(h.peer.write_attempts(), 11);
    assert_eq!(h.session.pending_writes(), 0);
    h.session.close().await;
}

/// Editing a path that does not exist fails and changes nothing.
#[tokio::test]
async fn test_missing_path_leaves_tree_unchanged() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;
    let before = h.tree();

    let result = h
        .session
        .edit(&["Device1", "missing"], TaggedValue::Int32(1));
    assert!(matches!(result, Err(GuiError::PathNotFound(_))));

    let result = h
        .session
        .edit(&["Device1", "Brightness"], TaggedValue::Int32(999));
    assert!(matches!(result, Err(GuiError::InvalidValue(_))));

    assert_eq!(h.tree(), before);
    assert_eq!(h.peer.writes().len(), 1);
    h.session.close().await;
}

/// A later descriptor for the same names replaces the earlier controls.
#[tokio::test]
async fn test_replacement_descriptor() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    let id = h.session.request_descriptor().unwrap();
    let doc = r#"{"type":"root","name":"Device1","elements":[
        {"type":"checkbox","name":"Brightness","value":true}]}"#;
    h.peer
        .notify_packet(PeerKind::DescriptorData, id, doc.as_bytes(), 20);
    h.wait_for(|e| matches!(e, SessionEvent::DescriptorApplied { request_id, .. } if *request_id == id))
        .await;

    assert_eq!(h.brightness(), Some(TaggedValue::Boolean(true)));
    assert_eq!(h.tree().len(), 2);
    h.session.close().await;
}

/// Custom controls from the legacy channel report colors as events.
#[tokio::test]
async fn test_legacy_custom_control() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    let announce = CustomControlAnnounce {
        uuid: "0000ff01".into(),
        name: "Accent".into(),
        channels: ColorChannels::from_flags("RGB"),
    };
    h.session.handle_legacy_command(&announce.encode()).unwrap();

    let color = RgbwColor::new(255, 128, 0, 0);
    h.session
        .edit(&["Device1", "Accent"], TaggedValue::Rgbw(color))
        .unwrap();

    let event = h
        .wait_for(|e| matches!(e, SessionEvent::CustomColorChanged { .. }))
        .await;
    assert_eq!(
        event,
        SessionEvent::CustomColorChanged {
            uuid: "0000ff01".into(),
            color
        }
    );
    assert_eq!(h.peer.writes().len(), 1);
    h.session.close().await;
}

/// Garbage between packets is reported and the session keeps working.
#[tokio::test]
async fn test_protocol_errors_do_not_end_session() {
    let mut h = Harness::start();
    h.synchronize(DOC, 512).await;

    h.peer.notify(Bytes::from_static(&[0x07, 0, 0]));
    h.wait_for(|e| matches!(e, SessionEvent::ProtocolError(_)))
        .await;

    let mut bad = build_inbound_packet(PeerKind::ValueUpdate, 1, b"");
    bad[0] = 0x09;
    h.peer.notify(bad);
    h.wait_for(|e| matches!(e, SessionEvent::ProtocolError(_)))
        .await;

    h.push_update(9, &["Brightness"], TaggedValue::Int32(12));
    h.wait_for(|e| matches!(e, SessionEvent::RemoteValueApplied { .. }))
        .await;
    assert_eq!(h.brightness(), Some(TaggedValue::Int32(12)));
    h.session.close().await;
}

/// Every value shape survives the codec, boundaries included.
#[test]
fn test_tagged_value_boundaries() {
    let values = [
        TaggedValue::Int32(i32::MIN),
        TaggedValue::Int32(i32::MAX),
        TaggedValue::Float32(-0.5),
        TaggedValue::Boolean(false),
        TaggedValue::String(String::new()),
        TaggedValue::Rgbw(RgbwColor::new(0, 0, 0, 0)),
        TaggedValue::Rgbw(RgbwColor::new(255, 255, 255, 255)),
    ];

    for value in values {
        let bytes = encode_value(&value).unwrap();
        let mut reader = BufferReader::new(&bytes);
        assert_eq!(reader.read_value().unwrap(), value);
        assert_eq!(reader.remaining(), 0);
    }

    assert!(TaggedValue::from_number(f64::NAN).is_err());
    assert!(TaggedValue::from_number(f64::INFINITY).is_err());
    assert!(encode_value(&TaggedValue::Float32(f32::INFINITY)).is_err());
}
