//! Panel - a session against a simulated lamp.
//!
//! This example demonstrates:
//! - Starting a session with the builder pattern
//! - Answering the descriptor request from a simulated peer
//! - Local edits, echoes and peer-initiated updates
//! - The diagnostic event stream
//!
//! # Running
//!
//! ```text
//! RUST_LOG=blegui_client=debug cargo run --example panel
//! ```

use std::sync::Arc;
use std::time::Duration;

use blegui_client::codec::BufferReader;
use blegui_client::protocol::{ClientKind, CustomControlAnnounce, OutboundHeader, PeerKind, ValueUpdate};
use blegui_client::transport::MemoryCharacteristic;
use blegui_client::value::{ColorChannels, RgbwColor};
use blegui_client::{Session, SessionEvent, SessionState, TaggedValue};
use tracing_subscriber::EnvFilter;

const DESCRIPTOR: &str = r#"{
    "type": "root", "name": "Lamp", "elements": [
        {"type": "group", "name": "Light", "collapsed": false, "elements": [
            {"type": "checkbox", "name": "On", "value": 1},
            {"type": "range", "name": "Brightness", "min": 0, "max": 255, "value": 10},
            {"type": "rgbwrange", "name": "Color", "value": 4294901760, "channel": "RGBW"}
        ]},
        {"type": "dropdown", "name": "Mode", "items": ["Static", "Breathe", "Rainbow"], "value": 0},
        {"type": "numberfield_int32", "name": "Uptime", "value": 0, "readOnly": true, "advanced": true},
        {"type": "textfield", "name": "Label", "value": "desk", "maxLength": 12},
        {"type": "compass", "name": "Heading", "value": 90}
    ]
}"#;

/// Peer side: answers descriptor requests and echoes every SetValue.
async fn simulated_peer(peer: Arc<MemoryCharacteristic>) {
    let mut seen = 0;
    loop {
        peer.wait_for_writes(seen + 1).await;
        let writes = peer.writes();

        for packet in &writes[seen..] {
            let mut reader = BufferReader::new(packet);
            let header = match OutboundHeader::decode(packet) {
                Ok(header) => header,
                Err(e) => {
                    tracing::warn!("peer: bad packet: {}", e);
                    continue;
                }
            };

            match header.kind {
                ClientKind::RequestDescriptor => {
                    peer.notify_packet(
                        PeerKind::DescriptorData,
                        header.request_id,
                        DESCRIPTOR.as_bytes(),
                        20,
                    );
                }
                ClientKind::SetValue => {
                    let decoded = reader
                        .read_bytes(5)
                        .and_then(|_| reader.read_string())
                        .and_then(|path| Ok((path, reader.read_value()?)));
                    let Ok((path, value)) = decoded else {
                        continue;
                    };
                    println!("peer <- {} = {}", path, value);

                    let echo = ValueUpdate::new(path.split(',').map(str::to_string).collect(), value);
                    if let Ok(payload) = echo.encode_payload() {
                        peer.notify_packet(PeerKind::ValueUpdate, header.request_id, &payload, 20);
                    }
                }
            }
        }
        seen = writes.len();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (peer, notifications) = MemoryCharacteristic::new();
    tokio::spawn(simulated_peer(peer.clone()));

    let (session, mut events) = Session::builder()
        .descriptor_timeout(Duration::from_secs(1))
        .request_timeout(Duration::from_secs(5))
        .start("Lamp", peer.clone(), notifications);

    while let Some(event) = events.recv().await {
        println!("event: {:?}", event);
        if event == SessionEvent::StateChanged(SessionState::Synchronized) {
            break;
        }
    }

    println!("\n{}", session.with_tree(|tree| tree.to_string()));

    // Local edits; the slider drag collapses into few writes
    for v in (10..=200).step_by(10) {
        session.edit(&["Lamp", "Light", "Brightness"], TaggedValue::Int32(v))?;
    }
    session.edit(&["Lamp", "Mode"], TaggedValue::Int32(2))?;
    session.edit(&["Lamp", "Label"], "a label longer than twelve".into())?;

    // Peer-initiated change
    let push = ValueUpdate::new(
        vec!["Light".into(), "Color".into()],
        TaggedValue::Rgbw(RgbwColor::new(0, 64, 255, 0)),
    );
    peer.notify_packet(PeerKind::ValueUpdate, 1, &push.encode_payload()?, 20);

    // Legacy announcement of an extra color control
    let announce = CustomControlAnnounce {
        uuid: "0000ff01-0000-1000-8000-00805f9b34fb".into(),
        name: "Accent".into(),
        channels: ColorChannels::from_flags("RGB"),
    };
    session.handle_legacy_command(&announce.encode())?;
    session.edit(&["Lamp", "Accent"], RgbwColor::new(255, 0, 128, 0).into())?;

    let settle = tokio::time::sleep(Duration::from_millis(200));
    tokio::pin!(settle);
    loop {
        tokio::select! {
            _ = &mut settle => break,
            Some(event) = events.recv() => println!("event: {:?}", event),
        }
    }

    let hidden = session.with_tree(|tree| {
        tree.resolve(&["Lamp", "Uptime"])
            .map(|id| tree.is_hidden(id, false))
            .unwrap_or(false)
    });
    println!("\nUptime hidden without advanced controls: {}", hidden);
    println!("\n{}", session.with_tree(|tree| tree.to_string()));

    session.close().await;
    Ok(())
}
