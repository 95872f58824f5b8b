//! # blegui-client
//!
//! Client side of the BLE GUI protocol: a peer describes its control panel
//! as a JSON descriptor, the client mirrors it as a value tree and keeps
//! both sides synchronized over a single notifying GATT characteristic.
//!
//! ## Architecture
//!
//! - **Codec / protocol**: big-endian packet headers, tagged values,
//!   fragment reassembly, request correlation
//! - **Writer**: one write in flight, coalescing per path, bounded retry
//! - **Tree**: arena of groups and controls addressed by path
//! - **Session**: subscription, descriptor negotiation, dispatch
//!
//! ## Example
//!
//! ```
//! use blegui_client::protocol::{OutboundHeader, PeerKind};
//! use blegui_client::session::{Session, SessionEvent, SessionState};
//! use blegui_client::transport::MemoryCharacteristic;
//! use blegui_client::value::TaggedValue;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (peer, notifications) = MemoryCharacteristic::new();
//! let (session, mut events) = Session::builder().start("Device1", peer.clone(), notifications);
//!
//! // Answer the descriptor request like a peer would
//! peer.wait_for_writes(1).await;
//! let request = OutboundHeader::decode(&peer.writes()[0]).unwrap();
//! let doc = br#"{"type":"root","name":"Device1","elements":[
//!     {"type":"range","name":"Brightness","min":0,"max":255,"value":10}]}"#;
//! peer.notify_packet(PeerKind::DescriptorData, request.request_id, doc, 20);
//!
//! while events.recv().await != Some(SessionEvent::StateChanged(SessionState::Synchronized)) {}
//! assert_eq!(
//!     session.value_at(&["Device1", "Brightness"]).unwrap(),
//!     Some(TaggedValue::Int32(10))
//! );
//!
//! session.edit(&["Device1", "Brightness"], TaggedValue::Int32(200)).unwrap();
//! session.close().await;
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod tree;
pub mod value;
pub mod writer;

pub use error::{GuiError, Result};
pub use session::{Session, SessionBuilder, SessionEvent, SessionState};
pub use tree::{ChangeSink, Control, NodeId, ValueTree};
pub use value::{RgbwColor, TaggedValue};
