//! Protocol module - wire format, reassembly and request correlation.
//!
//! This module implements the binary GUI protocol:
//! - 5-byte outbound and 9-byte inbound headers
//! - Segment reassembler for payloads spanning several notifications
//! - Request id generation and pending-request tracking
//! - Descriptor document model and ValueUpdate payloads
//! - Legacy custom-control announcements

mod descriptor;
mod legacy;
mod packet;
mod reassembler;
mod requests;
mod wire_format;

pub use descriptor::{DescriptorKind, DescriptorNode};
pub use legacy::{CustomControlAnnounce, LegacyCommand, CUSTOM_CONTROL_ANNOUNCE};
pub use packet::{build_inbound_packet, fragment, InboundPacket, ValueUpdate};
pub use reassembler::SegmentReassembler;
pub use requests::{PendingRequest, RequestTracker};
pub use wire_format::{
    ClientKind, InboundHeader, OutboundHeader, PeerKind, DEFAULT_MAX_PAYLOAD,
    INBOUND_HEADER_SIZE, OUTBOUND_HEADER_SIZE,
};
