//! Session state and packet dispatch.
//!
//! Everything here is synchronous; the runtime in `mod.rs` feeds it
//! notifications and timer ticks under the session lock.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::event::{SessionEvent, SessionState};
use crate::codec::{encode_request_descriptor, encode_set_value, path_key};
use crate::error::{GuiError, Result};
use crate::protocol::{
    ClientKind, InboundHeader, InboundPacket, LegacyCommand, OutboundHeader, PeerKind, RequestTracker,
    SegmentReassembler, ValueUpdate,
};
use crate::tree::{ChangeSink, NodeId, ValueTree};
use crate::value::{RgbwColor, TaggedValue};
use crate::writer::WriterHandle;

/// Writer group key shared by all descriptor requests.
pub(super) const DESCRIPTOR_GROUP_KEY: &str = "request-descriptor";

/// Packet under reassembly.
#[derive(Debug)]
struct Assembly {
    header: InboundHeader,
    reassembler: SegmentReassembler,
}

pub(super) struct SessionCore {
    pub(super) state: SessionState,
    pub(super) tree: ValueTree,
    pub(super) tracker: RequestTracker,
    assembly: Option<Assembly>,
    writer: WriterHandle,
    events: mpsc::UnboundedSender<SessionEvent>,
    max_payload: u32,
}

impl SessionCore {
    pub(super) fn new(
        identity: &str,
        writer: WriterHandle,
        events: mpsc::UnboundedSender<SessionEvent>,
        max_payload: u32,
    ) -> Self {
        Self {
            state: SessionState::Idle,
            tree: ValueTree::new(identity),
            tracker: RequestTracker::new(),
            assembly: None,
            writer,
            events,
            max_payload,
        }
    }

    pub(super) fn emit(&self, event: SessionEvent) {
        // The receiver may have been dropped; events are advisory
        let _ = self.events.send(event);
    }

    pub(super) fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!("session state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    #[inline]
    pub(super) fn is_receiving_fragment(&self) -> bool {
        self.assembly.is_some()
    }

    /// Issue a RequestDescriptor packet.
    pub(super) fn request_descriptor(&mut self) -> Result<u32> {
        let id = self.tracker.issue(ClientKind::RequestDescriptor);
        match self
            .writer
            .send(DESCRIPTOR_GROUP_KEY, encode_request_descriptor(id))
        {
            Ok(replaced) => release_unsent(&mut self.tracker, replaced),
            Err(e) => {
                self.tracker.resolve(id);
                return Err(e);
            }
        }
        tracing::debug!("requested descriptor (request {})", id);
        Ok(id)
    }

    /// Issue a SetValue packet for `path`, encoded exactly as given.
    pub(super) fn set_value<S: AsRef<str>>(&mut self, path: &[S], value: &TaggedValue) -> Result<u32> {
        queue_set_value(&mut self.tracker, &self.writer, path, value)
    }

    /// Apply a user edit to `id` and transmit it.
    pub(super) fn local_change(&mut self, id: NodeId, value: &TaggedValue) -> Result<()> {
        let mut outbox = Outbox {
            tracker: &mut self.tracker,
            writer: &self.writer,
            events: &self.events,
        };
        self.tree.on_local_change(id, value, &mut outbox)
    }

    /// Feed one notification.
    ///
    /// With no packet under reassembly the notification starts a new one;
    /// otherwise it is the next fragment of the current packet. Errors are
    /// reported and drop the packet under reassembly.
    pub(super) fn handle_notification(&mut self, bytes: &[u8]) {
        let result = match self.assembly.take() {
            Some(mut assembly) => match assembly.reassembler.append(bytes) {
                Ok(Some(payload)) => Ok(Some((assembly.header, payload))),
                Ok(None) => {
                    self.assembly = Some(assembly);
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            None => self.start_assembly(bytes),
        };

        match result {
            Ok(Some((header, payload))) => self.complete(InboundPacket::new(header, payload)),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("dropping notification: {}", e);
                self.emit(SessionEvent::ProtocolError(e.to_string()));
            }
        }
    }

    fn start_assembly(&mut self, bytes: &[u8]) -> Result<Option<(InboundHeader, Bytes)>> {
        let (header, chunk) = InboundHeader::decode(bytes)?;
        header.validate(self.max_payload)?;

        let mut reassembler = SegmentReassembler::new(header.declared_length as usize);
        match reassembler.append(chunk)? {
            Some(payload) => Ok(Some((header, payload))),
            None => {
                tracing::trace!(
                    "packet {} spans notifications ({} of {} bytes)",
                    header.request_id,
                    reassembler.offset(),
                    reassembler.expected()
                );
                self.assembly = Some(Assembly {
                    header,
                    reassembler,
                });
                Ok(None)
            }
        }
    }

    fn complete(&mut self, packet: InboundPacket) {
        match packet.kind() {
            PeerKind::DescriptorData => self.on_descriptor(&packet),
            PeerKind::ValueUpdate => self.on_value_update(&packet),
        }
    }

    fn on_descriptor(&mut self, packet: &InboundPacket) {
        let request_id = packet.request_id();
        if self.tracker.resolve(request_id).is_none() {
            tracing::debug!("discarding descriptor for foreign request {}", request_id);
            self.emit(SessionEvent::Discarded {
                kind: PeerKind::DescriptorData,
                request_id,
            });
            return;
        }

        let root = self.tree.root();
        let applied = packet
            .decode_descriptor()
            .and_then(|descriptor| self.tree.build_from_descriptor(root, &descriptor));

        match applied {
            Ok(_) => {
                let nodes = self.tree.len() - 1;
                tracing::debug!("descriptor {} applied, {} nodes", request_id, nodes);
                self.emit(SessionEvent::DescriptorApplied { request_id, nodes });
                self.set_state(SessionState::Synchronized);
            }
            Err(e) => {
                tracing::warn!("descriptor {} rejected: {}", request_id, e);
                self.emit(SessionEvent::ProtocolError(format!(
                    "descriptor {request_id}: {e}"
                )));
            }
        }
    }

    fn on_value_update(&mut self, packet: &InboundPacket) {
        let request_id = packet.request_id();
        let update = match packet.decode_value_update() {
            Ok(update) => update,
            Err(e) => {
                self.tracker.resolve(request_id);
                tracing::warn!("malformed value update {}: {}", request_id, e);
                self.emit(SessionEvent::ProtocolError(format!(
                    "value update {request_id}: {e}"
                )));
                return;
            }
        };

        if self.tracker.resolve(request_id).is_some() {
            tracing::trace!("echo of request {}", request_id);
            self.emit(SessionEvent::EchoAcknowledged {
                request_id,
                path: update.path,
            });
            return;
        }

        match self.apply_remote(&update) {
            Ok(path) => {
                tracing::debug!("remote value {} = {}", path.join(","), update.value);
                self.emit(SessionEvent::RemoteValueApplied {
                    path,
                    value: update.value,
                });
            }
            Err(e) => {
                tracing::warn!("remote update '{}' failed: {}", update.path.join(","), e);
                self.emit(SessionEvent::UpdateFailed {
                    path: update.path,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Apply an update addressed relative to the root.
    ///
    /// A path that does not resolve relative to the root but starts with the
    /// root name is retried as an absolute path.
    fn apply_remote(&mut self, update: &ValueUpdate) -> Result<Vec<String>> {
        let mut absolute = Vec::with_capacity(update.path.len() + 1);
        absolute.push(self.tree.root_name().to_string());
        absolute.extend(update.path.iter().cloned());

        match self.tree.set_path_value(&absolute, &update.value) {
            Ok(_) => Ok(absolute),
            Err(GuiError::PathNotFound(_))
                if update.path.first().map(String::as_str) == Some(self.tree.root_name()) =>
            {
                self.tree.set_path_value(&update.path, &update.value)?;
                Ok(update.path.clone())
            }
            Err(e) => Err(e),
        }
    }

    /// Handle one notification of the legacy command channel.
    pub(super) fn handle_legacy_command(&mut self, bytes: &[u8]) -> Result<()> {
        let command = LegacyCommand::parse(bytes).map_err(|e| {
            tracing::warn!("ignoring legacy command: {}", e);
            e
        })?;

        match command {
            LegacyCommand::CustomControlAnnounce(announce) => {
                self.tree.announce_custom_control(&announce)?;
                tracing::debug!(
                    "custom control '{}' bound to {}",
                    announce.name,
                    announce.uuid
                );
                self.emit(SessionEvent::CustomControlAnnounced {
                    uuid: announce.uuid,
                    name: announce.name,
                });
            }
        }
        Ok(())
    }

    /// Drop requests older than `timeout`.
    pub(super) fn expire(&mut self, timeout: Duration, now: Instant) {
        for request_id in self.tracker.expire(timeout, now) {
            let error = GuiError::RequestTimeout(request_id);
            tracing::warn!("{} after {:?}", error, timeout);
            self.emit(SessionEvent::RequestExpired {
                request_id,
                error: error.to_string(),
            });
        }
    }

    /// Forget all transient protocol state.
    pub(super) fn teardown(&mut self) {
        if let Some(assembly) = self.assembly.take() {
            tracing::debug!(
                "discarding partial packet {} ({} of {} bytes)",
                assembly.header.request_id,
                assembly.reassembler.offset(),
                assembly.reassembler.expected()
            );
        }
        let cleared = self.tracker.clear();
        if cleared > 0 {
            tracing::debug!("dropped {} pending requests", cleared);
        }
        self.writer.close();
        self.set_state(SessionState::Closed);
    }
}

fn queue_set_value<S: AsRef<str>>(
    tracker: &mut RequestTracker,
    writer: &WriterHandle,
    path: &[S],
    value: &TaggedValue,
) -> Result<u32> {
    let id = tracker.issue(ClientKind::SetValue);
    let sent = encode_set_value(id, path, value).and_then(|packet| writer.send(path_key(path), packet));

    match sent {
        Ok(replaced) => {
            release_unsent(tracker, replaced);
            Ok(id)
        }
        Err(e) => {
            tracker.resolve(id);
            Err(e)
        }
    }
}

/// Forget the request carried by a packet the writer coalesced away.
///
/// The peer never sees that packet, so its id would otherwise stay pending.
fn release_unsent(tracker: &mut RequestTracker, replaced: Option<Bytes>) {
    let Some(packet) = replaced else {
        return;
    };
    match OutboundHeader::decode(&packet) {
        Ok(header) => {
            if tracker.resolve(header.request_id).is_some() {
                tracing::trace!("request {} superseded before sending", header.request_id);
            }
        }
        Err(e) => tracing::debug!("coalesced packet without header: {}", e),
    }
}

/// Root-side sink turning local edits into outbound packets.
struct Outbox<'a> {
    tracker: &'a mut RequestTracker,
    writer: &'a WriterHandle,
    events: &'a mpsc::UnboundedSender<SessionEvent>,
}

impl ChangeSink for Outbox<'_> {
    fn set_remote_value(&mut self, path: &[String], value: TaggedValue) -> Result<()> {
        match queue_set_value(self.tracker, self.writer, path, &value) {
            Ok(_) => Ok(()),
            Err(e) => {
                tracing::warn!("local change for '{}' not sent: {}", path.join(","), e);
                Err(e)
            }
        }
    }

    fn set_custom_color(&mut self, uuid: &str, color: RgbwColor) {
        let _ = self.events.send(SessionEvent::CustomColorChanged {
            uuid: uuid.to_string(),
            color,
        });
    }
}
