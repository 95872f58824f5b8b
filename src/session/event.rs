//! Session lifecycle states and diagnostic events.

use crate::protocol::PeerKind;
use crate::value::{RgbwColor, TaggedValue};
use crate::writer::WriteAborted;

/// Lifecycle of a session.
///
/// Fragment reception runs in parallel with every state and is reported by
/// [`Session::is_receiving_fragment`](super::Session::is_receiving_fragment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SubscribingNotifications,
    RequestingDescriptor,
    Synchronized,
    Closed,
}

/// Diagnostic events published by a session.
///
/// None of these terminate the session; they are the typed counterpart of
/// its log output.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// A notification subscription attempt failed; it will be retried.
    SubscriptionFailed { attempt: u32, error: String },
    /// The descriptor request timed out and was issued again.
    DescriptorRetry { attempt: u32, request_id: u32 },
    /// Every descriptor attempt timed out.
    DescriptorUnanswered { attempts: u32 },
    DescriptorApplied { request_id: u32, nodes: usize },
    /// A complete packet whose id is not ours and that is not an update.
    Discarded { kind: PeerKind, request_id: u32 },
    /// The peer echoed one of our own SetValue packets.
    EchoAcknowledged { request_id: u32, path: Vec<String> },
    /// A peer-initiated value was applied; `path` is absolute.
    RemoteValueApplied { path: Vec<String>, value: TaggedValue },
    /// A peer-initiated value could not be applied.
    UpdateFailed { path: Vec<String>, error: String },
    /// Malformed header, fragment or payload.
    ProtocolError(String),
    WriteAborted {
        group_key: String,
        failures: u32,
        last_error: String,
    },
    /// No answer within the request timeout; `error` renders [`GuiError::RequestTimeout`].
    ///
    /// [`GuiError::RequestTimeout`]: crate::error::GuiError::RequestTimeout
    RequestExpired { request_id: u32, error: String },
    CustomControlAnnounced { uuid: String, name: String },
    /// A color control bound to its own characteristic was edited.
    CustomColorChanged { uuid: String, color: RgbwColor },
}

impl From<WriteAborted> for SessionEvent {
    fn from(report: WriteAborted) -> Self {
        SessionEvent::WriteAborted {
            group_key: report.group_key,
            failures: report.failures,
            last_error: report.last_error,
        }
    }
}
