//! Transport module - the GATT characteristic the session talks through.
//!
//! A session needs exactly three things from the link:
//! - write a byte packet to the peer characteristic
//! - start and stop value-change notifications
//! - a stream of notification payloads (an `mpsc` receiver of [`Bytes`])
//!
//! Platform BLE stacks implement [`Characteristic`]; [`MemoryCharacteristic`]
//! is an in-process peer used by tests and demos.

mod memory;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::error::Result;

pub use memory::{CharacteristicOp, MemoryCharacteristic};

/// Boxed future returned by transport operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A writable, notifying characteristic.
///
/// Failures are reported as [`GuiError::TransportWrite`] or
/// [`GuiError::Subscription`].
///
/// [`GuiError::TransportWrite`]: crate::error::GuiError::TransportWrite
/// [`GuiError::Subscription`]: crate::error::GuiError::Subscription
pub trait Characteristic: Send + Sync + 'static {
    /// Write one packet. Resolves once the link acknowledged the write.
    fn write(&self, data: Bytes) -> BoxFuture<'_, Result<()>>;

    /// Enable value-change notifications.
    fn start_notifications(&self) -> BoxFuture<'_, Result<()>>;

    /// Disable value-change notifications.
    fn stop_notifications(&self) -> BoxFuture<'_, Result<()>>;
}
