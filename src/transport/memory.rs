//! In-process characteristic for tests and simulated peers.
//!
//! Every operation is recorded in order. Writes can be made to fail or held
//! in flight, and the peer side injects notifications with [`notify`] or
//! [`notify_packet`].
//!
//! [`notify`]: MemoryCharacteristic::notify
//! [`notify_packet`]: MemoryCharacteristic::notify_packet

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, Notify, Semaphore};

use super::{BoxFuture, Characteristic};
use crate::error::{GuiError, Result};
use crate::protocol::{build_inbound_packet, fragment, PeerKind};

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CharacteristicOp {
    Write(Bytes),
    FailedWrite(Bytes),
    StartNotifications,
    StopNotifications,
}

/// Characteristic backed by memory.
#[derive(Debug)]
pub struct MemoryCharacteristic {
    ops: Mutex<Vec<CharacteristicOp>>,
    changed: Notify,
    write_failures: AtomicUsize,
    fail_all_writes: AtomicBool,
    subscribe_failures: AtomicUsize,
    subscribed: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    notifications: mpsc::UnboundedSender<Bytes>,
}

impl MemoryCharacteristic {
    /// Create a characteristic and the notification stream a session reads.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let characteristic = Arc::new(Self {
            ops: Mutex::new(Vec::new()),
            changed: Notify::new(),
            write_failures: AtomicUsize::new(0),
            fail_all_writes: AtomicBool::new(false),
            subscribe_failures: AtomicUsize::new(0),
            subscribed: AtomicBool::new(false),
            gate: Mutex::new(None),
            notifications: tx,
        });
        (characteristic, rx)
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.write_failures.store(count, Ordering::SeqCst);
    }

    /// Fail every write until switched off.
    pub fn fail_all_writes(&self, enabled: bool) {
        self.fail_all_writes.store(enabled, Ordering::SeqCst);
    }

    /// Fail the next `count` calls to `start_notifications`.
    pub fn fail_next_subscriptions(&self, count: usize) {
        self.subscribe_failures.store(count, Ordering::SeqCst);
    }

    /// Hold subsequent writes in flight until released.
    pub fn hold_writes(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Arc::new(Semaphore::new(0)));
    }

    /// Let exactly one held write complete.
    pub fn release_one_write(&self) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(1);
        }
    }

    /// Stop holding writes and let every held write complete.
    pub fn release_writes(&self) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).take() {
            gate.close();
        }
    }

    /// Every operation so far, in order.
    pub fn ops(&self) -> Vec<CharacteristicOp> {
        self.lock_ops().clone()
    }

    /// Payloads of the writes that succeeded.
    pub fn writes(&self) -> Vec<Bytes> {
        self.lock_ops()
            .iter()
            .filter_map(|op| match op {
                CharacteristicOp::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of write attempts, failed ones included.
    pub fn write_attempts(&self) -> usize {
        self.lock_ops()
            .iter()
            .filter(|op| {
                matches!(
                    op,
                    CharacteristicOp::Write(_) | CharacteristicOp::FailedWrite(_)
                )
            })
            .count()
    }

    #[inline]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    /// Deliver one notification. Dropped unless notifications are enabled.
    pub fn notify(&self, bytes: impl Into<Bytes>) -> bool {
        if !self.is_subscribed() {
            tracing::debug!("notification dropped, not subscribed");
            return false;
        }
        self.notifications.send(bytes.into()).is_ok()
    }

    /// Send a whole peer packet split into `mtu`-sized notifications.
    ///
    /// Returns the number of fragments delivered.
    pub fn notify_packet(&self, kind: PeerKind, request_id: u32, payload: &[u8], mtu: usize) -> usize {
        let packet = build_inbound_packet(kind, request_id, payload);
        fragment(&packet, mtu)
            .into_iter()
            .filter(|chunk| self.notify(chunk.clone()))
            .count()
    }

    /// Wait until the recorded operations satisfy `condition`.
    pub async fn wait_until<F>(&self, condition: F)
    where
        F: Fn(&[CharacteristicOp]) -> bool,
    {
        loop {
            let changed = self.changed.notified();
            if condition(&self.lock_ops()) {
                return;
            }
            changed.await;
        }
    }

    /// Wait for `count` successful writes.
    pub async fn wait_for_writes(&self, count: usize) {
        self.wait_until(|ops| {
            ops.iter()
                .filter(|op| matches!(op, CharacteristicOp::Write(_)))
                .count()
                >= count
        })
        .await
    }

    /// Wait for `count` write attempts.
    pub async fn wait_for_attempts(&self, count: usize) {
        self.wait_until(|ops| {
            ops.iter()
                .filter(|op| {
                    matches!(
                        op,
                        CharacteristicOp::Write(_) | CharacteristicOp::FailedWrite(_)
                    )
                })
                .count()
                >= count
        })
        .await
    }

    fn record(&self, op: CharacteristicOp) {
        self.lock_ops().push(op);
        self.changed.notify_waiters();
    }

    fn lock_ops(&self) -> std::sync::MutexGuard<'_, Vec<CharacteristicOp>> {
        self.ops.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Characteristic for MemoryCharacteristic {
    fn write(&self, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let gate = self
                .gate
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            if let Some(gate) = gate {
                // A closed gate means writes were released
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let fail = self.fail_all_writes.load(Ordering::SeqCst)
                || Self::take_failure(&self.write_failures);

            if fail {
                self.record(CharacteristicOp::FailedWrite(data));
                Err(GuiError::TransportWrite("simulated write failure".to_string()))
            } else {
                self.record(CharacteristicOp::Write(data));
                Ok(())
            }
        })
    }

    fn start_notifications(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record(CharacteristicOp::StartNotifications);
            if Self::take_failure(&self.subscribe_failures) {
                return Err(GuiError::Subscription(
                    "simulated subscription failure".to_string(),
                ));
            }
            self.subscribed.store(true, Ordering::SeqCst);
            self.changed.notify_waiters();
            Ok(())
        })
    }

    fn stop_notifications(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.subscribed.store(false, Ordering::SeqCst);
            self.record(CharacteristicOp::StopNotifications);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_records_writes_in_order() {
        let (ch, _rx) = MemoryCharacteristic::new();
        ch.write(Bytes::from_static(b"a")).await.unwrap();
        ch.write(Bytes::from_static(b"b")).await.unwrap();

        assert_eq!(
            ch.writes(),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
        assert_eq!(ch.write_attempts(), 2);
    }

    #[tokio::test]
    async fn test_scripted_write_failures() {
        let (ch, _rx) = MemoryCharacteristic::new();
        ch.fail_next_writes(2);

        assert!(ch.write(Bytes::from_static(b"x")).await.is_err());
        assert!(ch.write(Bytes::from_static(b"x")).await.is_err());
        assert!(ch.write(Bytes::from_static(b"x")).await.is_ok());
        assert_eq!(ch.write_attempts(), 3);
        assert_eq!(ch.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_notifications_require_subscription() {
        let (ch, mut rx) = MemoryCharacteristic::new();
        assert!(!ch.notify(Bytes::from_static(b"early")));

        ch.start_notifications().await.unwrap();
        assert!(ch.notify(Bytes::from_static(b"late")));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"late"));
    }

    #[tokio::test]
    async fn test_subscription_failure() {
        let (ch, _rx) = MemoryCharacteristic::new();
        ch.fail_next_subscriptions(1);

        assert!(matches!(
            ch.start_notifications().await,
            Err(GuiError::Subscription(_))
        ));
        assert!(!ch.is_subscribed());
        ch.start_notifications().await.unwrap();
        assert!(ch.is_subscribed());
    }

    #[tokio::test]
    async fn test_notify_packet_fragments() {
        let (ch, mut rx) = MemoryCharacteristic::new();
        ch.start_notifications().await.unwrap();

        let delivered = ch.notify_packet(PeerKind::DescriptorData, 1, &[0u8; 11], 10);
        assert_eq!(delivered, 2);
        assert_eq!(rx.recv().await.unwrap().len(), 10);
        assert_eq!(rx.recv().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_held_write_completes_on_release() {
        let (ch, _rx) = MemoryCharacteristic::new();
        ch.hold_writes();

        let writer = ch.clone();
        let task = tokio::spawn(async move { writer.write(Bytes::from_static(b"held")).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ch.writes().is_empty());

        ch.release_writes();
        task.await.unwrap().unwrap();
        assert_eq!(ch.writes().len(), 1);
    }
}
