//! Dedicated writer task delivering packets to the characteristic.
//!
//! Writes are serialized: at most one is in flight. Each packet carries a
//! group key (the request header for descriptor requests, the joined path
//! for value changes). A packet whose key is already queued replaces the
//! queued payload instead of appending, so a slider dragged across fifty
//! positions while a write is in flight produces one follow-up write.
//!
//! # Architecture
//!
//! ```text
//! Session ─► WriterHandle::send(key, payload) ─► queue ─► Writer Task ─► Characteristic
//!                                                           │
//!                                    WriteAborted ◄─────────┘ (after max_failures)
//! ```
//!
//! A failed write is retried after `retry_delay`, carrying the newest payload
//! if the entry was replaced meanwhile. The failure counter spans
//! replacements of the same entry and resets once an entry completes. After
//! `max_failures` consecutive failures the entry is dropped and reported.
//!
//! [`WriterHandle::send`] hands back a replaced payload that never reached the
//! characteristic, so callers can release whatever that payload referenced.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::{GuiError, Result};
use crate::transport::Characteristic;

/// Default number of consecutive failures before a write is abandoned.
pub const DEFAULT_MAX_FAILURES: u32 = 10;

/// Default pause between a failed write and its retry.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Consecutive failures after which the head entry is dropped.
    pub max_failures: u32,
    /// Delay before retrying a failed write.
    pub retry_delay: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_failures: DEFAULT_MAX_FAILURES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// A queued packet.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub group_key: String,
    pub payload: Bytes,
    /// Bumped every time the payload is replaced.
    generation: u64,
    /// Generation currently handed to the characteristic.
    in_flight: Option<u64>,
}

/// Report emitted when a write is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAborted {
    pub group_key: String,
    pub failures: u32,
    pub last_error: String,
}

struct Shared {
    queue: Mutex<VecDeque<PendingWrite>>,
    wake: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingWrite>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle for queueing packets on the writer task.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    shared: Arc<Shared>,
}

impl WriterHandle {
    /// Queue `payload` under `group_key`.
    ///
    /// Never blocks. If an entry with the same key is queued (including the
    /// one in flight), its payload is replaced in place. The replaced payload
    /// is returned when it was never handed to the characteristic; a payload
    /// already in flight may still be delivered and yields `None`.
    pub fn send(&self, group_key: impl Into<String>, payload: Bytes) -> Result<Option<Bytes>> {
        if self.is_closed() {
            return Err(GuiError::ConnectionClosed);
        }

        let group_key = group_key.into();
        let mut queue = self.shared.lock();

        if let Some(existing) = queue.iter_mut().find(|w| w.group_key == group_key) {
            tracing::trace!("coalescing write for '{}'", group_key);
            let replaced = std::mem::replace(&mut existing.payload, payload);
            let unsent = existing.in_flight != Some(existing.generation);
            existing.generation += 1;
            return Ok(unsent.then_some(replaced));
        }

        let was_empty = queue.is_empty();
        queue.push_back(PendingWrite {
            group_key,
            payload,
            generation: 0,
            in_flight: None,
        });
        drop(queue);

        if was_empty {
            self.shared.wake.notify_one();
        }
        Ok(None)
    }

    /// Number of queued entries, the in-flight one included.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.shared.lock().len()
    }

    /// Whether nothing is queued or in flight.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.shared.lock().is_empty()
    }

    /// Group keys in queue order.
    pub fn queued_keys(&self) -> Vec<String> {
        self.shared
            .lock()
            .iter()
            .map(|w| w.group_key.clone())
            .collect()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Stop the writer task and drop everything still queued.
    ///
    /// A write already handed to the characteristic is not cancelled.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let dropped = {
                let mut queue = self.shared.lock();
                let n = queue.len();
                queue.clear();
                n
            };
            if dropped > 0 {
                tracing::debug!("writer closed with {} queued writes dropped", dropped);
            }
            self.shared.wake.notify_one();
        }
    }
}

impl std::fmt::Debug for WriterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterHandle")
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Spawn the writer task and return a handle for queueing packets.
///
/// Abandoned writes are reported on `reports`, converted into the caller's
/// event type.
pub fn spawn_writer_task<E>(
    characteristic: Arc<dyn Characteristic>,
    config: WriterConfig,
    reports: mpsc::UnboundedSender<E>,
) -> (WriterHandle, JoinHandle<()>)
where
    E: From<WriteAborted> + Send + 'static,
{
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::new()),
        wake: Notify::new(),
        closed: AtomicBool::new(false),
    });

    let handle = WriterHandle {
        shared: shared.clone(),
    };
    let task = tokio::spawn(writer_loop(shared, characteristic, config, reports));

    (handle, task)
}

/// Main writer loop - writes the queue head until the handle is closed.
async fn writer_loop<E>(
    shared: Arc<Shared>,
    characteristic: Arc<dyn Characteristic>,
    config: WriterConfig,
    reports: mpsc::UnboundedSender<E>,
) where
    E: From<WriteAborted> + Send + 'static,
{
    let mut failures: u32 = 0;

    loop {
        let Some((group_key, payload, generation)) = next_write(&shared).await else {
            return;
        };

        match characteristic.write(payload).await {
            Ok(()) => {
                failures = 0;
                let mut queue = shared.lock();
                // A replaced head is sent again on the next turn
                if queue
                    .front()
                    .is_some_and(|w| w.group_key == group_key && w.generation == generation)
                {
                    queue.pop_front();
                }
            }
            Err(e) => {
                failures += 1;
                if let Some(head) = shared.lock().front_mut() {
                    if head.group_key == group_key && head.in_flight == Some(generation) {
                        head.in_flight = None;
                    }
                }
                tracing::warn!(
                    "write for '{}' failed ({}/{}): {}",
                    group_key,
                    failures,
                    config.max_failures,
                    e
                );

                if failures >= config.max_failures {
                    {
                        let mut queue = shared.lock();
                        if queue.front().is_some_and(|w| w.group_key == group_key) {
                            queue.pop_front();
                        }
                    }
                    tracing::error!(
                        "abandoning write for '{}' after {} failures",
                        group_key,
                        failures
                    );
                    let _ = reports.send(E::from(WriteAborted {
                        group_key,
                        failures,
                        last_error: e.to_string(),
                    }));
                    failures = 0;
                    continue;
                }

                tokio::time::sleep(config.retry_delay).await;
            }
        }
    }
}

/// Wait for a queue head, returning `None` once closed.
async fn next_write(shared: &Shared) -> Option<(String, Bytes, u64)> {
    loop {
        let woken = shared.wake.notified();
        if shared.closed.load(Ordering::Acquire) {
            return None;
        }
        if let Some(head) = shared.lock().front_mut() {
            head.in_flight = Some(head.generation);
            return Some((head.group_key.clone(), head.payload.clone(), head.generation));
        }
        woken.await;
    }
}
