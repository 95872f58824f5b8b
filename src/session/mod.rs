//! Protocol session - builder and runtime loop.
//!
//! The [`SessionBuilder`] collects configuration; [`SessionBuilder::start`]
//! spawns the writer task and the receive task and returns the [`Session`]
//! handle plus its diagnostic event stream. The receive task:
//! 1. stops, then restarts notifications (retrying until it succeeds)
//! 2. requests the descriptor, re-requesting on timeout a bounded number
//!    of times
//! 3. feeds every notification to the dispatch core in arrival order
//! 4. expires unanswered requests when a request timeout is configured
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use blegui_client::session::{Session, SessionEvent};
//! use blegui_client::transport::MemoryCharacteristic;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (characteristic, notifications) = MemoryCharacteristic::new();
//! let (session, mut events) = Session::builder()
//!     .descriptor_timeout(Duration::from_secs(1))
//!     .start("Device1", characteristic.clone(), notifications);
//!
//! // The first write is the descriptor request
//! characteristic.wait_for_writes(1).await;
//! assert!(matches!(events.recv().await, Some(SessionEvent::StateChanged(_))));
//! session.close().await;
//! # }
//! ```

mod dispatch;
mod event;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use self::dispatch::SessionCore;
use crate::error::{GuiError, Result};
use crate::protocol::DEFAULT_MAX_PAYLOAD;
use crate::transport::Characteristic;
use crate::tree::{NodeId, ValueTree};
use crate::value::TaggedValue;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

pub use event::{SessionEvent, SessionState};

/// Default pause between notification subscription attempts.
pub const DEFAULT_SUBSCRIBE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Default time to wait for a descriptor before requesting it again.
pub const DEFAULT_DESCRIPTOR_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of descriptor requests before giving up.
pub const DEFAULT_DESCRIPTOR_ATTEMPTS: u32 = 3;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub writer: WriterConfig,
    pub subscribe_retry_delay: Duration,
    pub descriptor_timeout: Duration,
    /// Total descriptor requests, the first one included.
    pub descriptor_attempts: u32,
    /// Drop requests unanswered for this long. `None` keeps them forever.
    pub request_timeout: Option<Duration>,
    /// Largest accepted declared payload length.
    pub max_payload: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            subscribe_retry_delay: DEFAULT_SUBSCRIBE_RETRY_DELAY,
            descriptor_timeout: DEFAULT_DESCRIPTOR_TIMEOUT,
            descriptor_attempts: DEFAULT_DESCRIPTOR_ATTEMPTS,
            request_timeout: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Builder for configuring and starting a [`Session`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole writer configuration.
    pub fn writer_config(mut self, config: WriterConfig) -> Self {
        self.config.writer = config;
        self
    }

    /// Consecutive write failures before a write is abandoned.
    ///
    /// Default: 10
    pub fn max_write_failures(mut self, limit: u32) -> Self {
        self.config.writer.max_failures = limit;
        self
    }

    /// Delay before retrying a failed write.
    ///
    /// Default: 20 ms
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.writer.retry_delay = delay;
        self
    }

    /// Default: 250 ms
    pub fn subscribe_retry_delay(mut self, delay: Duration) -> Self {
        self.config.subscribe_retry_delay = delay;
        self
    }

    /// Default: 3 seconds
    pub fn descriptor_timeout(mut self, timeout: Duration) -> Self {
        self.config.descriptor_timeout = timeout;
        self
    }

    /// Default: 3
    pub fn descriptor_attempts(mut self, attempts: u32) -> Self {
        self.config.descriptor_attempts = attempts.max(1);
        self
    }

    /// Expire requests the peer never answers.
    ///
    /// Default: none
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Default: 1 MiB
    pub fn max_payload(mut self, limit: u32) -> Self {
        self.config.max_payload = limit;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a session talking to `characteristic`.
    ///
    /// `identity` names the tree root. `notifications` delivers the
    /// characteristic's value-change notifications in arrival order.
    /// Must be called within a Tokio runtime.
    pub fn start(
        self,
        identity: impl Into<String>,
        characteristic: Arc<dyn Characteristic>,
        notifications: mpsc::UnboundedReceiver<Bytes>,
    ) -> (Session, mpsc::UnboundedReceiver<SessionEvent>) {
        Session::start(self.config, identity.into(), characteristic, notifications)
    }
}

struct Shared {
    core: Mutex<SessionCore>,
    shutdown: Notify,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A running protocol session.
///
/// Owns the characteristic subscription, the writer and the value tree.
pub struct Session {
    identity: String,
    shared: Arc<Shared>,
    characteristic: Arc<dyn Characteristic>,
    writer: WriterHandle,
    task: Mutex<Option<JoinHandle<()>>>,
    _writer_task: JoinHandle<()>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    fn start(
        config: SessionConfig,
        identity: String,
        characteristic: Arc<dyn Characteristic>,
        notifications: mpsc::UnboundedReceiver<Bytes>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let (writer, writer_task) =
            spawn_writer_task(characteristic.clone(), config.writer.clone(), events_tx.clone());

        let shared = Arc::new(Shared {
            core: Mutex::new(SessionCore::new(
                &identity,
                writer.clone(),
                events_tx,
                config.max_payload,
            )),
            shutdown: Notify::new(),
            closed: AtomicBool::new(false),
        });

        let task = tokio::spawn(run(
            shared.clone(),
            characteristic.clone(),
            notifications,
            config,
        ));

        let session = Session {
            identity,
            shared,
            characteristic,
            writer,
            task: Mutex::new(Some(task)),
            _writer_task: writer_task,
        };
        (session, events_rx)
    }

    /// Peer identity, also the name of the tree root.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Whether a packet spanning several notifications is being received.
    pub fn is_receiving_fragment(&self) -> bool {
        self.shared.lock().is_receiving_fragment()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Request the full descriptor again.
    pub fn request_descriptor(&self) -> Result<u32> {
        self.ensure_open()?;
        self.shared.lock().request_descriptor()
    }

    /// Send a SetValue packet for `path`, returning its request id.
    ///
    /// The path is transmitted as given. Rapid calls for the same path
    /// collapse into one write carrying the last value.
    pub fn set_value<S: AsRef<str>>(&self, path: &[S], value: TaggedValue) -> Result<u32> {
        self.ensure_open()?;
        self.shared.lock().set_value(path, &value)
    }

    /// Apply a user edit to the control at the absolute `path` and transmit it.
    pub fn edit<S: AsRef<str>>(&self, path: &[S], value: TaggedValue) -> Result<()> {
        self.ensure_open()?;
        let mut core = self.shared.lock();
        let id = core.tree.resolve(path)?;
        core.local_change(id, &value)
    }

    /// Apply a user edit to control `id` and transmit it.
    pub fn edit_node(&self, id: NodeId, value: TaggedValue) -> Result<()> {
        self.ensure_open()?;
        self.shared.lock().local_change(id, &value)
    }

    /// Handle a notification of the legacy command channel.
    pub fn handle_legacy_command(&self, bytes: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.shared.lock().handle_legacy_command(bytes)
    }

    /// Current value of the control at the absolute `path`.
    pub fn value_at<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<TaggedValue>> {
        self.shared.lock().tree.value_at(path)
    }

    /// Run `f` with the value tree.
    ///
    /// The session lock is held for the duration of `f`.
    pub fn with_tree<R>(&self, f: impl FnOnce(&ValueTree) -> R) -> R {
        f(&self.shared.lock().tree)
    }

    /// Run `f` with mutable access to the value tree (display flags,
    /// disabled state). Changes made here are not transmitted.
    pub fn with_tree_mut<R>(&self, f: impl FnOnce(&mut ValueTree) -> R) -> R {
        f(&mut self.shared.lock().tree)
    }

    /// Number of requests the peer has not answered.
    pub fn pending_requests(&self) -> usize {
        self.shared.lock().tracker.len()
    }

    /// Number of writes queued or in flight.
    pub fn pending_writes(&self) -> usize {
        self.writer.pending_count()
    }

    /// Tear the session down.
    ///
    /// Stops notifications, discards any partial packet, forgets pending
    /// requests without completing them and stops the writer.
    pub async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.notify_one();

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("session task failed: {}", e);
            }
        }

        if let Err(e) = self.characteristic.stop_notifications().await {
            tracing::warn!("stopping notifications on close: {}", e);
        }

        self.shared.lock().teardown();
        tracing::debug!("session '{}' closed", self.identity);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(GuiError::ConnectionClosed);
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            self.shared.shutdown.notify_one();
            self.writer.close();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receive task.
async fn run(
    shared: Arc<Shared>,
    characteristic: Arc<dyn Characteristic>,
    mut notifications: mpsc::UnboundedReceiver<Bytes>,
    config: SessionConfig,
) {
    if !subscribe(&shared, characteristic.as_ref(), config.subscribe_retry_delay).await {
        return;
    }

    {
        let mut core = shared.lock();
        core.set_state(SessionState::RequestingDescriptor);
        if let Err(e) = core.request_descriptor() {
            tracing::error!("descriptor request failed: {}", e);
        }
    }
    let mut attempts: u32 = 1;
    let mut descriptor_deadline = Some(Instant::now() + config.descriptor_timeout);

    loop {
        let expiry = {
            let core = shared.lock();
            if core.state == SessionState::Synchronized {
                descriptor_deadline = None;
            }
            config
                .request_timeout
                .and_then(|timeout| core.tracker.next_deadline(timeout))
        };

        tokio::select! {
            _ = shared.shutdown.notified() => return,
            message = notifications.recv() => match message {
                Some(bytes) => {
                    shared.lock().handle_notification(&bytes);
                }
                None => {
                    tracing::debug!("notification stream ended");
                    return;
                }
            },
            _ = sleep_until(descriptor_deadline) => {
                let mut core = shared.lock();
                if attempts < config.descriptor_attempts {
                    attempts += 1;
                    tracing::warn!(
                        "descriptor not received, requesting again ({}/{})",
                        attempts,
                        config.descriptor_attempts
                    );
                    match core.request_descriptor() {
                        Ok(request_id) => core.emit(SessionEvent::DescriptorRetry {
                            attempt: attempts,
                            request_id,
                        }),
                        Err(e) => tracing::error!("descriptor request failed: {}", e),
                    }
                    descriptor_deadline = Some(Instant::now() + config.descriptor_timeout);
                } else {
                    tracing::error!("descriptor not received after {} requests", attempts);
                    core.emit(SessionEvent::DescriptorUnanswered { attempts });
                    descriptor_deadline = None;
                }
            }
            _ = sleep_until(expiry) => {
                if let Some(timeout) = config.request_timeout {
                    shared.lock().expire(timeout, Instant::now());
                }
            }
        }
    }
}

/// Stop then start notifications until it succeeds.
///
/// Returns `false` if the session was closed first.
async fn subscribe(shared: &Shared, characteristic: &dyn Characteristic, retry_delay: Duration) -> bool {
    shared.lock().set_state(SessionState::SubscribingNotifications);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        // A stale subscription from an earlier connection blocks delivery
        if let Err(e) = characteristic.stop_notifications().await {
            tracing::debug!("stop notifications: {}", e);
        }

        let error = match characteristic.start_notifications().await {
            Ok(()) => return true,
            Err(e) => e.to_string(),
        };
        tracing::warn!("notification subscription attempt {} failed: {}", attempt, error);
        shared
            .lock()
            .emit(SessionEvent::SubscriptionFailed { attempt, error });

        tokio::select! {
            _ = shared.shutdown.notified() => return false,
            _ = tokio::time::sleep(retry_delay) => {}
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
