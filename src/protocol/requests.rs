//! Request id generation and pending-request bookkeeping.
//!
//! Ids come from a wrapping counter seeded from the clock, so consecutive
//! calls never collide and ids differ between sessions. An id stays
//! pending until a response carrying it arrives, it expires, or the
//! session is torn down.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

use super::wire_format::ClientKind;

/// A request the peer has not answered yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: ClientKind,
    pub issued_at: Instant,
}

/// Tracks issued request ids.
#[derive(Debug)]
pub struct RequestTracker {
    next_id: u32,
    pending: HashMap<u32, PendingRequest>,
}

impl RequestTracker {
    /// Create a tracker seeded from the system clock.
    pub fn new() -> Self {
        Self::with_seed(clock_seed())
    }

    /// Create a tracker whose first id is `seed`.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            next_id: seed,
            pending: HashMap::new(),
        }
    }

    /// Issue a fresh id and record it as pending.
    pub fn issue(&mut self, kind: ClientKind) -> u32 {
        // Skip ids still in flight after a full wrap
        let mut id = self.next_id;
        while self.pending.contains_key(&id) {
            id = id.wrapping_add(1);
        }
        self.next_id = id.wrapping_add(1);

        self.pending.insert(
            id,
            PendingRequest {
                kind,
                issued_at: Instant::now(),
            },
        );
        id
    }

    /// Remove `id` from the pending set, returning its record if it was ours.
    pub fn resolve(&mut self, id: u32) -> Option<PendingRequest> {
        self.pending.remove(&id)
    }

    #[inline]
    pub fn is_pending(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    /// Whether any request of `kind` is outstanding.
    pub fn has_pending(&self, kind: ClientKind) -> bool {
        self.pending.values().any(|p| p.kind == kind)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every request older than `timeout`, returning the expired ids.
    pub fn expire(&mut self, timeout: Duration, now: Instant) -> Vec<u32> {
        let mut expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.issued_at) >= timeout)
            .map(|(id, _)| *id)
            .collect();
        expired.sort_unstable();

        for id in &expired {
            self.pending.remove(id);
        }
        expired
    }

    /// Earliest instant at which a pending request would expire.
    pub fn next_deadline(&self, timeout: Duration) -> Option<Instant> {
        self.pending.values().map(|p| p.issued_at + timeout).min()
    }

    /// Forget every pending request without resolving it.
    pub fn clear(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_seed() -> u32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let mixed = nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ u64::from(std::process::id());
    (mixed >> 32) as u32
}
