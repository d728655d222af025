//! In-memory guard against duplicate and overlapping submissions.
//!
//! The gate is process-local and best effort: it keeps at most one pending
//! submission per caller and forgets everything on restart.

mod types;

pub use types::*;

use crate::config::GateConfig;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub struct RequestGate {
    pending: Mutex<HashMap<CallerId, PendingSubmission>>,
    duplicate_window: Duration,
    cooldown: Duration,
    next_ticket: AtomicU64,
}

impl RequestGate {
    pub fn new(config: &GateConfig) -> Self {
        Self::with_windows(config.duplicate_window(), config.cooldown())
    }

    pub fn with_windows(duplicate_window: Duration, cooldown: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            duplicate_window,
            cooldown,
            next_ticket: AtomicU64::new(1),
        }
    }

    /// Checks and records a submission as one step under the map lock.
    ///
    /// Exact-duplicate payloads are checked across every caller first, then
    /// the caller's own cooldown. The returned ticket releases the entry when
    /// dropped.
    pub fn try_acquire(
        &self,
        caller: &CallerId,
        signature: PayloadSignature,
    ) -> std::result::Result<GateTicket<'_>, Rejection> {
        let now = Instant::now();
        let mut pending = self.lock();

        if let Some(age) = pending
            .values()
            .filter(|entry| entry.signature == signature)
            .map(|entry| entry.age(now))
            .find(|age| *age < self.duplicate_window)
        {
            info!(caller = %caller, "Exact duplicate request detected (same files), rejecting");
            return Err(Rejection::DuplicateInFlight {
                retry_after: self.duplicate_window - age,
            });
        }

        if let Some(existing) = pending.get(caller) {
            let age = existing.age(now);
            if age < self.cooldown {
                info!(
                    caller = %caller,
                    age_ms = age.as_millis() as u64,
                    "Resubmission within cooldown window, rejecting"
                );
                return Err(Rejection::ResubmittedTooSoon {
                    retry_after: self.cooldown - age,
                });
            }
            warn!(caller = %caller, "Replacing stale pending submission");
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        pending.insert(
            caller.clone(),
            PendingSubmission {
                signature,
                submitted_at: now,
                ticket,
            },
        );
        debug!(caller = %caller, ticket, "Submission accepted");

        Ok(GateTicket {
            gate: self,
            caller: caller.clone(),
            ticket,
        })
    }

    /// Removes the caller's entry regardless of which acquisition created it.
    pub fn release(&self, caller: &CallerId) -> bool {
        let removed = self.lock().remove(caller).is_some();
        if removed {
            debug!(caller = %caller, "Released pending submission");
        }
        removed
    }

    /// Wipes all tracked submissions and returns how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        info!("Cleared {} ongoing requests", count);
        count
    }

    pub fn is_pending(&self, caller: &CallerId) -> bool {
        self.lock().contains_key(caller)
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn release_ticket(&self, caller: &CallerId, ticket: u64) {
        let mut pending = self.lock();
        if pending.get(caller).is_some_and(|entry| entry.ticket == ticket) {
            pending.remove(caller);
            debug!(caller = %caller, ticket, "Released pending submission");
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<CallerId, PendingSubmission>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of an accepted submission. Dropping it releases the caller's entry,
/// unless a newer acquisition has already replaced it.
#[must_use = "dropping the ticket releases the submission immediately"]
#[derive(Debug)]
pub struct GateTicket<'a> {
    gate: &'a RequestGate,
    caller: CallerId,
    ticket: u64,
}

impl GateTicket<'_> {
    pub fn caller(&self) -> &CallerId {
        &self.caller
    }
}

impl Drop for GateTicket<'_> {
    fn drop(&mut self) {
        self.gate.release_ticket(&self.caller, self.ticket);
    }
}

impl std::fmt::Debug for RequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGate")
            .field("pending", &self.pending_count())
            .field("duplicate_window", &self.duplicate_window)
            .field("cooldown", &self.cooldown)
            .finish()
    }
}
