//! Scheduling boundary between the engine and the worker pool.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::proof::ProofId;

/// A popped queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCheck {
    pub id: ProofId,
    pub at: DateTime<Utc>,
    /// Record version whose effect created the entry.
    pub version: u64,
}

/// Queue of pending checks keyed on `next_check_at`.
///
/// A proof is queued at most once; scheduling it again replaces the earlier
/// entry. Every call carries the record version that produced it, and calls
/// older than the newest version seen for a proof are dropped, so a slow
/// writer can never overwrite the schedule of a later snapshot.
pub trait RetryQueue: Send + Sync {
    fn schedule(
        &self,
        id: &ProofId,
        at: DateTime<Utc>,
        version: u64,
    ) -> impl Future<Output = ()> + Send;

    /// Drop any pending check for `id`.
    fn cancel(&self, id: &ProofId, version: u64) -> impl Future<Output = ()> + Send;

    /// Remove and return up to `limit` checks due at or before `now`, earliest first.
    fn pop_due(&self, now: DateTime<Utc>, limit: usize) -> impl Future<Output = Vec<DueCheck>> + Send;

    /// When the earliest pending check is due, if any.
    fn next_due(&self) -> impl Future<Output = Option<DateTime<Utc>>> + Send;
}

#[derive(Debug, Default)]
struct Pending {
    by_time: BTreeSet<(DateTime<Utc>, ProofId)>,
    by_id: HashMap<ProofId, DateTime<Utc>>,
    // Newest version seen per proof; kept after pop and cancel.
    versions: HashMap<ProofId, u64>,
}

impl Pending {
    /// Records `version` for `id`, or returns false if a newer one was seen.
    fn admit(&mut self, id: &ProofId, version: u64) -> bool {
        match self.versions.get(id) {
            Some(&seen) if version < seen => false,
            _ => {
                self.versions.insert(id.clone(), version);
                true
            }
        }
    }

    fn remove(&mut self, id: &ProofId) {
        if let Some(previous) = self.by_id.remove(id) {
            self.by_time.remove(&(previous, id.clone()));
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRetryQueue {
    pending: Mutex<Pending>,
}

impl InMemoryRetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.by_id.is_empty()
    }

    /// Scheduled time for `id`, if queued.
    pub async fn scheduled_at(&self, id: &ProofId) -> Option<DateTime<Utc>> {
        self.pending.lock().await.by_id.get(id).copied()
    }
}

impl RetryQueue for InMemoryRetryQueue {
    async fn schedule(&self, id: &ProofId, at: DateTime<Utc>, version: u64) {
        let mut pending = self.pending.lock().await;
        if !pending.admit(id, version) {
            debug!(proof_id = %id, version, "dropping schedule from outdated snapshot");
            return;
        }
        pending.remove(id);
        pending.by_id.insert(id.clone(), at);
        pending.by_time.insert((at, id.clone()));
    }

    async fn cancel(&self, id: &ProofId, version: u64) {
        let mut pending = self.pending.lock().await;
        if pending.admit(id, version) {
            pending.remove(id);
        }
    }

    async fn pop_due(&self, now: DateTime<Utc>, limit: usize) -> Vec<DueCheck> {
        let mut pending = self.pending.lock().await;
        let mut due = Vec::new();
        while due.len() < limit {
            match pending.by_time.first() {
                Some((at, _)) if *at <= now => {}
                _ => break,
            }
            if let Some((at, id)) = pending.by_time.pop_first() {
                pending.by_id.remove(&id);
                let version = pending.versions.get(&id).copied().unwrap_or_default();
                due.push(DueCheck { id, at, version });
            }
        }
        due
    }

    async fn next_due(&self) -> Option<DateTime<Utc>> {
        self.pending.lock().await.by_time.first().map(|(at, _)| *at)
    }
}
