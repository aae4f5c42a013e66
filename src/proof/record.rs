use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ProofState, ProofStatus, ProofType};

/// Number of diagnostic history rows kept per record.
pub const HISTORY_LIMIT: usize = 32;

/// Opaque proof identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofId(String);

impl ProofId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProofId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProofId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Explicit lifecycle events raised by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProofEvent {
    /// A check has been queued for a freshly posted proof.
    Enqueue,
    /// The user revoked the proof.
    Revoke,
    /// The user posted a newer proof for the same slot.
    Supersede { by: ProofId },
    /// The proof was deleted.
    Delete,
}

impl fmt::Display for ProofEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProofEvent::Enqueue => write!(f, "enqueue"),
            ProofEvent::Revoke => write!(f, "revoke"),
            ProofEvent::Supersede { by } => write!(f, "supersede by {by}"),
            ProofEvent::Delete => write!(f, "delete"),
        }
    }
}

/// One row of the diagnostic history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub status: Option<ProofStatus>,
    pub event: Option<ProofEvent>,
    pub from: ProofState,
    pub to: ProofState,
}

/// Failure counters the scheduler keys its backoff on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryHistory {
    pub consecutive_soft_failures: u32,
    pub consecutive_hard_failures: u32,
}

/// Mutable proof entity. The store owns it; the state machine only ever sees
/// snapshots and returns new ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    pub id: ProofId,
    pub proof_type: ProofType,
    pub state: ProofState,
    pub last_status: ProofStatus,
    pub consecutive_hard_failures: u32,
    pub consecutive_soft_failures: u32,
    pub created_at: DateTime<Utc>,
    pub first_checked_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<ProofId>,
    /// Compare-and-swap token, bumped on every applied snapshot.
    pub version: u64,
    pub history: VecDeque<HistoryEntry>,
}

impl ProofRecord {
    /// A freshly posted proof, not yet queued for checking.
    pub fn new(id: ProofId, proof_type: ProofType, now: DateTime<Utc>) -> Self {
        Self {
            id,
            proof_type,
            state: ProofState::Posted,
            last_status: ProofStatus::None,
            consecutive_hard_failures: 0,
            consecutive_soft_failures: 0,
            created_at: now,
            first_checked_at: None,
            last_checked_at: None,
            next_check_at: None,
            superseded_by: None,
            version: 0,
            history: VecDeque::new(),
        }
    }

    pub fn retry_history(&self) -> RetryHistory {
        RetryHistory {
            consecutive_soft_failures: self.consecutive_soft_failures,
            consecutive_hard_failures: self.consecutive_hard_failures,
        }
    }

    /// Appends a history row, dropping the oldest beyond [`HISTORY_LIMIT`].
    pub(crate) fn push_history(&mut self, entry: HistoryEntry) {
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }
}
