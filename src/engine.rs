use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::config::ProofCheckConfig;
use crate::error::ProofError;
use crate::proof::{
    Effect, IgnoreReason, ProofEvent, ProofId, ProofRecord, ProofStateMachine, ProofStatus,
    ProofType, RetryScheduler, Transition, classify_status,
};
use crate::queue::RetryQueue;
use crate::store::ProofRecordStore;

const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 8;

/// Inbound operation, replayed against each fresh snapshot of the CAS loop.
enum Op {
    Check(ProofStatus, DateTime<Utc>),
    Event(ProofEvent, DateTime<Utc>),
}

/// Entry point for check results and lifecycle events.
///
/// Every update is an optimistic read-modify-write: load the snapshot, compute
/// the transition, compare-and-swap it in. A writer that loses the race
/// recomputes against the winner's snapshot instead of overwriting it.
pub struct ProofEngine<S, Q> {
    store: S,
    queue: Q,
    machine: ProofStateMachine,
    max_cas_attempts: u32,
}

impl<S: ProofRecordStore, Q: RetryQueue> ProofEngine<S, Q> {
    pub fn new(store: S, queue: Q, machine: ProofStateMachine) -> Self {
        Self {
            store,
            queue,
            machine,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }

    /// Create an engine whose policy comes from `config`.
    pub fn from_config(store: S, queue: Q, config: &ProofCheckConfig) -> Self {
        let machine = ProofStateMachine::new(RetryScheduler::new(config.retry_policy()));
        Self {
            store,
            queue,
            machine,
            max_cas_attempts: config.max_cas_attempts.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn machine(&self) -> &ProofStateMachine {
        &self.machine
    }

    /// Register a freshly posted proof under a new id.
    pub async fn post(&self, proof_type: ProofType, now: DateTime<Utc>) -> Result<ProofRecord, ProofError> {
        self.post_with_id(ProofId::generate(), proof_type, now).await
    }

    /// Register a freshly posted proof under a caller-chosen id.
    pub async fn post_with_id(
        &self,
        id: ProofId,
        proof_type: ProofType,
        now: DateTime<Utc>,
    ) -> Result<ProofRecord, ProofError> {
        let record = ProofRecord::new(id, proof_type, now);
        self.store.insert(record.clone()).await?;
        debug!(proof_id = %record.id, proof_type = %proof_type, "proof posted");
        Ok(record)
    }

    /// Queue a check: POSTED proofs move to LOOKING, live proofs get an
    /// immediate recheck.
    pub async fn enqueue(&self, id: &ProofId, now: DateTime<Utc>) -> Result<ProofRecord, ProofError> {
        self.update(id, Op::Event(ProofEvent::Enqueue, now)).await
    }

    /// Apply one check result reported by a worker.
    ///
    /// An unknown status code fails with [`ProofError::UnknownStatus`] before
    /// the store is touched.
    pub async fn record_check_result(
        &self,
        id: &ProofId,
        code: i32,
        observed_at: DateTime<Utc>,
    ) -> Result<ProofRecord, ProofError> {
        let (status, tier) = classify_status(code).inspect_err(|e| {
            error!(proof_id = %id, code, error = %e, "checker reported an unknown status code");
        })?;
        debug!(proof_id = %id, %status, %tier, "check result classified");
        self.update(id, Op::Check(status, observed_at)).await
    }

    pub async fn revoke(&self, id: &ProofId, at: DateTime<Utc>) -> Result<ProofRecord, ProofError> {
        self.update(id, Op::Event(ProofEvent::Revoke, at)).await
    }

    pub async fn supersede(
        &self,
        id: &ProofId,
        by: &ProofId,
        at: DateTime<Utc>,
    ) -> Result<ProofRecord, ProofError> {
        self.update(id, Op::Event(ProofEvent::Supersede { by: by.clone() }, at))
            .await
    }

    pub async fn delete(&self, id: &ProofId, at: DateTime<Utc>) -> Result<ProofRecord, ProofError> {
        self.update(id, Op::Event(ProofEvent::Delete, at)).await
    }

    /// CAS loop shared by every inbound operation. Ignored transitions return
    /// the current snapshot unchanged; a stale result for a live proof puts
    /// its pending check back, since the worker popped it before checking.
    async fn update(&self, id: &ProofId, op: Op) -> Result<ProofRecord, ProofError> {
        for attempt in 1..=self.max_cas_attempts {
            let current = self.store.load(id).await?;
            let transition = match &op {
                Op::Check(status, observed_at) => self.machine.apply_check(&current, *status, *observed_at),
                Op::Event(event, at) => self.machine.apply_event(&current, event.clone(), *at),
            };
            let (record, effect) = match transition {
                Transition::Ignored(reason) => {
                    if matches!(reason, IgnoreReason::Stale { .. })
                        && let Some(at) = current.next_check_at
                    {
                        self.queue.schedule(id, at, current.version).await;
                    }
                    return Ok(current);
                }
                Transition::Next { record, effect, .. } => (record, effect),
            };
            if self.store.compare_and_swap(&current, record.clone()).await? {
                self.carry_out(&record, effect).await;
                return Ok(record);
            }
            warn!(proof_id = %id, attempt, version = current.version, "lost update race, recomputing");
        }
        Err(ProofError::Contention {
            id: id.clone(),
            attempts: self.max_cas_attempts,
        })
    }

    async fn carry_out(&self, record: &ProofRecord, effect: Effect) {
        let id = &record.id;
        match effect {
            Effect::Schedule { at, reason } => {
                debug!(proof_id = %id, %at, ?reason, version = record.version, "check scheduled");
                self.queue.schedule(id, at, record.version).await;
            }
            Effect::Finalize => self.queue.cancel(id, record.version).await,
        }
    }
}
