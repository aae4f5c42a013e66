//! Worker side of the retry loop.
//!
//! A [`CheckWorker`] pops due proofs from the queue, runs one
//! [`ProofChecker`] attempt per proof and feeds the raw status code back into
//! the [`ProofEngine`]. Fetching and signature verification live behind the
//! checker trait.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::engine::ProofEngine;
use crate::error::ProofError;
use crate::proof::{ProofId, ProofRecord, ProofStatus};
use crate::queue::{DueCheck, RetryQueue};
use crate::store::ProofRecordStore;

/// One verification attempt against the remote service.
pub trait ProofChecker: Send + Sync {
    /// Returns the raw status code of the attempt.
    fn check(&self, record: &ProofRecord) -> impl Future<Output = i32> + Send;
}

/// Counters for one pass over the due queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub checked: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl WorkerReport {
    fn merge(&mut self, other: WorkerReport) {
        self.checked += other.checked;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

pub struct CheckWorker<S, Q, C> {
    engine: Arc<ProofEngine<S, Q>>,
    checker: Arc<C>,
    batch_size: usize,
    poll_interval: std::time::Duration,
}

impl<S, Q, C> CheckWorker<S, Q, C>
where
    S: ProofRecordStore + 'static,
    Q: RetryQueue + 'static,
    C: ProofChecker + 'static,
{
    pub fn new(engine: Arc<ProofEngine<S, Q>>, checker: Arc<C>) -> Self {
        Self {
            engine,
            checker,
            batch_size: 32,
            poll_interval: std::time::Duration::from_secs(1),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: std::time::Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Check every proof due at `now`, concurrently, and record the results
    /// as observed at `now`.
    pub async fn run_due(&self, now: DateTime<Utc>) -> WorkerReport {
        let mut report = WorkerReport::default();
        loop {
            let due = self.engine.queue().pop_due(now, self.batch_size).await;
            if due.is_empty() {
                return report;
            }
            let mut tasks = JoinSet::new();
            for entry in due {
                let engine = Arc::clone(&self.engine);
                let checker = Arc::clone(&self.checker);
                tasks.spawn(async move { check_one(&engine, checker.as_ref(), &entry, now).await });
            }
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(one) => report.merge(one),
                    Err(e) => {
                        error!(error = %e, "check task panicked");
                        report.errors += 1;
                    }
                }
            }
        }
    }

    /// Poll the queue until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerReport {
        let mut total = WorkerReport::default();
        info!(batch_size = self.batch_size, "check worker started");
        while !*shutdown.borrow() {
            total.merge(self.run_due(Utc::now()).await);
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!(checked = total.checked, errors = total.errors, "check worker stopped");
        total
    }
}

async fn check_one<S, Q, C>(
    engine: &ProofEngine<S, Q>,
    checker: &C,
    entry: &DueCheck,
    now: DateTime<Utc>,
) -> WorkerReport
where
    S: ProofRecordStore,
    Q: RetryQueue,
    C: ProofChecker,
{
    let id = &entry.id;
    let mut report = WorkerReport::default();
    let record = match engine.store().load(id).await {
        Ok(record) => record,
        Err(ProofError::NotFound(_)) => {
            debug!(proof_id = %id, "dropping due check for unknown proof");
            report.skipped += 1;
            return report;
        }
        Err(e) => {
            error!(proof_id = %id, error = %e, "could not load due proof");
            requeue(engine, id, now, entry.version).await;
            report.errors += 1;
            return report;
        }
    };
    if record.state.is_terminal() {
        debug!(proof_id = %id, state = %record.state, "skipping terminal proof");
        report.skipped += 1;
        return report;
    }

    let code = checker.check(&record).await;
    match engine.record_check_result(id, code, now).await {
        Ok(updated) => {
            debug!(proof_id = %id, code, state = %updated.state, "check recorded");
            report.checked += 1;
        }
        Err(ProofError::UnknownStatus(e)) => {
            error!(proof_id = %id, error = %e, "checker contract violation");
            requeue(engine, id, now, record.version).await;
            report.errors += 1;
        }
        Err(e) => {
            error!(proof_id = %id, error = %e, "could not record check result");
            requeue(engine, id, now, record.version).await;
            report.errors += 1;
        }
    }
    report
}

/// Puts a popped proof back one soft delay out after a failed attempt left
/// the record unchanged. Dropped by the queue if a newer snapshot has already
/// scheduled or finalized the proof.
async fn requeue<S, Q>(engine: &ProofEngine<S, Q>, id: &ProofId, now: DateTime<Utc>, version: u64)
where
    S: ProofRecordStore,
    Q: RetryQueue,
{
    let soft_base = engine.machine().scheduler().policy().soft_base;
    let retry_at = now.checked_add_signed(soft_base).unwrap_or(DateTime::<Utc>::MAX_UTC);
    debug!(proof_id = %id, %retry_at, version, "requeueing proof");
    engine.queue().schedule(id, retry_at, version).await;
}

/// Checker that replays a fixed status sequence per proof.
///
/// Once a proof's script runs out, its last status repeats. Used by the
/// `run` command and by tests.
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    scripts: Mutex<HashMap<ProofId, Script>>,
}

#[derive(Debug)]
struct Script {
    codes: Vec<i32>,
    next: usize,
}

impl ScriptedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_script(&self, id: ProofId, codes: Vec<i32>) {
        self.scripts.lock().await.insert(id, Script { codes, next: 0 });
    }

    /// Whether every script has been played at least once to the end.
    pub async fn is_exhausted(&self) -> bool {
        self.scripts
            .lock()
            .await
            .values()
            .all(|s| s.next >= s.codes.len())
    }
}

impl ProofChecker for ScriptedChecker {
    async fn check(&self, record: &ProofRecord) -> i32 {
        let mut scripts = self.scripts.lock().await;
        let Some(script) = scripts.get_mut(&record.id) else {
            return ProofStatus::None.code();
        };
        let index = script.next.min(script.codes.len().saturating_sub(1));
        script.next += 1;
        script.codes.get(index).copied().unwrap_or(ProofStatus::None.code())
    }
}

/// JSON script consumed by the `run` command.
#[derive(Debug, Deserialize)]
pub struct CheckScript {
    pub proofs: Vec<ScriptedProof>,
}

#[derive(Debug, Deserialize)]
pub struct ScriptedProof {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub proof_type: String,
    /// Status names or numeric codes, in the order the checker reports them.
    pub statuses: Vec<serde_json::Value>,
}

impl ScriptedProof {
    /// Resolve the script entries to raw codes. Unknown names are an error;
    /// unknown numbers are passed through so contract violations can be replayed.
    pub fn codes(&self) -> Result<Vec<i32>, ProofError> {
        self.statuses
            .iter()
            .map(|value| match value {
                serde_json::Value::Number(n) => n
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(|| ProofError::UnknownName(n.to_string())),
                serde_json::Value::String(s) => s.parse::<ProofStatus>().map(ProofStatus::code),
                other => Err(ProofError::UnknownName(other.to_string())),
            })
            .collect()
    }
}
