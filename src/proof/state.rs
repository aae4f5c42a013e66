use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::classifier::Tier;
use super::record::{HistoryEntry, ProofEvent, ProofRecord};
use super::scheduler::{NextAttempt, RetryScheduler};
use super::types::{ProofState, ProofStatus};

/// Why a check is being scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleReason {
    /// First check of a newly queued proof, or a forced recheck.
    Check,
    /// Backoff retry after a soft or countable hard failure.
    Retry,
    /// Slow probe of a permanently failing proof.
    Reprobe,
    /// Routine re-verification of a valid proof.
    Recheck,
}

/// Instruction for the retry queue that accompanies a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Schedule {
        at: DateTime<Utc>,
        reason: ScheduleReason,
    },
    /// The proof reached a terminal state; drop it from the queue.
    Finalize,
}

/// Why a result or event was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The proof is in a terminal state.
    Terminal(ProofState),
    /// The observation predates the last applied check.
    Stale { last_checked_at: DateTime<Utc> },
}

/// The result of evaluating a check result or lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Replace the stored record with `record` and carry out `effect`.
    Next {
        record: ProofRecord,
        effect: Effect,
        /// Scheduler verdict for check results; `NoRetry` for events.
        decision: NextAttempt,
    },
    /// Leave the stored record untouched.
    Ignored(IgnoreReason),
}

impl Transition {
    pub fn record(&self) -> Option<&ProofRecord> {
        match self {
            Transition::Next { record, .. } => Some(record),
            Transition::Ignored(_) => None,
        }
    }
}

/// Drives a `ProofRecord` snapshot through the proof lifecycle.
///
/// Pure: it never touches the store or the queue, it only computes the next
/// snapshot plus the effect the caller has to carry out.
#[derive(Debug, Clone, Default)]
pub struct ProofStateMachine {
    scheduler: RetryScheduler,
}

impl ProofStateMachine {
    pub fn new(scheduler: RetryScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Compute the transition for one classified check result.
    ///
    /// - Terminal proofs and stale observations are ignored.
    /// - `Success` moves any live proof to `OK` and resets both counters.
    /// - Soft and countable hard failures land in `TEMP_FAILURE` with a backoff
    ///   retry, unless the hard budget is exhausted or the proof is already in
    ///   `PERM_FAILURE`, in which case it stays there on the slow schedule.
    /// - `FinalHard` escalates straight to `PERM_FAILURE`.
    /// - The `DELETED` status deletes the proof.
    pub fn apply_check(
        &self,
        record: &ProofRecord,
        status: ProofStatus,
        observed_at: DateTime<Utc>,
    ) -> Transition {
        let from = record.state;
        if from.is_terminal() {
            warn!(proof_id = %record.id, state = %from, %status, "discarding check result for terminal proof");
            return Transition::Ignored(IgnoreReason::Terminal(from));
        }
        if let Some(last_checked_at) = record.last_checked_at
            && observed_at < last_checked_at
        {
            warn!(proof_id = %record.id, %status, %observed_at, %last_checked_at, "discarding stale check result");
            return Transition::Ignored(IgnoreReason::Stale { last_checked_at });
        }

        let tier = status.tier();
        let mut next = record.clone();
        next.last_status = status;
        next.first_checked_at.get_or_insert(observed_at);
        next.last_checked_at = Some(observed_at);

        match tier {
            Tier::Success => {
                next.consecutive_soft_failures = 0;
                next.consecutive_hard_failures = 0;
            }
            Tier::RetryableSoft => {
                next.consecutive_soft_failures = next.consecutive_soft_failures.saturating_add(1);
            }
            Tier::CountableHard => {
                next.consecutive_soft_failures = 0;
                next.consecutive_hard_failures = next.consecutive_hard_failures.saturating_add(1);
            }
            Tier::FinalHard | Tier::LifecycleEvent => {}
        }

        let decision = self
            .scheduler
            .next_attempt(tier, next.retry_history(), &next.id, observed_at);

        let (to, effect) = match (tier, decision) {
            (Tier::Success, _) => (
                ProofState::Ok,
                Effect::Schedule {
                    at: self.scheduler.recheck_at(&next.id, observed_at),
                    reason: ScheduleReason::Recheck,
                },
            ),
            (Tier::LifecycleEvent, _) => (ProofState::Deleted, Effect::Finalize),
            (_, NextAttempt::Retry { at }) if from != ProofState::PermFailure => (
                ProofState::TempFailure,
                Effect::Schedule {
                    at,
                    reason: ScheduleReason::Retry,
                },
            ),
            _ => (
                ProofState::PermFailure,
                Effect::Schedule {
                    at: self
                        .scheduler
                        .reprobe_at(&next.id, next.retry_history(), observed_at),
                    reason: ScheduleReason::Reprobe,
                },
            ),
        };

        if to == ProofState::PermFailure && from != ProofState::PermFailure {
            info!(
                proof_id = %next.id,
                %status,
                %tier,
                hard_failures = next.consecutive_hard_failures,
                "proof escalated to PERM_FAILURE"
            );
        } else if to == ProofState::Deleted {
            info!(proof_id = %next.id, "proof reported deleted by remote");
        }

        next.state = to;
        self.finish(next, from, Some(status), None, observed_at, effect, decision)
    }

    /// Compute the transition for an explicit lifecycle event.
    ///
    /// `Delete` always wins; `Revoke` and `Supersede` apply to every live
    /// proof; `Enqueue` moves a posted proof to `LOOKING`, or forces an
    /// immediate check of any other live proof without changing its state.
    pub fn apply_event(
        &self,
        record: &ProofRecord,
        event: ProofEvent,
        at: DateTime<Utc>,
    ) -> Transition {
        let from = record.state;
        let terminal_block = match &event {
            ProofEvent::Delete => from == ProofState::Deleted,
            _ => from.is_terminal(),
        };
        if terminal_block {
            warn!(proof_id = %record.id, state = %from, %event, "ignoring lifecycle event for terminal proof");
            return Transition::Ignored(IgnoreReason::Terminal(from));
        }

        let mut next = record.clone();
        let effect = match &event {
            ProofEvent::Enqueue => {
                if matches!(from, ProofState::Posted | ProofState::None) {
                    next.state = ProofState::Looking;
                }
                Effect::Schedule {
                    at,
                    reason: ScheduleReason::Check,
                }
            }
            ProofEvent::Revoke => {
                next.state = ProofState::Revoked;
                Effect::Finalize
            }
            ProofEvent::Supersede { by } => {
                next.state = ProofState::Superseded;
                next.superseded_by = Some(by.clone());
                Effect::Finalize
            }
            ProofEvent::Delete => {
                next.state = ProofState::Deleted;
                Effect::Finalize
            }
        };

        if next.state.is_terminal() {
            info!(proof_id = %next.id, from = %from, to = %next.state, "proof finalized");
        }
        self.finish(next, from, None, Some(event), at, effect, NextAttempt::NoRetry)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        mut next: ProofRecord,
        from: ProofState,
        status: Option<ProofStatus>,
        event: Option<ProofEvent>,
        at: DateTime<Utc>,
        effect: Effect,
        decision: NextAttempt,
    ) -> Transition {
        next.next_check_at = match effect {
            Effect::Schedule { at, .. } => Some(at),
            Effect::Finalize => None,
        };
        next.version += 1;
        next.push_history(HistoryEntry {
            at,
            status,
            event,
            from,
            to: next.state,
        });
        debug!(proof_id = %next.id, %from, to = %next.state, version = next.version, "transition computed");
        Transition::Next {
            record: next,
            effect,
            decision,
        }
    }
}
