use chrono::{DateTime, Duration, Utc};

use super::classifier::Tier;
use super::record::{ProofId, RetryHistory};

/// Backoff and escalation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// First delay after a soft failure.
    pub soft_base: Duration,
    /// Upper bound for any exponential delay.
    pub max_delay: Duration,
    /// First delay after a countable hard failure.
    pub hard_base: Duration,
    /// Consecutive hard failures that exhaust the retry budget.
    pub hard_failure_threshold: u32,
    /// Slow re-probe interval for PERM_FAILURE proofs.
    pub perm_failure_reprobe: Duration,
    /// Routine re-verification interval for OK proofs.
    pub ok_recheck: Duration,
    /// Maximum jitter as a fraction of the delay, in `[0, 1)`.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            soft_base: Duration::minutes(1),
            max_delay: Duration::hours(6),
            hard_base: Duration::minutes(5),
            hard_failure_threshold: 5,
            perm_failure_reprobe: Duration::days(1),
            ok_recheck: Duration::days(1),
            jitter_ratio: 0.25,
        }
    }
}

/// What the scheduler wants to happen after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAttempt {
    /// Check again at `at`.
    Retry { at: DateTime<Utc> },
    /// The hard-failure budget is spent; escalate instead of retrying.
    Exhausted,
    /// Nothing to retry for this tier.
    NoRetry,
}

// Domain separators so the soft, hard and slow schedules of one proof draw
// unrelated jitter.
const SALT_SOFT: u8 = 1;
const SALT_HARD: u8 = 2;
const SALT_REPROBE: u8 = 3;
const SALT_RECHECK: u8 = 4;

/// `now + delay`, saturating at the end of representable time.
fn later(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Pure backoff calculator. Holds no mutable state, so it can be shared
/// freely between workers.
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decides the next attempt for a check that landed in `tier`.
    ///
    /// `history` must already count the current failure: `n` soft failures in a
    /// row wait `soft_base * 2^(n-1)`, and the `n`-th hard failure in a row is
    /// reported [`NextAttempt::Exhausted`] once `n` reaches the threshold.
    pub fn next_attempt(
        &self,
        tier: Tier,
        history: RetryHistory,
        id: &ProofId,
        now: DateTime<Utc>,
    ) -> NextAttempt {
        match tier {
            Tier::Success | Tier::FinalHard | Tier::LifecycleEvent => NextAttempt::NoRetry,
            Tier::RetryableSoft => {
                let n = history.consecutive_soft_failures.max(1);
                let delay = self.backoff(self.policy.soft_base, n);
                NextAttempt::Retry {
                    at: later(now, delay + self.jitter(id, SALT_SOFT, n, delay)),
                }
            }
            Tier::CountableHard => {
                let n = history.consecutive_hard_failures.max(1);
                if n >= self.policy.hard_failure_threshold {
                    return NextAttempt::Exhausted;
                }
                let delay = self.backoff(self.policy.hard_base, n);
                NextAttempt::Retry {
                    at: later(now, delay + self.jitter(id, SALT_HARD, n, delay)),
                }
            }
        }
    }

    /// Next slow probe for a permanently failing proof.
    pub fn reprobe_at(&self, id: &ProofId, history: RetryHistory, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.policy.perm_failure_reprobe;
        let round = history
            .consecutive_hard_failures
            .saturating_add(history.consecutive_soft_failures);
        later(now, delay + self.jitter(id, SALT_REPROBE, round, delay))
    }

    /// Next routine re-verification for a proof that is currently OK.
    pub fn recheck_at(&self, id: &ProofId, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.policy.ok_recheck;
        later(now, delay + self.jitter(id, SALT_RECHECK, 0, delay))
    }

    /// `base * 2^(n-1)`, capped at `max_delay`.
    fn backoff(&self, base: Duration, n: u32) -> Duration {
        let factor = 1i64.checked_shl(n.saturating_sub(1)).filter(|f| *f > 0);
        let base_ms = base.num_milliseconds();
        let cap_ms = self.policy.max_delay.num_milliseconds();
        let ms = factor
            .and_then(|f| base_ms.checked_mul(f))
            .map_or(cap_ms, |ms| ms.min(cap_ms));
        Duration::milliseconds(ms)
    }

    /// Deterministic per-proof jitter in `[0, jitter_ratio * delay)`.
    ///
    /// Derived from a hash of the proof id and the retry round rather than a
    /// shared RNG, so concurrent scheduling decisions never correlate.
    fn jitter(&self, id: &ProofId, salt: u8, round: u32, delay: Duration) -> Duration {
        let mut hasher = blake3::Hasher::new();
        hasher.update(id.as_str().as_bytes());
        hasher.update(&[salt]);
        hasher.update(&round.to_le_bytes());
        let hash = hasher.finalize();
        let mut word = [0u8; 8];
        word.copy_from_slice(&hash.as_bytes()[..8]);
        // 53 high bits give a uniform fraction in [0, 1).
        let unit = (u64::from_le_bytes(word) >> 11) as f64 / (1u64 << 53) as f64;
        let span = delay.num_milliseconds() as f64 * self.policy.jitter_ratio;
        Duration::milliseconds((span * unit) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryScheduler {
        RetryScheduler::new(RetryPolicy {
            jitter_ratio: 0.0,
            ..Default::default()
        })
    }

    fn soft(n: u32) -> RetryHistory {
        RetryHistory {
            consecutive_soft_failures: n,
            consecutive_hard_failures: 0,
        }
    }

    fn hard(n: u32) -> RetryHistory {
        RetryHistory {
            consecutive_soft_failures: 0,
            consecutive_hard_failures: n,
        }
    }

    fn delay_of(attempt: NextAttempt, now: DateTime<Utc>) -> Duration {
        match attempt {
            NextAttempt::Retry { at } => at - now,
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[test]
    fn soft_backoff_is_exponential_and_capped() {
        let s = no_jitter();
        let id = ProofId::from("p");
        let now = Utc::now();
        let delays: Vec<i64> = (1..=5)
            .map(|n| delay_of(s.next_attempt(Tier::RetryableSoft, soft(n), &id, now), now).num_seconds())
            .collect();
        assert_eq!(delays, vec![60, 120, 240, 480, 960]);

        let capped = s.next_attempt(Tier::RetryableSoft, soft(40), &id, now);
        assert_eq!(delay_of(capped, now), Duration::hours(6));
        let huge = s.next_attempt(Tier::RetryableSoft, soft(u32::MAX), &id, now);
        assert_eq!(delay_of(huge, now), Duration::hours(6));
    }

    #[test]
    fn soft_failures_never_exhaust() {
        let s = RetryScheduler::default();
        let id = ProofId::from("p");
        for n in [1, 10, 1000] {
            let next = s.next_attempt(Tier::RetryableSoft, soft(n), &id, Utc::now());
            assert!(matches!(next, NextAttempt::Retry { .. }));
        }
    }

    #[test]
    fn hard_failures_exhaust_at_threshold() {
        let s = no_jitter();
        let id = ProofId::from("p");
        let now = Utc::now();
        for n in 1..5 {
            let next = s.next_attempt(Tier::CountableHard, hard(n), &id, now);
            assert!(matches!(next, NextAttempt::Retry { .. }), "n = {n}");
        }
        assert_eq!(s.next_attempt(Tier::CountableHard, hard(5), &id, now), NextAttempt::Exhausted);
        assert_eq!(s.next_attempt(Tier::CountableHard, hard(6), &id, now), NextAttempt::Exhausted);

        let first = s.next_attempt(Tier::CountableHard, hard(1), &id, now);
        assert_eq!(delay_of(first, now), Duration::minutes(5));
    }

    #[test]
    fn terminal_tiers_never_retry() {
        let s = RetryScheduler::default();
        let id = ProofId::from("p");
        for tier in [Tier::Success, Tier::FinalHard, Tier::LifecycleEvent] {
            assert_eq!(s.next_attempt(tier, hard(1), &id, Utc::now()), NextAttempt::NoRetry);
        }
    }

    #[test]
    fn jitter_is_bounded_and_per_proof() {
        let s = RetryScheduler::default();
        let now = Utc::now();
        let a = delay_of(s.next_attempt(Tier::RetryableSoft, soft(1), &ProofId::from("a"), now), now);
        let a_again = delay_of(s.next_attempt(Tier::RetryableSoft, soft(1), &ProofId::from("a"), now), now);
        assert_eq!(a, a_again);

        let mut distinct = std::collections::HashSet::new();
        for i in 0..50 {
            let id = ProofId::from(format!("proof-{i}"));
            let d = delay_of(s.next_attempt(Tier::RetryableSoft, soft(1), &id, now), now);
            assert!(d >= Duration::seconds(60));
            assert!(d < Duration::seconds(75));
            distinct.insert(d.num_milliseconds());
        }
        assert!(distinct.len() > 1);
    }

    #[test]
    fn slow_schedules_use_fixed_intervals() {
        let s = no_jitter();
        let id = ProofId::from("p");
        let now = Utc::now();
        assert_eq!(s.reprobe_at(&id, hard(9), now) - now, Duration::days(1));
        assert_eq!(s.recheck_at(&id, now) - now, Duration::days(1));
    }

    #[test]
    fn schedules_saturate_at_the_end_of_time() {
        let scheduler = RetryScheduler::default();
        let id = ProofId::from("p");
        let now = DateTime::<Utc>::MAX_UTC - Duration::seconds(1);
        let history = RetryHistory {
            consecutive_soft_failures: 1,
            consecutive_hard_failures: 1,
        };
        let max = DateTime::<Utc>::MAX_UTC;
        assert_eq!(
            scheduler.next_attempt(Tier::RetryableSoft, history, &id, now),
            NextAttempt::Retry { at: max }
        );
        assert_eq!(
            scheduler.next_attempt(Tier::CountableHard, history, &id, now),
            NextAttempt::Retry { at: max }
        );
        assert_eq!(scheduler.reprobe_at(&id, history, now), max);
        assert_eq!(scheduler.recheck_at(&id, now), max);
    }
}
