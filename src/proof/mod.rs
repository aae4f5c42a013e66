mod classifier;
mod record;
mod scheduler;
mod state;
mod types;

pub use classifier::{Tier, classify, classify_status};
pub use record::{HISTORY_LIMIT, HistoryEntry, ProofEvent, ProofId, ProofRecord, RetryHistory};
pub use scheduler::{NextAttempt, RetryPolicy, RetryScheduler};
pub use state::{Effect, IgnoreReason, ProofStateMachine, ScheduleReason, Transition};
pub use types::{ProofState, ProofStatus, ProofType};
