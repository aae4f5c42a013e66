//! Lifecycle state machine and retry engine for external identity proofs.
//!
//! A worker checks a proof, reports a raw status code, and the engine decides
//! what that means: the code is classified into a [`proof::Tier`], the
//! [`proof::ProofStateMachine`] computes the next lifecycle state, and the
//! [`proof::RetryScheduler`] picks when to look again. Records are updated
//! through an optimistic compare-and-swap against a [`store::ProofRecordStore`].

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod proof;
pub mod queue;
pub mod store;
pub mod worker;

pub use config::ProofCheckConfig;
pub use engine::ProofEngine;
pub use error::{ProofError, UnknownStatusError};
