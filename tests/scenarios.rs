//! End-to-end lifecycle scenarios through the engine and in-memory store.

use chrono::{DateTime, Duration, Utc};
use proofcheck::proof::{
    ProofId, ProofRecord, ProofState, ProofStateMachine, ProofStatus, ProofType, RetryPolicy,
    RetryScheduler,
};
use proofcheck::queue::{InMemoryRetryQueue, RetryQueue};
use proofcheck::store::{InMemoryProofStore, ProofRecordStore};
use proofcheck::{ProofCheckConfig, ProofEngine, ProofError, UnknownStatusError};

type Engine = ProofEngine<InMemoryProofStore, InMemoryRetryQueue>;

const THRESHOLD: u32 = 4;

fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

fn engine() -> Engine {
    let config = ProofCheckConfig {
        hard_failure_threshold: THRESHOLD,
        ..Default::default()
    };
    ProofEngine::from_config(InMemoryProofStore::new(), InMemoryRetryQueue::new(), &config)
}

async fn new_proof(engine: &Engine, proof_type: ProofType) -> ProofId {
    let record = engine.post(proof_type, t(0)).await.unwrap();
    assert_eq!(record.state, ProofState::Posted);
    let record = engine.enqueue(&record.id, t(0)).await.unwrap();
    assert_eq!(record.state, ProofState::Looking);
    record.id
}

async fn feed(engine: &Engine, id: &ProofId, status: ProofStatus, at: DateTime<Utc>) -> ProofRecord {
    engine.record_check_result(id, status.code(), at).await.unwrap()
}

#[tokio::test]
async fn github_proof_goes_looking_to_ok() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::Github).await;

    let record = feed(&engine, &id, ProofStatus::Ok, t(1)).await;
    assert_eq!(record.state, ProofState::Ok);
    assert_eq!(record.proof_type, ProofType::Github);
    assert_eq!(record.first_checked_at, Some(t(1)));
    assert_eq!(record.consecutive_hard_failures, 0);
}

#[tokio::test]
async fn soft_failures_back_off_with_growing_gaps() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::Twitter).await;

    let mut at = t(1);
    let mut gaps = Vec::new();
    for status in [ProofStatus::Http429, ProofStatus::Http429, ProofStatus::Http500] {
        let record = feed(&engine, &id, status, at).await;
        assert_eq!(record.state, ProofState::TempFailure);
        let next = record.next_check_at.expect("retry scheduled");
        assert_eq!(engine.queue().scheduled_at(&id).await, Some(next));
        gaps.push(next - at);
        at = next;
    }
    assert!(gaps.windows(2).all(|w| w[0] < w[1]), "gaps {gaps:?}");
}

#[tokio::test]
async fn repeated_not_found_escalates_at_threshold() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::Reddit).await;
    let scheduler = engine.machine().scheduler();

    let mut at = t(1);
    for n in 1..=THRESHOLD {
        let before = engine.store().load(&id).await.unwrap();
        let record = feed(&engine, &id, ProofStatus::NotFound, at).await;
        let decision = scheduler.next_attempt(
            ProofStatus::NotFound.tier(),
            record.retry_history(),
            &id,
            at,
        );
        if n < THRESHOLD {
            assert_eq!(record.state, ProofState::TempFailure, "call {n}");
        } else {
            assert_eq!(before.state, ProofState::TempFailure);
            assert_eq!(record.state, ProofState::PermFailure);
            assert_eq!(decision, proofcheck::proof::NextAttempt::Exhausted);
        }
        at = record.next_check_at.unwrap();
    }
}

#[tokio::test]
async fn deleted_is_immediate_and_irreversible() {
    for setup in [
        vec![],
        vec![ProofStatus::Ok],
        vec![ProofStatus::Timeout],
        vec![ProofStatus::BadSignature],
    ] {
        let engine = engine();
        let id = new_proof(&engine, ProofType::Dns).await;
        let mut at = t(1);
        for status in setup {
            feed(&engine, &id, status, at).await;
            at += Duration::seconds(1);
        }

        let record = feed(&engine, &id, ProofStatus::Deleted, at).await;
        assert_eq!(record.state, ProofState::Deleted);
        assert!(engine.queue().is_empty().await);

        let later = feed(&engine, &id, ProofStatus::Ok, at + Duration::hours(1)).await;
        assert_eq!(later.state, ProofState::Deleted);
        assert_eq!(later.version, record.version);
    }
}

#[tokio::test]
async fn unknown_status_code_is_reported_and_ignored() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::Pgp).await;
    feed(&engine, &id, ProofStatus::Ok, t(1)).await;
    let before = engine.store().load(&id).await.unwrap();

    let err = engine.record_check_result(&id, 999, t(2)).await.unwrap_err();
    assert!(matches!(err, ProofError::UnknownStatus(UnknownStatusError { code: 999 })));
    let after = engine.store().load(&id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.state, ProofState::Ok);
}

#[tokio::test]
async fn valid_proof_can_go_stale_and_recover() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::GenericWebSite).await;

    assert_eq!(feed(&engine, &id, ProofStatus::Ok, t(1)).await.state, ProofState::Ok);
    let broken = feed(&engine, &id, ProofStatus::ServiceDead, t(2)).await;
    assert_eq!(broken.state, ProofState::PermFailure);
    assert_eq!(broken.next_check_at.map(|at| at >= t(2) + Duration::days(1)), Some(true));

    let fixed = feed(&engine, &id, ProofStatus::Ok, t(3)).await;
    assert_eq!(fixed.state, ProofState::Ok);
}

#[tokio::test]
async fn revoke_and_supersede_stop_all_checks() {
    let engine = engine();
    let old = new_proof(&engine, ProofType::Hackernews).await;
    let replacement = new_proof(&engine, ProofType::Hackernews).await;

    let record = engine.supersede(&old, &replacement, t(1)).await.unwrap();
    assert_eq!(record.state, ProofState::Superseded);
    assert_eq!(engine.queue().scheduled_at(&old).await, None);

    let record = engine.revoke(&replacement, t(2)).await.unwrap();
    assert_eq!(record.state, ProofState::Revoked);

    for id in [&old, &replacement] {
        let before = engine.store().load(id).await.unwrap();
        let after = feed(&engine, id, ProofStatus::NotFound, t(3)).await;
        assert_eq!(after, before);
    }
    assert!(engine.queue().is_empty().await);
    assert_eq!(engine.queue().next_due().await, None);
}

#[tokio::test]
async fn explicit_delete_after_revoke() {
    let engine = engine();
    let id = new_proof(&engine, ProofType::Facebook).await;
    engine.revoke(&id, t(1)).await.unwrap();
    let record = engine.delete(&id, t(2)).await.unwrap();
    assert_eq!(record.state, ProofState::Deleted);
    let history: Vec<_> = record.history.iter().map(|h| h.to).collect();
    assert_eq!(
        history,
        vec![ProofState::Looking, ProofState::Revoked, ProofState::Deleted]
    );
}

#[tokio::test]
async fn concurrent_results_serialize_through_cas() {
    let engine = std::sync::Arc::new(engine());
    let id = new_proof(&engine, ProofType::Coinbase).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = std::sync::Arc::clone(&engine);
        let id = id.clone();
        let status = if i % 2 == 0 { ProofStatus::Timeout } else { ProofStatus::HostUnreachable };
        handles.push(tokio::spawn(async move {
            engine.record_check_result(&id, status.code(), t(1)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = engine.store().load(&id).await.unwrap();
    assert_eq!(record.state, ProofState::TempFailure);
    assert_eq!(record.consecutive_soft_failures, 16);
    // enqueue + sixteen applied results
    assert_eq!(record.version, 17);
}

#[test]
fn scheduler_with_default_policy_is_usable_standalone() {
    let machine = ProofStateMachine::new(RetryScheduler::new(RetryPolicy::default()));
    let record = ProofRecord::new(ProofId::from("x"), ProofType::Keybase, t(0));
    let transition = machine.apply_check(&record, ProofStatus::Found, t(1));
    assert_eq!(transition.record().map(|r| r.state), Some(ProofState::Ok));
}
