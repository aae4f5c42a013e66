mod cli;
mod ui;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use clap::Parser;

use cli::{Cli, Command};
use proofcheck::proof::{ProofId, ProofStatus, ProofType, classify_status};
use proofcheck::queue::{InMemoryRetryQueue, RetryQueue};
use proofcheck::store::{InMemoryProofStore, ProofRecordStore};
use proofcheck::worker::{CheckScript, CheckWorker, ScriptedChecker, WorkerReport};
use proofcheck::{ProofCheckConfig, ProofEngine, ProofError, logging};
use ui::{Reporter, RunProgress};

type MemoryEngine = ProofEngine<InMemoryProofStore, InMemoryRetryQueue>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => ProofCheckConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ProofCheckConfig::load()?,
    };
    let reporter = Reporter::default();

    match cli.command {
        Command::Classify { status } => {
            let (status, _) = classify_status(parse_code(&status)?)?;
            reporter.classification(status);
        }
        Command::Codes => reporter.code_table(),
        Command::Simulate {
            proof_type,
            statuses,
        } => simulate(&config, &reporter, &proof_type, &statuses).await?,
        Command::Run { script, max_rounds } => {
            run_script(&config, &reporter, &script, max_rounds).await?
        }
    }
    Ok(())
}

/// Accepts a status name or a raw numeric code. Numbers are passed through
/// unchecked so unknown codes can be exercised.
fn parse_code(raw: &str) -> Result<i32> {
    if let Ok(code) = raw.trim().parse::<i32>() {
        return Ok(code);
    }
    ProofStatus::from_name(&raw.trim().to_ascii_uppercase())
        .map(ProofStatus::code)
        .ok_or_else(|| anyhow!("unknown status name: {raw}"))
}

async fn simulate(
    config: &ProofCheckConfig,
    reporter: &Reporter,
    proof_type: &str,
    statuses: &[String],
) -> Result<()> {
    let proof_type: ProofType = proof_type.parse()?;
    let codes = statuses
        .iter()
        .map(|s| parse_code(s))
        .collect::<Result<Vec<_>>>()?;

    let engine: MemoryEngine =
        ProofEngine::from_config(InMemoryProofStore::new(), InMemoryRetryQueue::new(), config);
    let mut clock = Utc::now();
    let posted = engine.post(proof_type, clock).await?;
    let queued = engine.enqueue(&posted.id, clock).await?;
    println!(
        "proof {} ({}) {} → {}",
        posted.id, proof_type, posted.state, queued.state
    );

    for code in codes {
        let before = engine.store().load(&posted.id).await?;
        clock = before.next_check_at.unwrap_or(clock);
        match engine.record_check_result(&posted.id, code, clock).await {
            Ok(after) => {
                let status = ProofStatus::from_code(code)?;
                reporter.transition(status, &before, &after);
            }
            Err(ProofError::UnknownStatus(_)) => reporter.unknown_status(code, before.state),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

async fn run_script(
    config: &ProofCheckConfig,
    reporter: &Reporter,
    path: &Path,
    max_rounds: usize,
) -> Result<()> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let script: CheckScript = serde_json::from_str(&contents)?;

    let engine: Arc<MemoryEngine> = Arc::new(ProofEngine::from_config(
        InMemoryProofStore::new(),
        InMemoryRetryQueue::new(),
        config,
    ));
    let checker = Arc::new(ScriptedChecker::new());
    let now = Utc::now();
    for proof in &script.proofs {
        let id = proof
            .id
            .clone()
            .map(ProofId::from)
            .unwrap_or_else(ProofId::generate);
        engine
            .post_with_id(id.clone(), proof.proof_type.parse()?, now)
            .await?;
        engine.enqueue(&id, now).await?;
        checker.set_script(id, proof.codes()?).await;
    }

    let worker = CheckWorker::new(Arc::clone(&engine), Arc::clone(&checker))
        .with_batch_size(config.batch_size)
        .with_poll_interval(config.poll_interval());
    let progress = RunProgress::start(script.proofs.len());
    let mut total = WorkerReport::default();
    let mut rounds = 0;

    // Simulated clock: jump straight to the next due check instead of sleeping.
    while rounds < max_rounds && !checker.is_exhausted().await {
        let Some(due) = engine.queue().next_due().await else {
            break;
        };
        let report = worker.run_due(due).await;
        rounds += 1;
        total.checked += report.checked;
        total.skipped += report.skipped;
        total.errors += report.errors;
        progress.round(rounds, &report);
    }
    progress.finish(rounds, &total);

    reporter.summary(&engine.store().snapshot().await);
    Ok(())
}
