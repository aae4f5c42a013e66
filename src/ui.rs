//! Terminal output for the CLI: colored transitions and a progress spinner.
//!
//! Uses `console` for styling and `indicatif` for the spinner shown while a
//! scripted worker run drains the queue.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use proofcheck::proof::{ProofRecord, ProofState, ProofStatus, Tier};
use proofcheck::worker::WorkerReport;

/// Styled printer for lifecycle transitions.
pub struct Reporter {
    green: Style,
    red: Style,
    yellow: Style,
    dim: Style,
}

impl Default for Reporter {
    fn default() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
        }
    }
}

impl Reporter {
    fn state_style(&self, state: ProofState) -> &Style {
        match state {
            ProofState::Ok => &self.green,
            ProofState::PermFailure | ProofState::Deleted | ProofState::Revoked => &self.red,
            ProofState::TempFailure => &self.yellow,
            _ => &self.dim,
        }
    }

    fn tier_style(&self, tier: Tier) -> &Style {
        match tier {
            Tier::Success => &self.green,
            Tier::RetryableSoft => &self.yellow,
            Tier::CountableHard | Tier::FinalHard | Tier::LifecycleEvent => &self.red,
        }
    }

    /// One line per applied (or discarded) check result.
    pub fn transition(&self, status: ProofStatus, before: &ProofRecord, after: &ProofRecord) {
        let applied = after.version != before.version;
        let arrow = if applied { "→" } else { "↺" };
        let next = after
            .next_check_at
            .map(|at| format!("next check {}", at.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_else(|| "no further checks".to_string());
        println!(
            "  {:<18} {:<15} {} {} {:<13} {}",
            status.name(),
            self.tier_style(status.tier()).apply_to(status.tier()),
            self.state_style(before.state).apply_to(before.state),
            arrow,
            self.state_style(after.state).apply_to(after.state),
            self.dim.apply_to(format!(
                "hard={} soft={} {next}",
                after.consecutive_hard_failures, after.consecutive_soft_failures
            )),
        );
    }

    pub fn unknown_status(&self, code: i32, state: ProofState) {
        println!(
            "  {:<18} {} state stays {}",
            code,
            self.red.apply_to("unknown status code"),
            state
        );
    }

    pub fn classification(&self, status: ProofStatus) {
        println!(
            "{} ({}) → {}",
            status.name(),
            status.code(),
            self.tier_style(status.tier()).apply_to(status.tier())
        );
    }

    pub fn code_table(&self) {
        for status in ProofStatus::ALL {
            println!(
                "  {:>4}  {:<18} {}",
                status.code(),
                status.name(),
                self.tier_style(status.tier()).apply_to(status.tier())
            );
        }
    }

    /// Final state of each record after a worker run.
    pub fn summary(&self, records: &[ProofRecord]) {
        println!();
        println!("{}", self.dim.apply_to("─── Proofs ───"));
        for record in records {
            println!(
                "  {:<38} {:<17} {:<18} last={}",
                record.id,
                record.proof_type,
                self.state_style(record.state).apply_to(record.state),
                record.last_status
            );
        }
    }
}

/// Spinner shown while a worker drains the queue.
pub struct RunProgress {
    pb: ProgressBar,
}

impl RunProgress {
    pub fn start(total: usize) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("checking {total} proofs"));
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn round(&self, round: usize, report: &WorkerReport) {
        self.pb.set_message(format!(
            "round {round}: {} checked, {} skipped, {} errors",
            report.checked, report.skipped, report.errors
        ));
    }

    pub fn finish(&self, rounds: usize, total: &WorkerReport) {
        self.pb.finish_and_clear();
        println!(
            "  {} {rounds} rounds, {} checks, {} errors",
            Style::new().green().bold().apply_to("✓"),
            total.checked,
            total.errors
        );
    }
}
