//! Command-line interface built on clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Inspect and simulate the proof verification lifecycle.
#[derive(Debug, Parser)]
#[command(name = "proofcheck", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the policy file (defaults to ./proofcheck.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the tier of a status code or name.
    Classify {
        /// Status name (e.g. HTTP_429) or numeric code.
        status: String,
    },

    /// List every status code with its tier.
    Codes,

    /// Feed a status sequence to a single proof and print each transition.
    Simulate {
        /// Proof type, by name or code.
        #[arg(long = "type", default_value = "github")]
        proof_type: String,

        /// Status names or codes, in order.
        #[arg(required = true)]
        statuses: Vec<String>,
    },

    /// Run a worker over a JSON script of proofs and checker responses.
    Run {
        /// Path to the script file.
        script: PathBuf,

        /// Upper bound on simulated polling rounds.
        #[arg(long, default_value_t = 100)]
        max_rounds: usize,
    },
}
