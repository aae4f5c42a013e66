//! Policy configuration loaded from `proofcheck.toml`.
//!
//! [`ProofCheckConfig`] holds every tunable of the retry engine. Fields
//! missing from the file fall back to defaults, and
//! `PROOFCHECK_HARD_FAILURE_THRESHOLD` overrides the file.

use std::path::Path;

use anyhow::{Result, bail};
use chrono::Duration;
use serde::Deserialize;

use crate::proof::RetryPolicy;

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "proofcheck.toml";

/// Environment override for the escalation threshold.
pub const THRESHOLD_ENV: &str = "PROOFCHECK_HARD_FAILURE_THRESHOLD";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofCheckConfig {
    /// First retry delay after a soft failure, in seconds.
    #[serde(default = "default_soft_base_delay_secs")]
    pub soft_base_delay_secs: u64,

    /// Cap on exponential backoff, in seconds.
    #[serde(default = "default_soft_max_delay_secs")]
    pub soft_max_delay_secs: u64,

    /// First retry delay after a countable hard failure, in seconds.
    #[serde(default = "default_hard_base_delay_secs")]
    pub hard_base_delay_secs: u64,

    /// Consecutive hard failures before a proof escalates to PERM_FAILURE.
    #[serde(default = "default_hard_failure_threshold")]
    pub hard_failure_threshold: u32,

    /// Slow re-probe interval for PERM_FAILURE proofs, in seconds.
    #[serde(default = "default_perm_failure_reprobe_secs")]
    pub perm_failure_reprobe_secs: u64,

    /// Re-verification interval for OK proofs, in seconds.
    #[serde(default = "default_ok_recheck_secs")]
    pub ok_recheck_secs: u64,

    /// Jitter as a fraction of each delay.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,

    /// Compare-and-swap attempts before an update gives up.
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,

    /// How often an idle worker polls the queue, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Proofs a worker pulls from the queue per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_soft_base_delay_secs() -> u64 {
    60
}

fn default_soft_max_delay_secs() -> u64 {
    6 * 60 * 60
}

fn default_hard_base_delay_secs() -> u64 {
    5 * 60
}

fn default_hard_failure_threshold() -> u32 {
    5
}

fn default_perm_failure_reprobe_secs() -> u64 {
    24 * 60 * 60
}

fn default_ok_recheck_secs() -> u64 {
    24 * 60 * 60
}

fn default_jitter_ratio() -> f64 {
    0.25
}

fn default_max_cas_attempts() -> u32 {
    8
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    32
}

impl Default for ProofCheckConfig {
    fn default() -> Self {
        Self {
            soft_base_delay_secs: default_soft_base_delay_secs(),
            soft_max_delay_secs: default_soft_max_delay_secs(),
            hard_base_delay_secs: default_hard_base_delay_secs(),
            hard_failure_threshold: default_hard_failure_threshold(),
            perm_failure_reprobe_secs: default_perm_failure_reprobe_secs(),
            ok_recheck_secs: default_ok_recheck_secs(),
            jitter_ratio: default_jitter_ratio(),
            max_cas_attempts: default_max_cas_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
        }
    }
}

// Ten years; keeps every interval well inside chrono's range.
const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

impl ProofCheckConfig {
    /// Loads `proofcheck.toml` from the working directory, or defaults if it
    /// does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Loads the given file, or defaults if it does not exist. The
    /// environment override is applied either way.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<ProofCheckConfig>(&contents)?
        } else {
            Self::default()
        };

        if let Ok(raw) = std::env::var(THRESHOLD_ENV)
            && !raw.is_empty()
        {
            config.hard_failure_threshold = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{THRESHOLD_ENV}={raw:?}: {e}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hard_failure_threshold == 0 {
            bail!("hard_failure_threshold must be at least 1");
        }
        if !(0.0..1.0).contains(&self.jitter_ratio) {
            bail!("jitter_ratio must be in [0, 1), got {}", self.jitter_ratio);
        }
        if self.max_cas_attempts == 0 {
            bail!("max_cas_attempts must be at least 1");
        }
        if self.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        for (name, secs) in [
            ("soft_base_delay_secs", self.soft_base_delay_secs),
            ("soft_max_delay_secs", self.soft_max_delay_secs),
            ("hard_base_delay_secs", self.hard_base_delay_secs),
            ("perm_failure_reprobe_secs", self.perm_failure_reprobe_secs),
            ("ok_recheck_secs", self.ok_recheck_secs),
        ] {
            if secs == 0 || secs > MAX_INTERVAL_SECS {
                bail!("{name} must be between 1 and {MAX_INTERVAL_SECS}, got {secs}");
            }
        }
        if self.soft_max_delay_secs < self.soft_base_delay_secs {
            bail!("soft_max_delay_secs must not be below soft_base_delay_secs");
        }
        Ok(())
    }

    /// Scheduler policy derived from this config. Call after [`validate`](Self::validate).
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            soft_base: secs(self.soft_base_delay_secs),
            max_delay: secs(self.soft_max_delay_secs),
            hard_base: secs(self.hard_base_delay_secs),
            hard_failure_threshold: self.hard_failure_threshold,
            perm_failure_reprobe: secs(self.perm_failure_reprobe_secs),
            ok_recheck: secs(self.ok_recheck_secs),
            jitter_ratio: self.jitter_ratio,
        }
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_INTERVAL_SECS) as i64)
}
