use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::ProofStatus;
use crate::error::{ProofError, UnknownStatusError};

/// Severity bucket for a raw check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// The statement was found and matched.
    Success,
    /// Network or infrastructure failure; retried indefinitely.
    RetryableSoft,
    /// Content mismatch; retried up to the escalation threshold.
    CountableHard,
    /// The proof or the service integration is broken; never retried.
    FinalHard,
    /// Forces a terminal lifecycle state regardless of history.
    LifecycleEvent,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Success,
        Tier::RetryableSoft,
        Tier::CountableHard,
        Tier::FinalHard,
        Tier::LifecycleEvent,
    ];
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Tier::Success => "Success",
            Tier::RetryableSoft => "RetryableSoft",
            Tier::CountableHard => "CountableHard",
            Tier::FinalHard => "FinalHard",
            Tier::LifecycleEvent => "LifecycleEvent",
        })
    }
}

/// Maps a raw status code onto its tier.
///
/// Looks the code up in the status table; codes outside the table fail with
/// [`UnknownStatusError`] instead of falling back to a default tier.
pub fn classify(code: i32) -> Result<(ProofStatus, Tier), UnknownStatusError> {
    match ProofStatus::from_code(code) {
        Ok(status) => Ok((status, status.tier())),
        Err(_) => Err(UnknownStatusError { code }),
    }
}

/// Same as [`classify`], lifted into the crate error.
pub fn classify_status(code: i32) -> Result<(ProofStatus, Tier), ProofError> {
    classify(code).map_err(ProofError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_status_has_one_stable_tier() {
        for status in ProofStatus::ALL {
            let (decoded, first) = classify(status.code()).unwrap();
            let (_, second) = classify(status.code()).unwrap();
            assert_eq!(decoded, *status);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn tiers_follow_code_ranges() {
        for status in ProofStatus::ALL {
            let code = status.code();
            let expected = match code {
                0 => Tier::RetryableSoft,
                1..=3 => Tier::Success,
                100..=199 => Tier::RetryableSoft,
                200..=299 => Tier::CountableHard,
                301 => Tier::LifecycleEvent,
                _ => Tier::FinalHard,
            };
            assert_eq!(status.tier(), expected, "status {status} ({code})");
        }
    }

    #[test]
    fn representative_codes() {
        assert_eq!(classify(1).unwrap().1, Tier::Success);
        assert_eq!(classify(3).unwrap().1, Tier::Success);
        assert_eq!(classify(129).unwrap().1, Tier::RetryableSoft);
        assert_eq!(classify(160).unwrap().1, Tier::RetryableSoft);
        assert_eq!(classify(201).unwrap().1, Tier::CountableHard);
        assert_eq!(classify(240).unwrap().1, Tier::CountableHard);
        assert_eq!(classify(301).unwrap().1, Tier::LifecycleEvent);
        assert_eq!(classify(303).unwrap().1, Tier::FinalHard);
    }

    #[test]
    fn gaps_inside_ranges_are_unknown() {
        // 102 and 212 sit inside valid ranges but are not defined codes.
        for code in [102, 212, 300, 309, 999, -1] {
            assert_eq!(classify(code), Err(UnknownStatusError { code }));
        }
    }

    #[test]
    fn unknown_status_lifts_into_proof_error() {
        let err = classify_status(999).unwrap_err();
        assert!(matches!(err, ProofError::UnknownStatus(UnknownStatusError { code: 999 })));
        assert_eq!(err.to_string(), "unknown proof status code 999");
    }

    #[test]
    fn every_tier_is_reachable() {
        for tier in Tier::ALL {
            assert!(ProofStatus::ALL.iter().any(|s| s.tier() == tier), "{tier}");
        }
    }
}
