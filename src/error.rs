use thiserror::Error;

use crate::proof::ProofId;

/// A check reported a status code missing from the status table.
///
/// This is a contract violation by the checker, not a proof failure: the
/// record is left untouched and the caller should treat it as a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown proof status code {code}")]
pub struct UnknownStatusError {
    pub code: i32,
}

#[derive(Debug, Error)]
pub enum ProofError {
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatusError),

    #[error("unknown proof type code {0}")]
    UnknownType(i32),

    #[error("unknown proof state code {0}")]
    UnknownState(i32),

    #[error("unrecognized name: {0}")]
    UnknownName(String),

    #[error("proof not found: {0}")]
    NotFound(ProofId),

    #[error("proof already exists: {0}")]
    AlreadyExists(ProofId),

    #[error("gave up updating proof {id} after {attempts} conflicting writes")]
    Contention { id: ProofId, attempts: u32 },
}
