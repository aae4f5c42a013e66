//! Persistence boundary for proof records.
//!
//! [`ProofRecordStore`] is what the engine needs from the identity store:
//! snapshot reads plus an atomic compare-and-swap keyed on the record's
//! `version`. [`InMemoryProofStore`] backs the CLI and the tests.

use std::collections::HashMap;
use std::future::Future;

use tokio::sync::RwLock;

use crate::error::ProofError;
use crate::proof::{ProofId, ProofRecord};

pub trait ProofRecordStore: Send + Sync {
    /// Store a new record. Fails if the id is already taken.
    fn insert(&self, record: ProofRecord) -> impl Future<Output = Result<(), ProofError>> + Send;

    /// Current snapshot of a record.
    fn load(&self, id: &ProofId) -> impl Future<Output = Result<ProofRecord, ProofError>> + Send;

    /// Replace `old` with `new` if nobody wrote in between.
    ///
    /// Returns `Ok(false)` when the stored version no longer matches
    /// `old.version`; the caller must reload and recompute.
    fn compare_and_swap(
        &self,
        old: &ProofRecord,
        new: ProofRecord,
    ) -> impl Future<Output = Result<bool, ProofError>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryProofStore {
    records: RwLock<HashMap<ProofId, ProofRecord>>,
}

impl InMemoryProofStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every record, ordered by id.
    pub async fn snapshot(&self) -> Vec<ProofRecord> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

impl ProofRecordStore for InMemoryProofStore {
    async fn insert(&self, record: ProofRecord) -> Result<(), ProofError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(ProofError::AlreadyExists(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn load(&self, id: &ProofId) -> Result<ProofRecord, ProofError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ProofError::NotFound(id.clone()))
    }

    async fn compare_and_swap(&self, old: &ProofRecord, new: ProofRecord) -> Result<bool, ProofError> {
        let mut records = self.records.write().await;
        let current = records
            .get_mut(&old.id)
            .ok_or_else(|| ProofError::NotFound(old.id.clone()))?;
        if current.version != old.version {
            return Ok(false);
        }
        *current = new;
        Ok(true)
    }
}
