//! Keyed position/risk-state store with non-blocking per-key leases.
//!
//! The lease is the system's only per-position coordination primitive: any job
//! that wants to mutate a position must `lease()` it first, and a held lease
//! means the caller skips this cycle rather than waiting. Records are retired
//! in place on close, never deleted, so the audit trail stays intact.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::types::{Phase, Position, RiskState};

/// Identity of a protected position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub strategy_id: String,
    pub asset: String,
}

impl PositionKey {
    #[must_use]
    pub fn new(strategy_id: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            asset: asset.into(),
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.strategy_id, self.asset)
    }
}

/// A position together with its risk state. One record per key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub key: PositionKey,
    pub position: Position,
    pub risk: RiskState,
}

/// Exclusive mutation rights on one record. Dropping the guard releases the
/// lease; at most one exists per key at any instant.
pub type PositionLease = OwnedMutexGuard<PositionRecord>;

/// In-process store of all known positions, open and retired.
#[derive(Debug, Default)]
pub struct RiskStateStore {
    records: RwLock<HashMap<PositionKey, Arc<Mutex<PositionRecord>>>>,
}

impl RiskStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for a key. Replacing enforces the
    /// one-active-state-per-position invariant when reconciliation reseeds.
    pub async fn insert(&self, record: PositionRecord) {
        let key = record.key.clone();
        self.records
            .write()
            .await
            .insert(key, Arc::new(Mutex::new(record)));
    }

    /// Attempts to acquire the mutation lease for a key.
    ///
    /// Returns `None` when the key is unknown or another job holds the lease.
    /// Never blocks.
    pub async fn lease(&self, key: &PositionKey) -> Option<PositionLease> {
        let cell = self.records.read().await.get(key).cloned()?;
        cell.try_lock_owned().ok()
    }

    /// All keys currently in the store, including retired records.
    pub async fn keys(&self) -> Vec<PositionKey> {
        self.records.read().await.keys().cloned().collect()
    }

    /// Read-only snapshot of every record whose lease is free.
    ///
    /// Leased records are skipped rather than waited for, so a slow mutator
    /// can never stall a reader.
    pub async fn snapshot(&self) -> Vec<PositionRecord> {
        let cells: Vec<Arc<Mutex<PositionRecord>>> =
            self.records.read().await.values().cloned().collect();
        cells
            .iter()
            .filter_map(|cell| cell.try_lock().ok().map(|guard| guard.clone()))
            .collect()
    }

    /// Count of records whose risk state is active.
    pub async fn active_count(&self) -> usize {
        self.snapshot()
            .await
            .iter()
            .filter(|r| r.risk.active)
            .count()
    }

    /// Whether a key holds an active (non-retired) record.
    pub async fn is_active(&self, key: &PositionKey) -> bool {
        let Some(cell) = self.records.read().await.get(key).cloned() else {
            return false;
        };
        cell.try_lock().map(|g| g.risk.active).unwrap_or(true)
    }
}

/// Marks a leased record closed in place: phase retired, flags cleared.
pub fn retire(record: &mut PositionRecord) {
    record.risk.phase = Phase::Closed;
    record.risk.active = false;
    record.risk.pending_close = false;
    record.risk.pending_reason = None;
}
