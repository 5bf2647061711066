use std::collections::{HashMap, VecDeque};

use trailguard_core::MarketSnapshot;

/// Default number of scans retained per asset.
pub const DEFAULT_CAPACITY: usize = 60;

/// Bounded per-asset leaderboard history.
///
/// Each scan appends one snapshot per asset that appeared in it; assets that
/// drop off the board simply stop accumulating. Old snapshots are evicted
/// once the per-asset window exceeds its capacity.
#[derive(Debug, Clone)]
pub struct SnapshotHistory {
    windows: HashMap<String, VecDeque<MarketSnapshot>>,
    capacity: usize,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SnapshotHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity: capacity.max(2),
        }
    }

    /// Ingest one full scan of the leaderboard.
    pub fn record_scan(&mut self, scan: &[MarketSnapshot]) {
        for snapshot in scan {
            let window = self
                .windows
                .entry(snapshot.asset.clone())
                .or_insert_with(VecDeque::new);
            window.push_back(snapshot.clone());
            while window.len() > self.capacity {
                window.pop_front();
            }
        }
    }

    /// Most recent snapshots for `asset`, oldest first, at most `len`.
    pub fn window(&self, asset: &str, len: usize) -> Vec<MarketSnapshot> {
        match self.windows.get(asset) {
            Some(window) => {
                let skip = window.len().saturating_sub(len);
                window.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Number of scans `asset` has appeared in.
    pub fn appearances(&self, asset: &str) -> usize {
        self.windows.get(asset).map_or(0, VecDeque::len)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }
}
