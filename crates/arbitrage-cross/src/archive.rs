//! Bounded in-memory history of store snapshots for charting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spreadwatch_core::{ExchangeId, PairId, Quote};
use std::collections::{BTreeMap, VecDeque};

/// Entries dropped at once when the archive is full.
pub const EVICTION_BATCH: usize = 10;

/// Every held quote at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: DateTime<Utc>,
    pub pairs: BTreeMap<PairId, BTreeMap<ExchangeId, Quote>>,
}

/// One pair's quotes at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub time: DateTime<Utc>,
    pub values: BTreeMap<ExchangeId, Quote>,
}

/// Ring of snapshots, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    entries: VecDeque<Snapshot>,
    capacity: usize,
    enabled: bool,
}

impl SnapshotArchive {
    /// Creates an enabled archive holding at most `capacity` snapshots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            enabled: true,
        }
    }

    /// Evicts a batch of the oldest entries when full, then appends
    /// `snapshot` if archiving is enabled.
    ///
    /// Eviction runs even while disabled.
    pub fn record(&mut self, snapshot: Snapshot) {
        if self.entries.len() >= self.capacity {
            let drop = EVICTION_BATCH.min(self.entries.len());
            self.entries.drain(..drop);
        }
        if self.enabled {
            self.entries.push_back(snapshot);
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drops everything except the most recent snapshot.
    pub fn clear(&mut self) {
        let last = self.entries.pop_back();
        self.entries.clear();
        self.entries.extend(last);
    }

    #[must_use]
    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Per-pair time series. Every requested pair gets an entry, empty if it
    /// was never archived.
    #[must_use]
    pub fn chart_series(&self, pairs: &[PairId]) -> BTreeMap<PairId, Vec<ChartPoint>> {
        let mut series: BTreeMap<PairId, Vec<ChartPoint>> =
            pairs.iter().map(|pair| (pair.clone(), Vec::new())).collect();

        for snapshot in &self.entries {
            for (pair, points) in &mut series {
                if let Some(values) = snapshot.pairs.get(pair) {
                    points.push(ChartPoint {
                        time: snapshot.time,
                        values: values.clone(),
                    });
                }
            }
        }
        series
    }
}
