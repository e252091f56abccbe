// Fleet run aggregate: device identity -> result, plus run start/end timestamps.

use super::BackupOutcome;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// What a device's procedure left behind.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceResult {
    Outcome(BackupOutcome),
    /// The procedure ended without producing an outcome (e.g. the task panicked).
    Crashed { error: String },
}

impl DeviceResult {
    pub fn outcome(&self) -> Option<&BackupOutcome> {
        match self {
            DeviceResult::Outcome(o) => Some(o),
            DeviceResult::Crashed { .. } => None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome().is_some_and(|o| o.backup_successful)
    }
}

/// Collects results while the run is in flight. Each device is inserted at most once.
#[derive(Debug)]
pub struct FleetRunBuilder {
    started_at: DateTime<Utc>,
    results: BTreeMap<String, DeviceResult>,
}

impl FleetRunBuilder {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns false (and keeps the first result) if `device` was already recorded.
    pub fn insert(&mut self, device: impl Into<String>, result: DeviceResult) -> bool {
        use std::collections::btree_map::Entry;
        match self.results.entry(device.into()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(result);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn finish(self) -> FleetRun {
        FleetRun {
            started_at: self.started_at,
            finished_at: Utc::now(),
            results: self.results,
        }
    }
}

/// Finalized aggregate handed to the snapshot committer once.
#[derive(Debug, Clone)]
pub struct FleetRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: BTreeMap<String, DeviceResult>,
}

impl FleetRun {
    pub fn begin() -> FleetRunBuilder {
        FleetRunBuilder {
            started_at: Utc::now(),
            results: BTreeMap::new(),
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Devices that produced a structured outcome, in identity order.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &BackupOutcome)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.outcome().map(|o| (name.as_str(), o)))
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
