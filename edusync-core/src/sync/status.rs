use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use super::SyncError;
use crate::models::EntityKind;
use crate::snapshot::DataSnapshot;

/// Observable state of the synchronizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncStatus {
    pub loading: bool,
    /// 0 to 100, non-decreasing within a pass.
    pub progress: u8,
    pub message: String,
    pub last_sync: Option<DateTime<Utc>>,
    /// Error of the most recent pass; cleared by the next successful one.
    pub error: Option<SyncError>,
    /// True until the first pass finishes, successfully or not.
    pub initial_load: bool,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            loading: false,
            progress: 0,
            message: String::new(),
            last_sync: None,
            error: None,
            initial_load: true,
        }
    }
}

/// Result of a successful sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub counts: BTreeMap<EntityKind, usize>,
    /// Rows per kind that could not be decoded and were left out.
    pub dropped: BTreeMap<EntityKind, usize>,
    /// Whether the snapshot was written to the local mirror.
    pub mirrored: bool,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub(crate) fn new(
        snapshot: &DataSnapshot,
        dropped: BTreeMap<EntityKind, usize>,
        mirrored: bool,
    ) -> Self {
        Self {
            counts: EntityKind::ALL
                .iter()
                .map(|kind| (*kind, snapshot.count(*kind)))
                .collect(),
            dropped: dropped.into_iter().filter(|(_, n)| *n > 0).collect(),
            mirrored,
            finished_at: Utc::now(),
        }
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn dropped(&self, kind: EntityKind) -> usize {
        self.dropped.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped.values().sum()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records ({} students, {} challans, {} attendance marks, {} results)",
            self.total(),
            self.count(EntityKind::Students),
            self.count(EntityKind::Fees),
            self.count(EntityKind::Attendance),
            self.count(EntityKind::Results),
        )?;
        if self.total_dropped() > 0 {
            write!(f, ", {} malformed rows skipped", self.total_dropped())?;
        }
        if self.mirrored {
            write!(f, ", mirrored locally")?;
        }
        Ok(())
    }
}
