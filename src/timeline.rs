use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{Field, MonitorError};

/// Pending applications attributed to one submission month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// Human label as published, e.g. "November 2023".
    pub month: String,
    pub count: u64,
    pub percentage: Option<f64>,
}

/// A count/percentage pair as it appears on the page, before it is pinned
/// to a calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompletedCount {
    pub count: u64,
    pub percentage: Option<f64>,
}

impl CompletedCount {
    pub fn on(self, date: NaiveDate) -> CompletedEntry {
        CompletedEntry {
            date,
            count: self.count,
            percentage: self.percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub date: NaiveDate,
    pub count: u64,
    pub percentage: Option<f64>,
}

impl CompletedEntry {
    /// The live counter right after an archive.
    pub fn zero(date: NaiveDate) -> Self {
        Self {
            date,
            count: 0,
            percentage: Some(0.0),
        }
    }
}

/// Result of one successful fetch + extract. Never patched in place; the
/// next successful cycle replaces it as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub pending_entries: Vec<PendingEntry>,
    /// `None` means the marker was not on the page, which is not the same
    /// as a published zero.
    pub today_completed: Option<CompletedCount>,
    pub fetched_at: DateTime<Local>,
}

impl Snapshot {
    pub fn missing_fields(&self) -> Vec<MonitorError> {
        let mut missing = vec![];
        if self.pending_entries.is_empty() {
            missing.push(MonitorError::FieldNotFound(Field::Pending));
        }
        if self.today_completed.is_none() {
            missing.push(MonitorError::FieldNotFound(Field::CompletedToday));
        }
        missing
    }
}
