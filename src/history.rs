//! Per-day ledger of "completed today" observations.
//!
//! The live counter for the current day sits in its own slot and only joins
//! the durable, capped list when [`HistoryStore::archive_today`] runs. The
//! whole thing is persisted as one versioned JSON record; a record written
//! under a different version is thrown away rather than migrated.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local, NaiveDate};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{error::MonitorError, timeline::CompletedEntry};

pub const DATA_VERSION: &str = "4.1";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedHistory {
    version: String,
    history: Vec<CompletedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    today_completed: Option<CompletedEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archived_on: Option<NaiveDate>,
    saved_at: DateTime<Local>,
}

/// Only the version tag, so a record from another schema can be recognised
/// without having to deserialize the rest of it.
#[derive(Debug, Deserialize)]
struct VersionTag {
    version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Archived,
    AlreadyArchived,
}

#[derive(Debug)]
pub struct HistoryStore {
    capacity: usize,
    entries: BTreeMap<NaiveDate, CompletedEntry>,
    today: Option<CompletedEntry>,
    archived_on: Option<NaiveDate>,
    path: Option<PathBuf>,
}

impl HistoryStore {
    /// A store that lives only in memory.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: BTreeMap::new(),
            today: None,
            archived_on: None,
            path: None,
        }
    }

    /// Load the record at `path`, or start empty if there is none, it is
    /// unreadable, or it was written under another schema version.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, MonitorError> {
        let path = path.into();
        let mut store = Self::new(capacity);

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!("no history at {}, starting empty", path.display());
                store.path = Some(path);
                return Ok(store);
            }
            Err(err) => {
                return Err(MonitorError::Storage(format!(
                    "reading {}: {err}",
                    path.display()
                )));
            }
        };

        match serde_json::from_str::<VersionTag>(&text) {
            Ok(tag) if tag.version == DATA_VERSION => {
                match serde_json::from_str::<PersistedHistory>(&text) {
                    Ok(record) => store.restore(record),
                    Err(err) => warn!("discarding unreadable history {}: {err}", path.display()),
                }
            }
            Ok(tag) => warn!(
                "discarding history {} written as version {} (expected {DATA_VERSION})",
                path.display(),
                tag.version
            ),
            Err(err) => warn!("discarding unreadable history {}: {err}", path.display()),
        }

        info!(
            "loaded {} day(s) of history from {}",
            store.entries.len(),
            path.display()
        );
        store.path = Some(path);
        Ok(store)
    }

    fn restore(&mut self, record: PersistedHistory) {
        for entry in record.history {
            self.insert(entry);
        }
        self.today = record.today_completed;
        self.archived_on = record.archived_on;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The live, still-accumulating value for the current day.
    pub fn today(&self) -> Option<&CompletedEntry> {
        self.today.as_ref()
    }

    pub fn archived_on(&self) -> Option<NaiveDate> {
        self.archived_on
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the live slot. Does not touch the archived days.
    pub fn upsert_today(&mut self, entry: CompletedEntry) -> Result<(), MonitorError> {
        self.today = Some(entry);
        self.save()
    }

    /// Move the live value into the archived list and reset the live counter
    /// to zero for `date`. A second call for the same `date` is a no-op, so
    /// the reset zero can never overwrite what was archived.
    pub fn archive_today(&mut self, date: NaiveDate) -> Result<ArchiveOutcome, MonitorError> {
        if self.archived_on == Some(date) {
            return Ok(ArchiveOutcome::AlreadyArchived);
        }
        // The slot keeps the day it was observed on. A slot still holding the
        // reset zero of an earlier archive means nothing was seen since.
        let entry = match self.today.take() {
            Some(entry) if Some(entry.date) != self.archived_on => entry,
            _ => CompletedEntry::zero(date),
        };
        self.insert(entry);
        self.today = Some(CompletedEntry::zero(date));
        self.archived_on = Some(date);
        self.save()?;
        Ok(ArchiveOutcome::Archived)
    }

    /// Up to `n` most recent archived days, oldest first.
    pub fn list_last(&self, n: usize) -> Vec<CompletedEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.values().skip(skip).cloned().collect()
    }

    /// Sum of every archived day, pinned at `u64::MAX`.
    pub fn get_total(&self) -> u64 {
        self.entries
            .values()
            .fold(0, |total, entry| total.saturating_add(entry.count))
    }

    fn insert(&mut self, entry: CompletedEntry) {
        self.entries.insert(entry.date, entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_first();
        }
    }

    pub fn save(&self) -> Result<(), MonitorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let record = PersistedHistory {
            version: DATA_VERSION.to_string(),
            history: self.entries.values().cloned().collect(),
            today_completed: self.today.clone(),
            archived_on: self.archived_on,
            saved_at: Local::now(),
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|err| MonitorError::Storage(err.to_string()))?;
        atomic_write(path, &json)
            .map_err(|err| MonitorError::Storage(format!("writing {}: {err}", path.display())))
    }
}

fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp_path = path.with_extension(format!("tmp.{}", std::process::id()));
    fs::write(&tmp_path, content.as_bytes())?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
