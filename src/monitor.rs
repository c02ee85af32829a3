use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local, NaiveDate};
use log::{error, info, warn};
use tokio::sync::Mutex;

use crate::{
    error::MonitorError,
    history::{ArchiveOutcome, HistoryStore},
    presenter::{Dashboard, render},
    requests::PageSource,
    timeline::Snapshot,
    timeline_scraper::scrape_snapshot,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshStatus {
    pub last_updated: Option<DateTime<Local>>,
    pub last_error: Option<String>,
}

/// Everything the dashboard is drawn from.
#[derive(Debug)]
pub struct AppState {
    pub snapshot: Option<Snapshot>,
    pub history: HistoryStore,
    pub status: RefreshStatus,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Updated,
    /// Another refresh was already running; nothing was sent.
    AlreadyInFlight,
    Failed(MonitorError),
}

/// Released when the refresh holding it finishes, however it finishes.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Monitor<S> {
    source: S,
    state: Mutex<AppState>,
    in_flight: AtomicBool,
    history_window: usize,
}

impl<S: PageSource> Monitor<S> {
    pub fn new(source: S, history: HistoryStore) -> Self {
        let history_window = history.capacity();
        Self {
            source,
            state: Mutex::new(AppState {
                snapshot: None,
                history,
                status: RefreshStatus::default(),
            }),
            in_flight: AtomicBool::new(false),
            history_window,
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// One fetch -> extract -> snapshot cycle. At most one runs at a time; a
    /// call made while another is outstanding returns straight away without
    /// touching the network. A failed cycle leaves the snapshot and history
    /// as they were.
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!("refresh already in progress, ignoring request");
            return RefreshOutcome::AlreadyInFlight;
        };

        let scraped = match self.source.fetch_page().await {
            Ok(html) => scrape_snapshot(&html, Local::now()),
            Err(err) => Err(err),
        };

        let mut state = self.state.lock().await;
        match scraped {
            Ok(snapshot) => {
                for missing in snapshot.missing_fields() {
                    warn!("{missing}");
                }
                state.status.last_error = None;
                if let Some(today) = snapshot.today_completed {
                    let entry = today.on(snapshot.fetched_at.date_naive());
                    if let Err(err) = state.history.upsert_today(entry) {
                        error!("{err}");
                        state.status.last_error = Some(err.user_message());
                    }
                }
                info!(
                    "snapshot updated: {} pending month(s), completed today {}",
                    snapshot.pending_entries.len(),
                    snapshot
                        .today_completed
                        .map(|c| c.count.to_string())
                        .unwrap_or_else(|| "not found".to_string())
                );
                state.status.last_updated = Some(snapshot.fetched_at);
                state.snapshot = Some(snapshot);
                RefreshOutcome::Updated
            }
            Err(err) => {
                error!("refresh failed: {err}");
                state.status.last_error = Some(err.user_message());
                RefreshOutcome::Failed(err)
            }
        }
    }

    /// Archive whatever the live "today" value is right now.
    pub async fn archive_today(&self, date: NaiveDate) -> Result<ArchiveOutcome, MonitorError> {
        let mut state = self.state.lock().await;
        let outcome = state.history.archive_today(date);
        match &outcome {
            Ok(ArchiveOutcome::Archived) => info!(
                "archived {date}, {} day(s) in history",
                state.history.len()
            ),
            Ok(ArchiveOutcome::AlreadyArchived) => info!("{date} already archived"),
            Err(err) => {
                error!("archiving {date} failed: {err}");
                state.status.last_error = Some(err.user_message());
            }
        }
        outcome
    }

    /// The live slot is what the today row shows. It is hidden only while
    /// the latest page had no marker and nothing has reset it since.
    pub async fn dashboard(&self) -> Dashboard {
        let state = self.state.lock().await;
        let history = state.history.list_last(self.history_window);
        let marker_seen = state
            .snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.today_completed.is_some());
        let today = state
            .history
            .today()
            .filter(|live| marker_seen || state.history.archived_on() == Some(live.date));
        render(state.snapshot.as_ref(), today, &history)
    }

    pub async fn status(&self) -> RefreshStatus {
        self.state.lock().await.status.clone()
    }

    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.state.lock().await.snapshot.clone()
    }

    /// Run `f` against the state under the lock.
    pub async fn with_state<T>(&self, f: impl FnOnce(&AppState) -> T) -> T {
        let state = self.state.lock().await;
        f(&state)
    }
}
