use std::{
    io::BufRead,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime};
use log::{error, info};
use serde::Serialize;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::MonitorConfig,
    monitor::{Monitor, RefreshOutcome},
    presenter::{Dashboard, status_line},
    requests::PageSource,
};

/// A "refresh now" request from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManualRefresh;

/// The next time the wall clock reads `at` after `now`. If `at` has already
/// come (or is right now) today, that means tomorrow.
pub fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today_at = now.date().and_time(at);
    if today_at > now {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    }
}

pub fn duration_until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    (next_occurrence(now, at) - now)
        .to_std()
        .unwrap_or_default()
}

#[derive(Serialize)]
struct Report<'a> {
    generated_at: DateTime<Local>,
    status: String,
    dashboard: &'a Dashboard,
}

/// Prints the dashboard after every refresh/archive, and mirrors it to the
/// report file when one is configured.
pub struct Publisher {
    report_path: Option<PathBuf>,
    next_refresh: Mutex<Option<DateTime<Local>>>,
}

impl Publisher {
    pub fn new(report_path: Option<PathBuf>) -> Self {
        Self {
            report_path,
            next_refresh: Mutex::new(None),
        }
    }

    fn set_next_refresh(&self, at: DateTime<Local>) {
        if let Ok(mut next) = self.next_refresh.lock() {
            *next = Some(at);
        }
    }

    pub async fn publish<S: PageSource>(&self, monitor: &Monitor<S>) {
        let status = monitor.status().await;
        let dashboard = monitor.dashboard().await;
        let next_refresh = self.next_refresh.lock().ok().and_then(|next| *next);
        let status = status_line(&status, next_refresh);

        println!("{status}");
        println!("{dashboard}");

        if let Some(path) = &self.report_path {
            let report = Report {
                generated_at: Local::now(),
                status,
                dashboard: &dashboard,
            };
            let written = serde_json::to_string_pretty(&report)
                .map_err(|err| err.to_string())
                .and_then(|json| std::fs::write(path, json).map_err(|err| err.to_string()));
            if let Err(err) = written {
                error!("could not write report to {}: {err}", path.display());
            }
        }
    }
}

pub struct Scheduler<S> {
    monitor: Arc<Monitor<S>>,
    publisher: Arc<Publisher>,
    refresh_interval: Duration,
    archive_time: NaiveTime,
}

impl<S: PageSource + 'static> Scheduler<S> {
    pub fn new(monitor: Arc<Monitor<S>>, config: &MonitorConfig) -> Self {
        Self {
            monitor,
            publisher: Arc::new(Publisher::new(config.report_path.clone())),
            refresh_interval: config.refresh_interval,
            archive_time: config.archive_time,
        }
    }

    /// Drive both timers plus manual triggers until `cancel` fires. The
    /// refresh timer ticks once straight away, so the first fetch happens on
    /// start-up.
    pub async fn run(self, mut triggers: mpsc::Receiver<ManualRefresh>, cancel: CancellationToken) {
        let mut refresh_ticker = tokio::time::interval(self.refresh_interval);
        refresh_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut archive_due = next_occurrence(Local::now().naive_local(), self.archive_time);
        let archive_sleep = tokio::time::sleep(self.until(archive_due));
        tokio::pin!(archive_sleep);
        info!("next archive at {archive_due}");

        let mut triggers_open = true;
        loop {
            tokio::select! {
                _ = refresh_ticker.tick() => {
                    self.publisher.set_next_refresh(
                        Local::now() + chrono::Duration::from_std(self.refresh_interval)
                            .unwrap_or_else(|_| chrono::Duration::zero()),
                    );
                    self.spawn_refresh();
                }
                _ = &mut archive_sleep => {
                    // Read the live value now, not whatever was around when
                    // the timer was armed.
                    let _ = self.monitor.archive_today(archive_due.date()).await;
                    self.publisher.publish(&self.monitor).await;

                    archive_due = next_occurrence(Local::now().naive_local(), self.archive_time);
                    archive_sleep.as_mut().reset(Instant::now() + self.until(archive_due));
                    info!("next archive at {archive_due}");
                }
                trigger = triggers.recv(), if triggers_open => match trigger {
                    Some(ManualRefresh) => self.spawn_refresh(),
                    None => triggers_open = false,
                },
                _ = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }

    fn until(&self, due: NaiveDateTime) -> Duration {
        (due - Local::now().naive_local())
            .to_std()
            .unwrap_or_default()
    }

    fn spawn_refresh(&self) {
        let monitor = Arc::clone(&self.monitor);
        let publisher = Arc::clone(&self.publisher);
        tokio::spawn(async move {
            match monitor.refresh().await {
                RefreshOutcome::AlreadyInFlight => {}
                RefreshOutcome::Updated | RefreshOutcome::Failed(_) => {
                    publisher.publish(&monitor).await;
                }
            }
        });
    }
}

/// Turn lines typed on `input` into refresh requests; `q` cancels instead.
/// Blocking, so it belongs on its own thread.
pub fn read_manual_triggers(
    input: impl BufRead,
    triggers: mpsc::Sender<ManualRefresh>,
    cancel: CancellationToken,
) {
    for line in input.lines() {
        let Ok(line) = line else {
            break;
        };
        match line.trim() {
            "q" | "quit" => {
                cancel.cancel();
                break;
            }
            _ => {
                if triggers.blocking_send(ManualRefresh).is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 27)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn archive_later_today() {
        assert_eq!(
            duration_until_next(at(10, 0), time(23, 59)),
            Duration::from_secs((13 * 60 + 59) * 60)
        );
        assert_eq!(next_occurrence(at(10, 0), time(23, 59)).date(), at(0, 0).date());
    }

    #[test]
    fn archive_time_passed_means_tomorrow() {
        let next = next_occurrence(at(23, 59), time(23, 59));
        assert_eq!(next, at(23, 59) + chrono::Duration::days(1));
        assert_eq!(
            duration_until_next(at(23, 59), time(0, 0)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn lines_become_triggers_until_quit() {
        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        read_manual_triggers(&b"r\n\nq\nr\n"[..], tx, cancel.clone());

        assert_eq!(rx.try_recv(), Ok(ManualRefresh));
        assert_eq!(rx.try_recv(), Ok(ManualRefresh));
        assert!(rx.try_recv().is_err());
        assert!(cancel.is_cancelled());
    }
}
