use std::fmt;

use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;

use crate::{
    monitor::RefreshStatus,
    timeline::{CompletedEntry, Snapshot},
};

const NOT_FOUND: &str = "—";
const CHART_WIDTH: u64 = 40;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRow {
    pub month: String,
    pub count: String,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedRow {
    pub date: String,
    pub count: String,
    pub percentage: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingTable {
    pub found: bool,
    pub rows: Vec<PendingRow>,
    pub total: u64,
    pub total_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedTable {
    pub rows: Vec<CompletedRow>,
    pub total: u64,
    pub total_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayRow {
    pub found: bool,
    pub count: String,
    pub percentage: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub kind: ChartKind,
    pub label: String,
    pub labels: Vec<String>,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub pending: PendingTable,
    pub today: TodayRow,
    pub completed: CompletedTable,
    pub pending_chart: ChartSeries,
    pub completed_chart: ChartSeries,
}

/// Build everything the page shows from the latest snapshot (if any fetch
/// has succeeded yet), the live "today" value to show and the archived days
/// in view. `today` being `None` renders the today row as not found.
pub fn render(
    snapshot: Option<&Snapshot>,
    today: Option<&CompletedEntry>,
    history: &[CompletedEntry],
) -> Dashboard {
    let pending_entries = snapshot.map(|s| s.pending_entries.as_slice()).unwrap_or(&[]);
    let pending_total = saturating_total(pending_entries.iter().map(|e| e.count));
    let completed_total = saturating_total(history.iter().map(|e| e.count));

    let today = match today {
        Some(today) => TodayRow {
            found: true,
            count: format_count(today.count),
            percentage: format_percentage(today.percentage),
        },
        None => TodayRow {
            found: false,
            count: NOT_FOUND.to_string(),
            percentage: NOT_FOUND.to_string(),
        },
    };

    Dashboard {
        pending: PendingTable {
            found: !pending_entries.is_empty(),
            rows: pending_entries
                .iter()
                .map(|entry| PendingRow {
                    month: entry.month.clone(),
                    count: format_count(entry.count),
                    percentage: format_percentage(entry.percentage),
                })
                .collect(),
            total: pending_total,
            total_label: format_count(pending_total),
        },
        today,
        completed: CompletedTable {
            rows: history
                .iter()
                .map(|entry| CompletedRow {
                    date: short_date_label(entry.date),
                    count: format_count(entry.count),
                    percentage: format_percentage(entry.percentage),
                })
                .collect(),
            total: completed_total,
            total_label: format_count(completed_total),
        },
        pending_chart: ChartSeries {
            kind: ChartKind::Bar,
            label: "Pending Applications".to_string(),
            labels: pending_entries
                .iter()
                .map(|e| short_month_label(&e.month))
                .collect(),
            values: pending_entries.iter().map(|e| e.count).collect(),
        },
        completed_chart: ChartSeries {
            kind: ChartKind::Line,
            label: "Completed Cases".to_string(),
            labels: history.iter().map(|e| short_date_label(e.date)).collect(),
            values: history.iter().map(|e| e.count).collect(),
        },
    }
}

/// Counts come straight off the page, so a sum pins at `u64::MAX` instead of
/// overflowing.
pub fn saturating_total(counts: impl IntoIterator<Item = u64>) -> u64 {
    counts.into_iter().fold(0, u64::saturating_add)
}

/// "Last updated: ... | Error: ... | Next refresh: HH:MM"
pub fn status_line(status: &RefreshStatus, next_refresh: Option<DateTime<Local>>) -> String {
    let mut parts = vec![];
    match status.last_updated {
        Some(at) => parts.push(format!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S"))),
        None => parts.push("Not updated yet".to_string()),
    }
    if let Some(err) = &status.last_error {
        parts.push(format!("Error: {err}"));
    }
    if let Some(at) = next_refresh {
        parts.push(format!("Next refresh: {}", at.format("%H:%M")));
    }
    parts.join(" | ")
}

/// en-US digit grouping: 1234567 -> "1,234,567".
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_percentage(percentage: Option<f64>) -> String {
    match percentage {
        Some(p) => format!("{p:.2}%"),
        None => NOT_FOUND.to_string(),
    }
}

pub fn short_date_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// "November 2023" -> "Nov 2023". Labels that aren't month + year are kept.
pub fn short_month_label(month: &str) -> String {
    NaiveDate::parse_from_str(&format!("01 {month}"), "%d %B %Y")
        .map(|date| date.format("%b %Y").to_string())
        .unwrap_or_else(|_| month.to_string())
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Pending applications by month")?;
        if self.pending.found {
            for row in &self.pending.rows {
                writeln!(f, "  {:<16} {:>10} {:>9}", row.month, row.count, row.percentage)?;
            }
            writeln!(f, "  {:<16} {:>10}", "Total", self.pending.total_label)?;
        } else {
            writeln!(f, "  not found")?;
        }

        writeln!(f, "Completed today")?;
        if self.today.found {
            writeln!(f, "  {:<16} {:>10} {:>9}", "Today", self.today.count, self.today.percentage)?;
        } else {
            writeln!(f, "  not found")?;
        }

        writeln!(f, "Completed by day")?;
        for row in &self.completed.rows {
            writeln!(f, "  {:<16} {:>10} {:>9}", row.date, row.count, row.percentage)?;
        }
        writeln!(f, "  {:<16} {:>10}", "Total", self.completed.total_label)?;

        write!(f, "{}", self.pending_chart)?;
        write!(f, "{}", self.completed_chart)
    }
}

impl fmt::Display for ChartSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({:?})", self.label, self.kind)?;
        let max = self.values.iter().copied().max().unwrap_or(0).max(1);
        let mark = match self.kind {
            ChartKind::Bar => "#",
            ChartKind::Line => "*",
        };
        for (label, value) in self.labels.iter().zip(&self.values) {
            let bar = mark.repeat(bar_width(*value, max));
            writeln!(
                f,
                "  {label:<10} {bar:<width$} {}",
                format_count(*value),
                width = CHART_WIDTH as usize
            )?;
        }
        Ok(())
    }
}

fn bar_width(value: u64, max: u64) -> usize {
    (u128::from(value) * u128::from(CHART_WIDTH)).div_ceil(u128::from(max)) as usize
}
