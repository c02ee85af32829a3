use std::sync::LazyLock;

use chrono::{DateTime, Local};
use log::debug;
use regex::Regex;
use scraper::Html;

use crate::{
    error::MonitorError,
    text_manipulators::{
        normalize_ws, parse_count, parse_percentage, rejoin_digit_groups, strip_markup_artifacts,
    },
    timeline::{CompletedCount, PendingEntry, Snapshot},
};

// Text inside these never reaches the reader, so it can't carry a marker.
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

static MONTH_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{4})\b",
    )
    .expect("month label regex")
});

static PENDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Pending Applications\s*:?\s*(\d{1,3}(?:,\d{3})+|\d+)\b(?:\s*\(\s*(\d+(?:\.\d+)?)\s*%?\s*\)?)?",
    )
    .expect("pending regex")
});

static COMPLETED_TODAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Total Completed Today\s*:?\s*(\d{1,3}(?:,\d{3})+|\d+)\b(?:\s*\(\s*(\d+(?:\.\d+)?)\s*%?\s*\)?)?",
    )
    .expect("completed today regex")
});

/// Anything that can hand over its text nodes in document order. The
/// extractors below only ever look at text, never at tags or classes.
pub trait TextDocument {
    fn text_nodes(&self) -> Vec<String>;

    /// All text joined into one run, comment tokens removed, whitespace
    /// collapsed and numbers split by inline markup put back together.
    fn flattened_text(&self) -> String {
        rejoin_digit_groups(&normalize_ws(&strip_markup_artifacts(
            &self.text_nodes().join(" "),
        )))
    }
}

pub struct PageDocument {
    html: Html,
}

impl PageDocument {
    pub fn parse(raw_html: &str) -> Result<Self, MonitorError> {
        if raw_html.trim().is_empty() {
            return Err(MonitorError::Parse("page body is empty".to_string()));
        }
        if raw_html.contains('\0') {
            return Err(MonitorError::Parse(
                "page body is binary, not html".to_string(),
            ));
        }
        Ok(Self {
            html: Html::parse_document(raw_html),
        })
    }
}

impl TextDocument for PageDocument {
    fn text_nodes(&self) -> Vec<String> {
        self.html
            .root_element()
            .descendants()
            .filter_map(|node| {
                let text: &str = node.value().as_text()?;
                let hidden = node
                    .parent()
                    .and_then(|parent| parent.value().as_element().map(|el| el.name()))
                    .is_some_and(|name| SKIPPED_ELEMENTS.contains(&name));
                (!hidden).then(|| text.to_string())
            })
            .collect()
    }
}

pub fn extract_pending(raw_html: &str) -> Result<Vec<PendingEntry>, MonitorError> {
    Ok(pending_entries(&PageDocument::parse(raw_html)?))
}

pub fn extract_completed_today(raw_html: &str) -> Result<Option<CompletedCount>, MonitorError> {
    Ok(completed_today(&PageDocument::parse(raw_html)?))
}

/// Parses once and runs both extractors. Only an unparsable page is an
/// error; a missing marker just leaves its field empty.
pub fn scrape_snapshot(
    raw_html: &str,
    fetched_at: DateTime<Local>,
) -> Result<Snapshot, MonitorError> {
    let document = PageDocument::parse(raw_html)?;
    Ok(Snapshot {
        pending_entries: pending_entries(&document),
        today_completed: completed_today(&document),
        fetched_at,
    })
}

/// Every "Pending Applications" figure that can be tied to a month label.
///
/// A figure belongs to the closest month label before it, provided that
/// label comes after the previous figure. Otherwise a header with two
/// figures under it would hand the second one the first one's month.
pub fn pending_entries(document: &impl TextDocument) -> Vec<PendingEntry> {
    let text = document.flattened_text();
    let months: Vec<_> = MONTH_LABEL
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = format!("{} {}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
            Some((whole.start(), whole.end(), label))
        })
        .collect();

    let mut entries: Vec<PendingEntry> = vec![];
    let mut previous_end = 0;
    for caps in PENDING.captures_iter(&text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let window_start = previous_end;
        previous_end = whole.end();

        let Some((_, _, month)) = months
            .iter()
            .rev()
            .find(|(start, end, _)| *end <= whole.start() && *start >= window_start)
        else {
            debug!("pending figure at offset {} has no month label", whole.start());
            continue;
        };
        if entries.iter().any(|entry| &entry.month == month) {
            debug!("ignoring repeated pending figure for {month}");
            continue;
        }
        let Some(count) = caps.get(1).and_then(|m| parse_count(m.as_str())) else {
            continue;
        };
        entries.push(PendingEntry {
            month: month.clone(),
            count,
            percentage: caps.get(2).and_then(|m| parse_percentage(m.as_str())),
        });
    }
    entries
}

pub fn completed_today(document: &impl TextDocument) -> Option<CompletedCount> {
    let text = document.flattened_text();
    let caps = COMPLETED_TODAY.captures(&text)?;
    let count = parse_count(caps.get(1)?.as_str())?;
    Some(CompletedCount {
        count,
        percentage: caps.get(2).and_then(|m| parse_percentage(m.as_str())),
    })
}
