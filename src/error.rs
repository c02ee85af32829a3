use std::fmt;

use thiserror::Error;

/// The two facts scraped off the timeline page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pending,
    CompletedToday,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Pending => write!(f, "Pending Applications"),
            Field::CompletedToday => write!(f, "Total Completed Today"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("network error fetching {url}: {message}")]
    Network {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("could not parse page: {0}")]
    Parse(String),

    #[error("field not found: {0}")]
    FieldNotFound(Field),

    #[error("history storage error: {0}")]
    Storage(String),
}

impl MonitorError {
    pub fn network(url: &str, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.to_string(),
            message: message.into(),
            status: None,
        }
    }

    /// Only transport and relay failures are worth another attempt; a page
    /// that arrived but can't be decoded won't decode any better next time.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Short message for the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Network {
                status: Some(status),
                ..
            } => format!("HTTP error! status: {status}"),
            Self::Network { message, .. } => format!("network error: {message}"),
            Self::Parse(msg) => format!("could not read page: {msg}"),
            Self::FieldNotFound(field) => format!("{field} not found"),
            Self::Storage(msg) => format!("could not save history: {msg}"),
        }
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        let status = err.status().map(|s| s.as_u16());
        Self::Network {
            url,
            message: err.without_url().to_string(),
            status,
        }
    }
}
