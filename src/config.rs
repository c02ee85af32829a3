use std::{path::PathBuf, time::Duration};

use anyhow::{Context, ensure};
use chrono::NaiveTime;
use reqwest::Url;
use serde::{Deserialize, de::DeserializeOwned};

pub const DEFAULT_TARGET_URL: &str = "https://permtimeline.com/";
pub const DEFAULT_RELAY_URL: &str = "https://api.allorigins.win/get";

/// The env vars read at start-up. Anything left unset falls back to a default.
#[derive(Debug, Deserialize)]
pub struct MonitorEnv {
    #[serde(default = "default_target_url")]
    target_url: String,
    #[serde(default = "default_relay_url")]
    relay_url: String,
    #[serde(default = "default_relay_param")]
    relay_param: String,
    #[serde(default = "default_refresh_interval_mins")]
    refresh_interval_mins: u64,
    #[serde(default = "default_archive_time")]
    archive_time: String,
    #[serde(default = "default_history_capacity")]
    history_capacity: usize,
    #[serde(default = "default_history_path")]
    history_path: String,
    #[serde(default = "default_request_timeout_secs")]
    request_timeout_secs: u64,
    #[serde(default)]
    retry_count: u8,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    report_path: Option<String>,
}

fn default_target_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}

fn default_relay_url() -> String {
    DEFAULT_RELAY_URL.to_string()
}

fn default_relay_param() -> String {
    "url".to_string()
}

fn default_refresh_interval_mins() -> u64 {
    30
}

fn default_archive_time() -> String {
    "23:59".to_string()
}

fn default_history_capacity() -> usize {
    30
}

fn default_history_path() -> String {
    "permwatch_history.json".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_retry_delay_secs() -> u64 {
    5
}

/// A CORS-style relay that takes the real target as a query parameter.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: Url,
    pub param: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one fails. Never more than one.
    pub count: u8,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub target_url: Url,
    pub relay: Option<RelayConfig>,
    pub refresh_interval: Duration,
    pub archive_time: NaiveTime,
    pub history_capacity: usize,
    pub history_path: PathBuf,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub report_path: Option<PathBuf>,
}

impl MonitorConfig {
    pub fn new() -> anyhow::Result<Self> {
        let monitor_env = MonitorEnv::load_from_env()?;
        Self::from_env(monitor_env)
    }

    pub fn from_env(env: MonitorEnv) -> anyhow::Result<Self> {
        let target_url = Url::parse(&env.target_url)
            .with_context(|| format!("TARGET_URL is not a valid url: {}", env.target_url))?;

        let relay = if env.relay_url.trim().is_empty() {
            None
        } else {
            let url = Url::parse(env.relay_url.trim())
                .with_context(|| format!("RELAY_URL is not a valid url: {}", env.relay_url))?;
            ensure!(!env.relay_param.is_empty(), "RELAY_PARAM must not be empty");
            Some(RelayConfig {
                url,
                param: env.relay_param,
            })
        };

        ensure!(
            env.refresh_interval_mins > 0,
            "REFRESH_INTERVAL_MINS must be greater than zero"
        );
        ensure!(
            env.history_capacity > 0,
            "HISTORY_CAPACITY must be greater than zero"
        );
        ensure!(
            env.retry_count <= 1,
            "RETRY_COUNT must be 0 or 1, got {}",
            env.retry_count
        );

        let archive_time = NaiveTime::parse_from_str(env.archive_time.trim(), "%H:%M")
            .with_context(|| {
                format!("ARCHIVE_TIME must look like HH:MM, got {}", env.archive_time)
            })?;

        Ok(Self {
            target_url,
            relay,
            refresh_interval: Duration::from_secs(env.refresh_interval_mins * 60),
            archive_time,
            history_capacity: env.history_capacity,
            history_path: PathBuf::from(env.history_path),
            request_timeout: Duration::from_secs(env.request_timeout_secs),
            retry: RetryPolicy {
                count: env.retry_count,
                delay: Duration::from_secs(env.retry_delay_secs),
            },
            report_path: env.report_path.map(PathBuf::from),
        })
    }

    /// The url actually requested: the target itself, or the relay with the
    /// target tucked into its query string.
    pub fn fetch_url(&self) -> Url {
        match &self.relay {
            Some(relay) => {
                let mut url = relay.url.clone();
                url.query_pairs_mut()
                    .append_pair(&relay.param, self.target_url.as_str());
                url
            }
            None => self.target_url.clone(),
        }
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config =
            envy::from_env::<Self>().context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}
