use anyhow::Context;

use crate::{config::MonitorConfig, history::HistoryStore, requests::RelayFetcher};

pub struct ScrapingContext {
    pub config: MonitorConfig,
    pub fetcher: RelayFetcher,
    pub history: HistoryStore,
}

impl ScrapingContext {
    pub fn new() -> anyhow::Result<Self> {
        let config = MonitorConfig::new()?;
        Self::from_config(config)
    }

    pub fn from_config(config: MonitorConfig) -> anyhow::Result<Self> {
        let fetcher = RelayFetcher::new(&config).context("failed to build http client")?;
        let history = HistoryStore::load(&config.history_path, config.history_capacity)
            .context("failed to load history")?;
        Ok(ScrapingContext {
            config,
            fetcher,
            history,
        })
    }
}
