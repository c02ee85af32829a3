use std::future::Future;

use log::warn;
use reqwest::{Client, ClientBuilder, Url};
use serde::Deserialize;

use crate::{
    config::{MonitorConfig, RetryPolicy},
    error::MonitorError,
};

const USER_AGENT: &str = concat!("permwatch/", env!("CARGO_PKG_VERSION"));

/// Where the timeline page comes from. The refresh cycle only needs the raw
/// html, so tests can hand it a canned page instead of a network client.
pub trait PageSource: Send + Sync {
    fn fetch_page(&self) -> impl Future<Output = Result<String, MonitorError>> + Send;
}

/// What a JSON-mode relay wraps the page in. `status.http_code` is the
/// upstream answer; the relay itself replies 200 either way.
#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    contents: Option<String>,
    #[serde(default)]
    status: Option<RelayStatus>,
}

#[derive(Debug, Deserialize)]
struct RelayStatus {
    #[serde(default)]
    http_code: Option<u16>,
}

pub struct RequestClient {
    client: Client,
}

impl RequestClient {
    pub fn new(config: &MonitorConfig) -> anyhow::Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` and return the body, failing on anything but a 2xx.
    pub async fn fetch_url_body(&self, url: &Url) -> Result<String, MonitorError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Network {
                url: url.to_string(),
                message: format!("unexpected status {status}"),
                status: Some(status.as_u16()),
            });
        }
        let bytes = response.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| MonitorError::Parse(format!("body is not valid utf-8: {err}")))
    }
}

/// Fetches the target page, through the relay when one is configured.
pub struct RelayFetcher {
    request_client: RequestClient,
    fetch_url: Url,
    retry: RetryPolicy,
}

impl RelayFetcher {
    pub fn new(config: &MonitorConfig) -> anyhow::Result<Self> {
        Ok(Self {
            request_client: RequestClient::new(config)?,
            fetch_url: config.fetch_url(),
            retry: config.retry,
        })
    }

    pub fn fetch_url(&self) -> &Url {
        &self.fetch_url
    }

    async fn fetch_once(&self) -> Result<String, MonitorError> {
        let body = self.request_client.fetch_url_body(&self.fetch_url).await?;
        unwrap_relay_body(self.fetch_url.as_str(), body)
    }
}

impl PageSource for RelayFetcher {
    async fn fetch_page(&self) -> Result<String, MonitorError> {
        let mut attempts_left = self.retry.count;
        loop {
            match self.fetch_once().await {
                Err(err) if attempts_left > 0 && err.is_retryable() => {
                    attempts_left -= 1;
                    warn!(
                        "fetch failed ({err}), retrying in {}s",
                        self.retry.delay.as_secs()
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                result => return result,
            }
        }
    }
}

/// JSON relays answer `{"contents": "<html>..."}`; raw relays and direct
/// fetches answer with the page itself.
pub fn unwrap_relay_body(url: &str, body: String) -> Result<String, MonitorError> {
    if !body.trim_start().starts_with('{') {
        return Ok(body);
    }
    let envelope = serde_json::from_str::<RelayEnvelope>(&body)
        .map_err(|err| MonitorError::Parse(format!("relay envelope is not valid json: {err}")))?;
    let upstream_failure = envelope
        .status
        .and_then(|status| status.http_code)
        .filter(|code| !(200..300).contains(code));
    if let Some(code) = upstream_failure {
        return Err(MonitorError::Network {
            url: url.to_string(),
            message: format!("upstream answered {code} through the relay"),
            status: Some(code),
        });
    }
    envelope
        .contents
        .ok_or_else(|| MonitorError::network(url, "relay returned no contents"))
}
