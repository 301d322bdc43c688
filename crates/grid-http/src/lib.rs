//! reqwest-backed [`Transport`] for grid endpoints.
//!
//! Requests are plain `GET`s against URLs composed by the engine, with an
//! optional bearer token. Network failures and 5xx responses are retried a
//! bounded number of times; anything else is reported on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use grid_query::{GridPayload, Transport, TransportError};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reads `GRID_API_BASE_URL` (required), `GRID_API_TOKEN`,
    /// `GRID_API_TIMEOUT_MS` and `GRID_API_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, HttpTransportError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, HttpTransportError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("GRID_API_BASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(HttpTransportError::MissingBaseUrl)?;
        let mut config = Self::new(base_url);
        config.token = lookup("GRID_API_TOKEN").filter(|v| !v.is_empty());
        if let Some(ms) = parse_setting::<u64>(&lookup, "GRID_API_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_setting::<u32>(&lookup, "GRID_API_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        Ok(config)
    }
}

fn parse_setting<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, HttpTransportError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| HttpTransportError::InvalidSetting { name, value }),
    }
}

#[derive(Debug, Error)]
pub enum HttpTransportError {
    #[error("GRID_API_BASE_URL is not set")]
    MissingBaseUrl,
    #[error("invalid value for {name}: {value:?}")]
    InvalidSetting { name: &'static str, value: String },
    #[error("invalid base url: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("failed to decode grid payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HttpTransportError {
    fn is_retryable(&self) -> bool {
        match self {
            HttpTransportError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            HttpTransportError::UnexpectedStatus { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}

impl From<HttpTransportError> for TransportError {
    fn from(err: HttpTransportError) -> Self {
        match err {
            HttpTransportError::UnexpectedStatus { status, body } => TransportError::Status {
                status: status.as_u16(),
                body,
            },
            HttpTransportError::Decode(err) => TransportError::Decode(err.to_string()),
            other => TransportError::Unavailable(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        Url::parse(&config.base_url)?;
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    async fn get_once(&self, url: &str) -> Result<GridPayload, HttpTransportError> {
        let mut request = self.http.get(url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let res = request.send().await?;

        if res.status().is_success() {
            let body = res.bytes().await?;
            Ok(serde_json::from_slice(&body)?)
        } else {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            Err(HttpTransportError::UnexpectedStatus { status, body })
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn base_url(&self) -> Option<&str> {
        Some(self.config.base_url.as_str())
    }

    async fn fetch(&self, url: &str) -> Result<GridPayload, TransportError> {
        let retry = self.config.retry;
        let mut attempt = 0;
        loop {
            match self.get_once(url).await {
                Ok(payload) => {
                    debug!(url, attempt, rows = payload.data.len(), "grid page fetched");
                    return Ok(payload);
                }
                Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    warn!(url, attempt, error = %err, "grid request failed; retrying");
                    tokio::time::sleep(retry.backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn env_config_requires_base_url() {
        let err = HttpTransportConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, HttpTransportError::MissingBaseUrl));
    }

    #[test]
    fn env_config_reads_optional_settings() {
        let config = HttpTransportConfig::from_lookup(lookup(&[
            ("GRID_API_BASE_URL", "https://api.example.com"),
            ("GRID_API_TOKEN", "secret"),
            ("GRID_API_TIMEOUT_MS", "1500"),
            ("GRID_API_MAX_RETRIES", "3"),
        ]))
        .expect("config");
        assert_eq!(config.base_url, "https://api.example.com");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(200));
    }

    #[test]
    fn env_config_rejects_garbage_numbers() {
        let err = HttpTransportConfig::from_lookup(lookup(&[
            ("GRID_API_BASE_URL", "https://api.example.com"),
            ("GRID_API_MAX_RETRIES", "many"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            HttpTransportError::InvalidSetting { name: "GRID_API_MAX_RETRIES", .. }
        ));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = HttpTransport::new(HttpTransportConfig::new("not a url"));
        assert!(matches!(result, Err(HttpTransportError::InvalidBaseUrl(_))));
    }

    #[test]
    fn status_errors_keep_their_code() {
        let err: TransportError = HttpTransportError::UnexpectedStatus {
            status: StatusCode::NOT_FOUND,
            body: "missing".into(),
        }
        .into();
        assert_eq!(
            err,
            TransportError::Status {
                status: 404,
                body: "missing".into(),
            }
        );
    }
}
