use crate::config::Config;
use crate::types::{CreditsStatus, HealthProbe, UsageStatus};
use log::debug;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const HEALTH_PATH: &str = "/health";
pub const USAGE_PATH: &str = "/usage_today";
pub const CREDITS_PATH: &str = "/credits_status";

/// Why a status fetch produced no update.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed JSON: {0}")]
    MalformedJson(serde_json::Error),
    #[error("missing or invalid field: {0}")]
    MissingField(serde_json::Error),
}

impl FetchError {
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "http_status",
            FetchError::MalformedJson(_) => "malformed_json",
            FetchError::MissingField(_) => "missing_field",
        }
    }
}

pub fn build_client(cfg: &Config) -> reqwest::Result<Client> {
    let mut default_headers = HeaderMap::new();
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        default_headers.insert(USER_AGENT, ua);
    }
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    default_headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    let mut builder = Client::builder()
        .default_headers(default_headers)
        .use_rustls_tls();
    // Status calls are unbounded unless a timeout is configured.
    if let Some(secs) = cfg.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build()
}

/// Decode a response body in two steps so that broken JSON and
/// well-formed JSON lacking a required field are told apart.
pub fn decode_body<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, FetchError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(FetchError::MalformedJson)?;
    serde_json::from_value(value).map_err(FetchError::MissingField)
}

pub async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &Client,
    base_url: &str,
    path: &str,
) -> Result<T, FetchError> {
    let url = format!("{}{}", base_url, path);
    let res = client.get(&url).send().await?;
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        debug!("GET {} returned {}", url, status);
        return Err(FetchError::Status { status, body: text });
    }
    decode_body(&text)
}

/// Client for the three backend status endpoints. No retries: a failed
/// call is simply reported and the next poll tries again.
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: Client,
    base_url: String,
}

impl StatusClient {
    pub fn new(cfg: &Config) -> reqwest::Result<Self> {
        Ok(Self {
            client: build_client(cfg)?,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthProbe, FetchError> {
        get_json(&self.client, &self.base_url, HEALTH_PATH).await
    }

    pub async fn usage_today(&self) -> Result<UsageStatus, FetchError> {
        get_json(&self.client, &self.base_url, USAGE_PATH).await
    }

    pub async fn credits_status(&self) -> Result<CreditsStatus, FetchError> {
        get_json(&self.client, &self.base_url, CREDITS_PATH).await
    }
}
