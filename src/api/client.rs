use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, Response};
use serde::de::DeserializeOwned;
use url::Url;

use crate::progress::types::JobProgressSnapshot;

use super::error::ApiError;
use super::types::{AlertRow, ApiDetail, DashboardPayload, ManualIterationResult, MonitoringStatus};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ApiClientConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(base) = std::env::var("WATCH_API_BASE") {
            cfg.base_url = base;
        }
        if let Ok(timeout) = std::env::var("WATCH_HTTP_TIMEOUT_SECS") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                cfg.timeout = Duration::from_secs(parsed);
            }
        }
        cfg
    }
}

/// Everything the watcher reads from or asks of the monitoring backend.
#[async_trait]
pub trait MonitorBackend: Send + Sync {
    async fn dashboard(&self) -> Result<DashboardPayload, ApiError>;
    async fn pending_alerts(&self) -> Result<Vec<AlertRow>, ApiError>;
    async fn status(&self) -> Result<MonitoringStatus, ApiError>;
    async fn progress(&self) -> Result<JobProgressSnapshot, ApiError>;
    async fn start(&self) -> Result<(), ApiError>;
    async fn stop(&self) -> Result<(), ApiError>;
    async fn manual_iteration(&self) -> Result<ManualIterationResult, ApiError>;
    async fn report_alert(&self, alert_id: i64) -> Result<(), ApiError>;
}

#[derive(Clone)]
pub struct HttpBackend {
    http: HttpClient,
    base: Url,
}

impl HttpBackend {
    pub fn new(cfg: ApiClientConfig) -> Result<Self, ApiError> {
        let base = parse_base(&cfg.base_url)?;
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base
            .join(path)
            .map_err(|_| ApiError::InvalidBaseUrl(format!("{}{}", self.base, path)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self
            .http
            .get(url)
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;
        decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let response = self.http.post(url).send().await.map_err(ApiError::from_reqwest)?;
        decode(response).await
    }
}

// Url::join drops the last path segment unless the base ends with '/'.
fn parse_base(raw: &str) -> Result<Url, ApiError> {
    let normalized = format!("{}/", raw.trim_end_matches('/'));
    let url = Url::parse(&normalized).map_err(|_| ApiError::InvalidBaseUrl(raw.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ApiError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(ApiError::from_reqwest)?;
    if !status.is_success() {
        let detail = serde_json::from_slice::<ApiDetail>(&bytes)
            .ok()
            .and_then(|d| d.detail.or(d.error))
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(ApiError::Status { status, detail });
    }
    serde_json::from_slice(&bytes).map_err(ApiError::Decode)
}

#[async_trait]
impl MonitorBackend for HttpBackend {
    async fn dashboard(&self) -> Result<DashboardPayload, ApiError> {
        self.get_json(self.endpoint("dashboard")?).await
    }

    async fn pending_alerts(&self) -> Result<Vec<AlertRow>, ApiError> {
        let mut url = self.endpoint("alerts")?;
        // cache-busting: a cached listing could resurrect alerts that were already reported
        let ts = chrono::Utc::now().timestamp_millis().to_string();
        url.query_pairs_mut().append_pair("reported", "false").append_pair("_ts", &ts);
        self.get_json(url).await
    }

    async fn status(&self) -> Result<MonitoringStatus, ApiError> {
        self.get_json(self.endpoint("monitoring/status")?).await
    }

    async fn progress(&self) -> Result<JobProgressSnapshot, ApiError> {
        self.get_json(self.endpoint("monitoring/progress")?).await
    }

    async fn start(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json(self.endpoint("monitoring/start")?).await?;
        Ok(())
    }

    async fn stop(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.post_json(self.endpoint("monitoring/stop")?).await?;
        Ok(())
    }

    async fn manual_iteration(&self) -> Result<ManualIterationResult, ApiError> {
        self.post_json(self.endpoint("monitoring/manual-iteration")?).await
    }

    async fn report_alert(&self, alert_id: i64) -> Result<(), ApiError> {
        let path = format!("alerts/{alert_id}/report");
        let _: serde_json::Value = self.post_json(self.endpoint(&path)?).await?;
        Ok(())
    }
}
