use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::progress::types::JobProgressSnapshot;

use super::client::MonitorBackend;
use super::error::ApiError;
use super::types::{AlertRow, DashboardPayload, ManualIterationResult, MonitoringStatus};

/// Scripted backend: each endpoint serves its current value, progress serves a queue first.
#[derive(Default)]
pub struct MockBackend {
    dashboard: Mutex<Option<DashboardPayload>>,
    alerts: Mutex<Vec<AlertRow>>,
    status: Mutex<Option<MonitoringStatus>>,
    progress: Mutex<VecDeque<JobProgressSnapshot>>,
    failing_reports: Mutex<Vec<i64>>,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self { Self::default() }

    pub fn set_dashboard(&self, payload: DashboardPayload) { *self.dashboard.lock().unwrap() = Some(payload); }
    pub fn set_alerts(&self, alerts: Vec<AlertRow>) { *self.alerts.lock().unwrap() = alerts; }
    pub fn set_status(&self, status: MonitoringStatus) { *self.status.lock().unwrap() = Some(status); }
    pub fn push_progress(&self, snap: JobProgressSnapshot) { self.progress.lock().unwrap().push_back(snap); }
    pub fn fail_report(&self, alert_id: i64) { self.failing_reports.lock().unwrap().push(alert_id); }

    pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }

    fn record(&self, call: impl Into<String>) { self.calls.lock().unwrap().push(call.into()); }

    fn unavailable() -> ApiError {
        ApiError::Status { status: StatusCode::SERVICE_UNAVAILABLE, detail: "not scripted".into() }
    }
}

#[async_trait]
impl MonitorBackend for MockBackend {
    async fn dashboard(&self) -> Result<DashboardPayload, ApiError> {
        self.record("dashboard");
        self.dashboard.lock().unwrap().clone().ok_or_else(Self::unavailable)
    }

    async fn pending_alerts(&self) -> Result<Vec<AlertRow>, ApiError> {
        self.record("alerts");
        Ok(self.alerts.lock().unwrap().clone())
    }

    async fn status(&self) -> Result<MonitoringStatus, ApiError> {
        self.record("status");
        self.status.lock().unwrap().clone().ok_or_else(Self::unavailable)
    }

    async fn progress(&self) -> Result<JobProgressSnapshot, ApiError> {
        self.record("progress");
        let mut queue = self.progress.lock().unwrap();
        if queue.len() > 1 {
            return Ok(queue.pop_front().unwrap());
        }
        queue.front().cloned().ok_or_else(Self::unavailable)
    }

    async fn start(&self) -> Result<(), ApiError> {
        self.record("start");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ApiError> {
        self.record("stop");
        Ok(())
    }

    async fn manual_iteration(&self) -> Result<ManualIterationResult, ApiError> {
        self.record("manual");
        Ok(ManualIterationResult { success: true, agencies_processed: Some(0), alerts_generated: Some(0) })
    }

    async fn report_alert(&self, alert_id: i64) -> Result<(), ApiError> {
        self.record(format!("report:{alert_id}"));
        if self.failing_reports.lock().unwrap().contains(&alert_id) {
            return Err(ApiError::Status { status: StatusCode::NOT_FOUND, detail: "missing".into() });
        }
        Ok(())
    }
}
