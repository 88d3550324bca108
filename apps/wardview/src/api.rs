use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::model::{
    AdmissionSummary, DashboardSnapshot, DocumentRequest, ExamSchedule, IvRecord, MealRequest,
    MealSlot, Scope, Vital,
};

const TRANSIENT_RETRIES: u32 = 2;
const TRANSIENT_RETRY_STEP: Duration = Duration::from_millis(300);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("invalid or inactive admission token")]
    TokenInvalid,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid api configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Terminal failures invalidate the scope; everything else is either
    /// transient (recovered by the next fetch) or a write failure surfaced
    /// to the call site.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApiError::TokenInvalid)
    }
}

/// A full-state response for one scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Station(Vec<AdmissionSummary>),
    Dashboard(Box<DashboardSnapshot>),
}

#[derive(Debug, Clone, Serialize)]
pub struct VitalDraft {
    pub admission_id: String,
    pub temperature: f64,
    pub has_medication: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medication_type: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MealRequestDraft {
    pub admission_id: String,
    pub request_type: String,
    pub meal_date: NaiveDate,
    pub meal_time: MealSlot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pediatric_meal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardian_meal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamDraft {
    pub admission_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentRequestDraft {
    pub admission_id: String,
    pub request_items: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IvDraft {
    pub admission_id: String,
    pub infusion_rate: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// REST surface the sync core consumes. The reqwest implementation talks to
/// the ward API; tests inject mocks through `ApiClient::with_backend`.
#[async_trait]
pub trait ApiBackend: Send + Sync {
    async fn station_snapshot(&self, bust: Option<Uuid>)
    -> Result<Vec<AdmissionSummary>, ApiError>;

    async fn dashboard_snapshot(
        &self,
        token: &str,
        bust: Option<Uuid>,
    ) -> Result<DashboardSnapshot, ApiError>;

    async fn create_vital(&self, draft: &VitalDraft) -> Result<Vital, ApiError>;

    async fn upsert_meal_request(&self, draft: &MealRequestDraft)
    -> Result<MealRequest, ApiError>;

    async fn create_exam_schedule(&self, draft: &ExamDraft) -> Result<ExamSchedule, ApiError>;

    async fn delete_exam_schedule(&self, id: i64) -> Result<(), ApiError>;

    async fn create_document_request(
        &self,
        draft: &DocumentRequestDraft,
    ) -> Result<DocumentRequest, ApiError>;

    async fn patch_document_request(&self, id: i64, status: &str) -> Result<(), ApiError>;

    async fn create_iv_record(&self, draft: &IvDraft) -> Result<IvRecord, ApiError>;
}

#[derive(Clone)]
pub struct ApiClient {
    backend: Arc<dyn ApiBackend>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let backend = Arc::new(ReqwestBackend::new(config.base_url().clone())?);
        Ok(Self { backend })
    }

    #[cfg(test)]
    pub(crate) fn with_backend(backend: Arc<dyn ApiBackend>) -> Self {
        Self { backend }
    }

    /// Fetch the full state for a scope. `bust` is present on forced fetches
    /// so the request cannot be coalesced with an identical one in flight.
    pub async fn fetch_snapshot(
        &self,
        scope: &Scope,
        bust: Option<Uuid>,
    ) -> Result<Snapshot, ApiError> {
        match scope {
            Scope::Station => {
                let rows = self.backend.station_snapshot(bust).await?;
                Ok(Snapshot::Station(rows))
            }
            Scope::Admission { token } => {
                let dashboard = self.backend.dashboard_snapshot(token, bust).await?;
                Ok(Snapshot::Dashboard(Box::new(dashboard)))
            }
        }
    }

    pub fn backend(&self) -> &Arc<dyn ApiBackend> {
        &self.backend
    }
}

pub struct ReqwestBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl ReqwestBackend {
    pub fn new(base_url: Url) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|err| ApiError::InvalidConfig(format!("invalid endpoint {path}: {err}")))
    }

    /// GETs retry twice on connection-level failures with widening spacing;
    /// transient failures never surface past the next scheduled fetch.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        mut url: Url,
        bust: Option<Uuid>,
    ) -> Result<T, ApiError> {
        if let Some(nonce) = bust {
            url.query_pairs_mut().append_pair("fresh", &nonce.to_string());
        }
        let mut attempt = 0;
        loop {
            match self.client.get(url.clone()).send().await {
                Ok(response) => return decode_response(response).await,
                Err(err) if err.is_connect() && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    let delay = TRANSIENT_RETRY_STEP * attempt;
                    tracing::warn!(
                        target = "wardview::api",
                        %url,
                        attempt,
                        "connection failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint(path)?;
        let response = self.client.post(url).json(body).send().await?;
        decode_response(response).await
    }
}

async fn decode_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            Err(ApiError::TokenInvalid)
        }
        status if !status.is_success() => Err(ApiError::HttpStatus(status)),
        _ => response
            .json::<T>()
            .await
            .map_err(|err| ApiError::InvalidResponse(err.to_string())),
    }
}

async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::TokenInvalid);
    }
    if !status.is_success() {
        return Err(ApiError::HttpStatus(status));
    }
    Ok(())
}

#[async_trait]
impl ApiBackend for ReqwestBackend {
    async fn station_snapshot(
        &self,
        bust: Option<Uuid>,
    ) -> Result<Vec<AdmissionSummary>, ApiError> {
        let url = self.endpoint("api/v1/admissions")?;
        self.get_json(url, bust).await
    }

    async fn dashboard_snapshot(
        &self,
        token: &str,
        bust: Option<Uuid>,
    ) -> Result<DashboardSnapshot, ApiError> {
        let url = self.endpoint(&format!("api/v1/dashboard/{token}"))?;
        self.get_json(url, bust).await
    }

    async fn create_vital(&self, draft: &VitalDraft) -> Result<Vital, ApiError> {
        self.post_json("api/v1/vitals", draft).await
    }

    async fn upsert_meal_request(
        &self,
        draft: &MealRequestDraft,
    ) -> Result<MealRequest, ApiError> {
        self.post_json("api/v1/meals/requests", draft).await
    }

    async fn create_exam_schedule(&self, draft: &ExamDraft) -> Result<ExamSchedule, ApiError> {
        self.post_json("api/v1/exam-schedules", draft).await
    }

    async fn delete_exam_schedule(&self, id: i64) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("api/v1/exam-schedules/{id}"))?;
        let response = self.client.delete(url).send().await?;
        check_status(response).await
    }

    async fn create_document_request(
        &self,
        draft: &DocumentRequestDraft,
    ) -> Result<DocumentRequest, ApiError> {
        self.post_json("api/v1/documents/requests", draft).await
    }

    async fn patch_document_request(&self, id: i64, status: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("api/v1/documents/requests/{id}"))?;
        let body = serde_json::json!({ "status": status });
        let response = self.client.patch(url).json(&body).send().await?;
        check_status(response).await
    }

    async fn create_iv_record(&self, draft: &IvDraft) -> Result<IvRecord, ApiError> {
        self.post_json("api/v1/iv-records", draft).await
    }
}
