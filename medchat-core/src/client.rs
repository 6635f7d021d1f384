use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::contracts::{
    ChatRequest, ChatResponse, PatientSummary, ReportRequest, ReportResponse, ServiceInfo,
};
use crate::error::{ClientError, ConfigError, Result};
use crate::timeouts::{Operation, TimeoutPolicy};
use crate::upload::{UploadBatch, UploadLimits};

/// Everything the gateway may ask of the AI service.
///
/// Handlers depend on this trait only, so tests can swap in a fake.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn list_patients(&self) -> Result<Vec<PatientSummary>>;

    /// `request.conversation_history` must carry the full prior conversation;
    /// the service keeps no state between calls.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    async fn generate_report(&self, request: &ReportRequest) -> Result<ReportResponse>;

    /// Returns the service's acknowledgment untouched.
    async fn upload_documents(&self, batch: UploadBatch) -> Result<Value>;

    /// Readiness hint only. Never fails.
    async fn health_check(&self) -> bool;
}

/// How the patient id travels alongside an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientIdPlacement {
    Query,
    FormField,
}

/// Path table of a service implementing the inference operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub patients: String,
    pub chat: String,
    pub generate_report: String,
    pub upload: String,
    pub health: String,
    /// Self-description including the published timeout table.
    pub info: String,
    pub upload_patient_id: PatientIdPlacement,
}

impl Endpoints {
    /// Paths served by the AI service itself.
    pub fn ai_service() -> Self {
        Self {
            patients: "/patients".to_string(),
            chat: "/chat".to_string(),
            generate_report: "/generate-report".to_string(),
            upload: "/upload".to_string(),
            health: "/health".to_string(),
            info: "/".to_string(),
            upload_patient_id: PatientIdPlacement::Query,
        }
    }

    /// Paths served by the gateway, for clients sitting in front of it.
    pub fn gateway() -> Self {
        Self {
            patients: "/patients".to_string(),
            chat: "/chat".to_string(),
            generate_report: "/reports/generate".to_string(),
            upload: "/upload".to_string(),
            health: "/health".to_string(),
            info: "/".to_string(),
            upload_patient_id: PatientIdPlacement::FormField,
        }
    }
}

/// `InferenceClient` over HTTP.
///
/// Holds one pooled `reqwest::Client`; clone-free sharing through `Arc` is
/// expected, and the pool is reused by every in-flight request.
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
    timeouts: TimeoutPolicy,
    limits: UploadLimits,
}

impl HttpInferenceClient {
    pub fn new(
        base_url: impl Into<String>,
        endpoints: Endpoints,
        timeouts: TimeoutPolicy,
        limits: UploadLimits,
    ) -> std::result::Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(%base_url, "Inference client initialized");

        Ok(Self {
            http,
            base_url,
            endpoints,
            timeouts,
            limits,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Timeout table the service publishes about its own upstream calls.
    ///
    /// Fetched with the probe budget. Callers use it to check that their own
    /// policy encloses the one the service is actually running with.
    pub async fn published_timeouts(&self) -> Result<TimeoutPolicy> {
        let request = self.http.get(self.url(&self.endpoints.info));
        let info: ServiceInfo = self.send(Operation::HealthCheck, request).await?;
        Ok(info.timeouts_secs)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let budget = self.timeouts.budget_for(operation);
        let started = Instant::now();

        let result = self.execute(operation, budget, request).await;
        log_outcome(operation, started.elapsed(), &result);
        result
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        budget: Duration,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .timeout(budget)
            .send()
            .await
            .map_err(|e| ClientError::from_transport(operation, budget, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(operation, budget, status, upstream_detail(&body)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::from_transport(operation, budget, e))
    }
}

#[async_trait]
impl InferenceClient for HttpInferenceClient {
    async fn list_patients(&self) -> Result<Vec<PatientSummary>> {
        let request = self.http.get(self.url(&self.endpoints.patients));
        self.send(Operation::ListPatients, request).await
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        require_non_empty("patient_id", &request.patient_id)?;
        require_non_empty("question", &request.question)?;

        debug!(
            patient_id = %mask_pii(&request.patient_id),
            history_len = request.conversation_history.len(),
            "Forwarding chat turn"
        );
        let http_request = self.http.post(self.url(&self.endpoints.chat)).json(request);
        self.send(Operation::Chat, http_request).await
    }

    async fn generate_report(&self, request: &ReportRequest) -> Result<ReportResponse> {
        require_non_empty("patient_id", &request.patient_id)?;

        info!(
            target: "medchat::report",
            patient_id = %mask_pii(&request.patient_id),
            budget_secs = self.timeouts.generate_report.as_secs(),
            "Requesting report generation"
        );
        let http_request = self
            .http
            .post(self.url(&self.endpoints.generate_report))
            .json(request);
        self.send(Operation::GenerateReport, http_request).await
    }

    async fn upload_documents(&self, batch: UploadBatch) -> Result<Value> {
        batch.validate(&self.limits)?;

        let patient_id = batch.patient_id.clone();
        let file_count = batch.files.len();
        let total_bytes = batch.total_bytes();

        let mut form = Form::new();
        if self.endpoints.upload_patient_id == PatientIdPlacement::FormField {
            form = form.text("patient_id", patient_id.clone());
        }
        for file in batch.files {
            let media_type = file.media_type().ok_or_else(|| {
                ClientError::invalid("Invalid file type", "files", file.declared_type.clone())
            })?;
            let part = Part::bytes(file.data)
                .file_name(file.filename)
                .mime_str(media_type.as_mime())
                .map_err(|e| ClientError::invalid("Invalid file type", "files", e.to_string()))?;
            form = form.part("files", part);
        }

        let mut request = self.http.post(self.url(&self.endpoints.upload));
        if self.endpoints.upload_patient_id == PatientIdPlacement::Query {
            request = request.query(&[("patient_id", patient_id.as_str())]);
        }

        info!(
            patient_id = %mask_pii(&patient_id),
            file_count,
            total_bytes,
            "Uploading documents"
        );
        self.send(Operation::UploadDocuments, request.multipart(form))
            .await
    }

    async fn health_check(&self) -> bool {
        let budget = self.timeouts.health_check;
        match self
            .http
            .get(self.url(&self.endpoints.health))
            .timeout(budget)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }
}

fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ClientError::missing_field(field));
    }
    Ok(())
}

/// Masks an identifier for logs, keeping only its first four characters.
pub fn mask_pii(id: &str) -> String {
    match id.char_indices().nth(4) {
        Some((cut, _)) => format!("{}****", &id[..cut]),
        None => "****".to_string(),
    }
}

/// Maps a failure status back onto the taxonomy.
///
/// 503 and 504 are what a gateway in between answers for an unreachable or
/// timed-out service, so they keep that meaning instead of becoming a plain
/// upstream error.
fn status_error(
    operation: Operation,
    budget: Duration,
    status: reqwest::StatusCode,
    detail: String,
) -> ClientError {
    match status {
        reqwest::StatusCode::SERVICE_UNAVAILABLE => ClientError::UpstreamUnavailable {
            operation,
            reason: detail,
        },
        reqwest::StatusCode::GATEWAY_TIMEOUT => ClientError::UpstreamTimeout { operation, budget },
        _ => ClientError::UpstreamError {
            operation,
            status: Some(status.as_u16()),
            detail,
        },
    }
}

const MAX_DETAIL_CHARS: usize = 500;

/// Pulls the human-readable part out of an error body, else the raw text.
///
/// Understands FastAPI's `{detail}`, the gateway's `{error, message}` and the
/// nested `{error: {message}}` of internal failures.
fn upstream_detail(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        match map.get("detail") {
            Some(Value::String(detail)) => return detail.clone(),
            Some(other) => return other.to_string(),
            None => {}
        }
        if let Some(Value::String(message)) = map.get("message") {
            return message.clone();
        }
        if let Some(Value::String(message)) = map.get("error").and_then(|e| e.get("message")) {
            return message.clone();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "no details provided".to_string();
    }
    trimmed.chars().take(MAX_DETAIL_CHARS).collect()
}

fn log_outcome<T>(operation: Operation, elapsed: Duration, result: &Result<T>) {
    let elapsed_ms = elapsed.as_millis() as u64;
    let class = operation.class().as_str();
    match (operation, result) {
        (Operation::GenerateReport, Ok(_)) => {
            info!(target: "medchat::report", class, elapsed_ms, "Report generated")
        }
        (Operation::GenerateReport, Err(e)) => {
            warn!(
                target: "medchat::report",
                class,
                elapsed_ms,
                error = %e,
                "Report generation failed"
            )
        }
        (Operation::Chat, Ok(_)) => {
            info!(target: "medchat::chat", class, elapsed_ms, "Chat answered")
        }
        (Operation::Chat, Err(e)) => {
            warn!(target: "medchat::chat", class, elapsed_ms, error = %e, "Chat failed")
        }
        (_, Ok(_)) => {
            info!(operation = %operation, class, elapsed_ms, "Upstream call succeeded")
        }
        (_, Err(e)) => {
            warn!(operation = %operation, class, elapsed_ms, error = %e, "Upstream call failed")
        }
    }
}
