use axum::{
    Router,
    body::Body,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::MultipartRejection,
        rejection::JsonRejection,
    },
    http::{Request, StatusCode},
    response::Json,
    routing::{get, post},
};
use chrono::{SecondsFormat, Utc};
use medchat_core::{
    Attachment, ChatRequest, ChatResponse, ClientError, Endpoints, HistoryEntry,
    HttpInferenceClient, InferenceClient, PatientSummary, ReportRequest, ReportResponse,
    UploadBatch, mask_pii,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span};
use uuid::Uuid;

use crate::{
    config::GatewayConfig,
    error::{ApiError, handle_panic},
};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn InferenceClient>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(client: Arc<dyn InferenceClient>, config: GatewayConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }
}

/// Builds the router with a single shared HTTP client for the AI service.
pub fn create_app(config: GatewayConfig) -> Result<Router, medchat_core::ConfigError> {
    let client = HttpInferenceClient::new(
        config.ai_service_url.clone(),
        Endpoints::ai_service(),
        config.timeouts.clone(),
        config.upload_limits,
    )?;
    Ok(build_router(AppState::new(Arc::new(client), config)))
}

pub fn build_router(app_state: AppState) -> Router {
    let upload_body_limit = app_state.config.upload_limits.max_body_bytes();

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/patients", get(list_patients))
        .route("/chat", post(chat))
        .route("/reports/generate", post(generate_report))
        .route(
            "/upload",
            post(upload_documents).layer(DefaultBodyLimit::max(upload_body_limit)),
        )
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            info_span!(
                "request",
                request_id = %Uuid::new_v4(),
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .with_state(app_state)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Patient File AI Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Validates clinician requests and forwards them to the AI service",
        "endpoints": {
            "GET /patients": "List available patients",
            "POST /chat": "Ask a question about a patient's documents",
            "POST /reports/generate": "Generate a discharge report",
            "POST /upload": "Upload patient documents (multipart)",
            "GET /health": "Health check"
        },
        "timeouts_secs": state.config.timeouts,
        "upload": {
            "max_file_bytes": state.config.upload_limits.max_file_bytes,
            "max_files": state.config.upload_limits.max_files,
            "allowed_types": ["application/json", "application/pdf", "text/plain"]
        }
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let upstream = state.client.health_check().await;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "service": "gateway",
        "upstream": upstream
    }))
}

async fn list_patients(State(state): State<AppState>) -> ApiResult<Vec<PatientSummary>> {
    let patients = state.client.list_patients().await?;
    info!("Listing {} patients", patients.len());
    Ok(Json(patients))
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    patient_id: Option<String>,
    question: Option<String>,
    conversation_history: Option<Vec<HistoryEntry>>,
}

#[derive(Debug, Deserialize)]
struct ReportBody {
    patient_id: Option<String>,
}

async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(body) = body.map_err(invalid_json)?;
    let request = validate_chat(body)?;

    info!(
        patient_id = %mask_pii(&request.patient_id),
        history_len = request.conversation_history.len(),
        "Chat request"
    );

    let mut response = state.client.chat(&request).await?;
    if response.timestamp.is_none() {
        response.timestamp = Some(now_timestamp());
    }
    Ok(Json(response))
}

fn validate_chat(body: ChatBody) -> Result<ChatRequest, ApiError> {
    let patient_id = required("patient_id", body.patient_id)?;
    let question = required("question", body.question)?;
    Ok(ChatRequest {
        patient_id,
        question,
        conversation_history: body.conversation_history.unwrap_or_default(),
    })
}

async fn generate_report(
    State(state): State<AppState>,
    body: Result<Json<ReportBody>, JsonRejection>,
) -> ApiResult<ReportResponse> {
    let Json(body) = body.map_err(invalid_json)?;
    let request = ReportRequest {
        patient_id: required("patient_id", body.patient_id)?,
    };

    info!(
        target: "medchat::report",
        patient_id = %mask_pii(&request.patient_id),
        "Report generation requested"
    );

    let mut response = state.client.generate_report(&request).await?;
    if response.timestamp.is_none() {
        response.timestamp = Some(now_timestamp());
    }
    Ok(Json(response))
}

async fn upload_documents(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Value> {
    let multipart = multipart.map_err(|rejection| {
        ClientError::invalid("Invalid upload", "files", rejection.body_text())
    })?;
    let batch = read_upload(multipart).await?;
    batch.validate(&state.config.upload_limits)?;

    info!(
        patient_id = %mask_pii(&batch.patient_id),
        file_count = batch.files.len(),
        "Upload request"
    );

    let ack = state.client.upload_documents(batch).await?;
    Ok(Json(ack))
}

/// Collects `patient_id` and every `files` part; validation happens afterwards
/// so that the whole batch is judged at once.
async fn read_upload(mut multipart: Multipart) -> Result<UploadBatch, ApiError> {
    let mut patient_id: Option<String> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "patient_id" => {
                if patient_id.is_some() {
                    return Err(ClientError::invalid(
                        "Duplicate field",
                        "patient_id",
                        "patient_id must be sent exactly once",
                    )
                    .into());
                }
                patient_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "files" | "files[]" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let declared_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push(Attachment::new(filename, declared_type, data.to_vec()));
            }
            _ => {}
        }
    }

    let patient_id = required("patient_id", patient_id)?;
    Ok(UploadBatch::new(patient_id, files))
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ClientError::missing_field(field).into()),
    }
}

fn invalid_json(rejection: JsonRejection) -> ApiError {
    ClientError::invalid("Invalid request body", "body", rejection.body_text()).into()
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ClientError::too_large("files", err.body_text()).into()
    } else {
        ClientError::invalid("Invalid upload", "files", err.body_text()).into()
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
