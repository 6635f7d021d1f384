pub mod client;
pub mod contracts;
pub mod conversation;
pub mod error;
pub mod timeouts;
pub mod upload;

// Re-export commonly used types
pub use client::{Endpoints, HttpInferenceClient, InferenceClient, PatientIdPlacement, mask_pii};
pub use contracts::{
    ChatRequest, ChatResponse, ChatTurn, Diagnoses, HistoryEntry, Labs, Medication, PatientInfo,
    PatientSummary, Recommendations, Report, ReportRequest, ReportResponse, Role, ServiceInfo,
    Source,
};
pub use conversation::Conversation;
pub use error::{ClientError, ConfigError, Result, ValidationKind};
pub use timeouts::{Operation, TimeoutClass, TimeoutPolicy};
pub use upload::{Attachment, MediaType, UploadBatch, UploadLimits};
