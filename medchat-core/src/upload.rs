use std::fmt;

use crate::error::{ClientError, Result};

pub const DEFAULT_MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 10;

/// Document formats the AI service can ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Pdf,
    PlainText,
}

impl MediaType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Pdf => "application/pdf",
            MediaType::PlainText => "text/plain",
        }
    }

    /// Parse a declared content type, ignoring parameters such as `charset`.
    pub fn parse(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "application/json" => Some(MediaType::Json),
            "application/pdf" => Some(MediaType::Pdf),
            "text/plain" => Some(MediaType::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
    pub max_files: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl UploadLimits {
    /// Upper bound for a whole multipart request body.
    pub fn max_body_bytes(&self) -> usize {
        // room for part headers and the patient_id field
        self.max_file_bytes
            .saturating_mul(self.max_files)
            .saturating_add(64 * 1024)
    }
}

/// One file as received, with the media type the sender declared for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub declared_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(
        filename: impl Into<String>,
        declared_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            declared_type: declared_type.into(),
            data,
        }
    }

    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::parse(&self.declared_type)
    }
}

/// A patient's documents, accepted or rejected as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub patient_id: String,
    pub files: Vec<Attachment>,
}

impl UploadBatch {
    pub fn new(patient_id: impl Into<String>, files: Vec<Attachment>) -> Self {
        Self {
            patient_id: patient_id.into(),
            files,
        }
    }

    /// Checks the whole batch; a single bad file rejects all of them.
    pub fn validate(&self, limits: &UploadLimits) -> Result<()> {
        if self.patient_id.trim().is_empty() {
            return Err(ClientError::missing_field("patient_id"));
        }
        if self.files.is_empty() {
            return Err(ClientError::invalid(
                "No files uploaded",
                "files",
                "At least one file is required",
            ));
        }
        if self.files.len() > limits.max_files {
            return Err(ClientError::invalid(
                "Too many files",
                "files",
                format!(
                    "At most {} files can be uploaded at once, got {}",
                    limits.max_files,
                    self.files.len()
                ),
            ));
        }

        for file in &self.files {
            if file.media_type().is_none() {
                return Err(ClientError::invalid(
                    "Invalid file type",
                    "files",
                    format!(
                        "'{}' has type '{}'. Only JSON, PDF, and TXT files are allowed.",
                        file.filename, file.declared_type
                    ),
                ));
            }
            if file.data.len() > limits.max_file_bytes {
                return Err(ClientError::too_large(
                    "files",
                    format!(
                        "'{}' is {} bytes, the limit is {} bytes",
                        file.filename,
                        file.data.len(),
                        limits.max_file_bytes
                    ),
                ));
            }
        }

        Ok(())
    }

    pub fn total_bytes(&self) -> usize {
        self.files.iter().map(|f| f.data.len()).sum()
    }
}
