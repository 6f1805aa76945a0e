//! Inference request handling.
//!
//! [`InferenceService::handle`] is the transport-neutral request boundary:
//! bytes and a file name go in, one label per row (or a classified error)
//! comes out. Any transport maps [`ServeError::http_status`] and
//! [`ErrorBody`] onto its own response type.
//!
//! # Request flow
//!
//! ```text
//! UploadedBlob ──load──▶ TabularTable ──guard──▶ TabularTable ──predict──▶ Vec<Label>
//!               │                      │                       │
//!     UnsupportedFormat          EmptyInput            PredictionFailure
//!     MalformedInput             SchemaMismatch
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::config::ServeConfig;
use crate::pipeline::{Label, Predictor};
use crate::schema::{GuardError, SchemaGuard, mismatch_message};
use crate::table::io::{self, SUPPORTED_EXTENSIONS, TableFormat};

// =============================================================================
// Request / response types
// =============================================================================

/// An uploaded file: raw bytes plus the client-supplied file name.
#[derive(Debug, Clone)]
pub struct UploadedBlob {
    pub bytes: Vec<u8>,
    pub filename: String,
}

impl UploadedBlob {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }
}

/// One label per input row, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    labels: Vec<Label>,
}

impl PredictionResult {
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn into_labels(self) -> Vec<Label> {
        self.labels
    }
}

/// Success body: `{"predictions": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: Vec<Label>,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            predictions: result.labels,
        }
    }
}

/// Who is at fault for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    BadInput,
    ServerFault,
}

/// Failure body: `{"status": ..., "error": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: StatusClass,
    pub error: String,
    pub message: String,
}

impl From<&ServeError> for ErrorBody {
    fn from(err: &ServeError) -> Self {
        Self {
            status: err.status(),
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Request failures as seen by the caller.
///
/// Messages never include parser or model internals; those are logged.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error(
        "unsupported file format for `{filename}`: expected one of {expected}",
        expected = SUPPORTED_EXTENSIONS.join(", ")
    )]
    UnsupportedFormat { filename: String },

    #[error("uploaded file could not be parsed as {format}")]
    MalformedInput { format: TableFormat },

    #[error("uploaded file contains no rows")]
    EmptyInput,

    #[error("{}", mismatch_message(.missing, .invalid))]
    SchemaMismatch { missing: Vec<String>, invalid: Vec<String> },

    #[error("prediction failed")]
    PredictionFailure,

    #[error("failed to load model artifact: {0}")]
    ArtifactLoad(#[from] ArtifactError),
}

impl ServeError {
    pub fn status(&self) -> StatusClass {
        match self {
            Self::UnsupportedFormat { .. } | Self::MalformedInput { .. } | Self::EmptyInput | Self::SchemaMismatch { .. } => {
                StatusClass::BadInput
            }
            Self::PredictionFailure | Self::ArtifactLoad(_) => StatusClass::ServerFault,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self.status() {
            StatusClass::BadInput => 400,
            StatusClass::ServerFault => 500,
        }
    }

    /// Stable machine-readable error identifier.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::MalformedInput { .. } => "malformed_input",
            Self::EmptyInput => "empty_input",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::PredictionFailure => "prediction_failure",
            Self::ArtifactLoad(_) => "artifact_load",
        }
    }
}

impl From<GuardError> for ServeError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::EmptyInput => Self::EmptyInput,
            GuardError::SchemaMismatch { missing, invalid } => Self::SchemaMismatch { missing, invalid },
        }
    }
}

// =============================================================================
// InferenceService
// =============================================================================

/// Stateless request handler around a shared predictor.
#[derive(Debug, Clone)]
pub struct InferenceService {
    predictor: Arc<dyn Predictor>,
    guard: Arc<SchemaGuard>,
}

impl InferenceService {
    pub fn new(predictor: Arc<dyn Predictor>) -> Self {
        let guard = Arc::new(SchemaGuard::new(predictor.contract().clone()));
        Self { predictor, guard }
    }

    /// Load the configured artifact.
    pub fn from_config(config: &ServeConfig) -> Result<Self, ServeError> {
        let predictor = ArtifactStore::open(&config.artifact_path)?;
        Ok(Self::new(predictor))
    }

    pub fn predictor(&self) -> &Arc<dyn Predictor> {
        &self.predictor
    }

    /// Handle one upload.
    pub fn handle(&self, blob: UploadedBlob) -> Result<PredictionResult, ServeError> {
        let span = tracing::info_span!("predict", filename = %blob.filename, bytes = blob.bytes.len());
        let _guard = span.enter();

        let UploadedBlob { bytes, filename } = blob;
        let Some(format) = TableFormat::from_filename(&filename) else {
            tracing::info!("rejected upload with unsupported format");
            return Err(ServeError::UnsupportedFormat { filename });
        };

        let table = io::load_as(&bytes, format).map_err(|err| {
            tracing::warn!(%format, error = %err, "failed to parse upload");
            ServeError::MalformedInput { format }
        })?;
        drop(bytes);

        let table = self.guard.validate(table).inspect_err(|err| {
            tracing::info!(error = %err, "upload rejected by schema guard");
        })?;

        let n_rows = table.n_rows();
        let labels = self.predictor.predict(&table).map_err(|err| {
            tracing::error!(error = %err, n_rows, "prediction failed");
            ServeError::PredictionFailure
        })?;

        if labels.len() != n_rows {
            tracing::error!(n_rows, n_labels = labels.len(), "predictor returned wrong number of labels");
            return Err(ServeError::PredictionFailure);
        }

        tracing::info!(n_rows, "prediction complete");
        Ok(PredictionResult { labels })
    }

    /// Handle one upload and render the JSON body with its HTTP status.
    pub fn respond(&self, blob: UploadedBlob) -> (u16, serde_json::Value) {
        let rendered = match self.handle(blob) {
            Ok(result) => serde_json::to_value(PredictionResponse::from(result)).map(|body| (200, body)),
            Err(err) => serde_json::to_value(ErrorBody::from(&err)).map(|body| (err.http_status(), body)),
        };
        rendered.unwrap_or_else(|err| {
            tracing::error!(error = %err, "failed to render response");
            (500, serde_json::json!({ "status": "server_fault", "error": "render_failure", "message": "internal error" }))
        })
    }
}
