//! boosters-serve: batch tabular inference for gradient boosted classifiers.
//!
//! A client uploads a data file; the service decodes it into a typed table,
//! checks it against the feature contract of a pretrained pipeline and
//! returns one class label per row. Offline jobs clean the raw data and fit
//! the pipeline that the service loads at startup.
//!
//! # Key Types
//!
//! - [`InferenceService`] - Request boundary: [`UploadedBlob`] in, labels or [`ServeError`] out
//! - [`TabularTable`] - Typed in-memory table produced by [`table::io::load`]
//! - [`SchemaGuard`] / [`FeatureContract`] - Input validation
//! - [`ClassificationPipeline`] - Target encoder plus boosted forest
//! - [`ArtifactStore`] - Checksummed pipeline persistence
//!
//! # Serving
//!
//! ```ignore
//! use boosters_serve::{InferenceService, ServeConfig, UploadedBlob};
//!
//! let service = InferenceService::from_config(&ServeConfig::default())?;
//! let result = service.handle(UploadedBlob::new(bytes, "batch.csv"))?;
//! ```
//!
//! # Training
//!
//! See [`jobs::features`] and [`jobs::train`].

pub mod artifact;
pub mod config;
pub mod jobs;
pub mod logging;
pub mod pipeline;
pub mod schema;
pub mod service;
pub mod table;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use artifact::{ArtifactError, ArtifactStore};
pub use config::{LoggingConfig, ServeConfig};
pub use pipeline::{ClassificationPipeline, Label, PipelineConfig, Predictor};
pub use schema::{FeatureContract, FeatureKind, FeatureSpec, GuardError, SchemaGuard};
pub use service::{ErrorBody, InferenceService, PredictionResponse, PredictionResult, ServeError, StatusClass, UploadedBlob};
pub use table::{Column, ColumnData, TabularTable};

pub use utils::{Parallelism, run_with_threads};
