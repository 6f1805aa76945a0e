//! Pipeline artifact storage.
//!
//! A fitted [`ClassificationPipeline`] is persisted as a single `.bsrv` file:
//! a fixed header ([`native`]) framing a zstd-compressed postcard payload
//! ([`payload`]). Loading verifies the checksum, decodes the payload and then
//! re-validates the pipeline structure, so a successfully opened artifact is
//! safe to predict with.
//!
//! ```ignore
//! use boosters_serve::artifact::ArtifactStore;
//!
//! ArtifactStore::save("models/multisim_gbdt.bsrv", &pipeline)?;
//! let predictor = ArtifactStore::open("models/multisim_gbdt.bsrv")?;
//! ```

pub mod convert;
pub mod native;
pub mod payload;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::pipeline::{ClassificationPipeline, PipelineValidationError, Predictor};

pub use native::{FormatFlags, FormatHeader, ModelType, NativeCodec};
pub use payload::{ArtifactMetadata, Payload, PayloadV1, PipelinePayload};

/// File extension used for pipeline artifacts.
pub const ARTIFACT_EXTENSION: &str = "bsrv";

// ============================================================================
// Errors
// ============================================================================

/// Failures while reading or writing an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("not a pipeline artifact (invalid magic bytes)")]
    NotAnArtifact,

    #[error("unsupported artifact version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("artifact truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("corrupt artifact: {0}")]
    Corrupt(String),

    #[error("compression failed: {0}")]
    Compression(#[source] io::Error),

    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    #[error("payload encoding failed: {0}")]
    Encoding(#[source] postcard::Error),

    #[error("payload decoding failed: {0}")]
    Decoding(#[source] postcard::Error),

    #[error("artifact holds an inconsistent pipeline: {0}")]
    Invalid(#[from] PipelineValidationError),
}

impl ArtifactError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::Missing(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

// ============================================================================
// Loaded artifact
// ============================================================================

/// Everything decoded from an artifact.
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub header: FormatHeader,
    pub metadata: ArtifactMetadata,
    pub pipeline: ClassificationPipeline,
}

// ============================================================================
// ArtifactStore
// ============================================================================

/// Reads and writes pipeline artifacts.
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    codec: NativeCodec,
}

impl ArtifactStore {
    pub fn new(codec: NativeCodec) -> Self {
        Self { codec }
    }

    /// Load the artifact at `path` as a shareable predictor.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<dyn Predictor>, ArtifactError> {
        let loaded = Self::default().load(path)?;
        Ok(Arc::new(loaded.pipeline))
    }

    /// Write `pipeline` to `path` with default metadata.
    pub fn save(path: impl AsRef<Path>, pipeline: &ClassificationPipeline) -> Result<(), ArtifactError> {
        Self::default().write(path, pipeline, &ArtifactMetadata::new())
    }

    /// Read and fully decode the artifact at `path`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedArtifact, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
        let loaded = self.from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            n_features = loaded.header.num_features,
            n_classes = loaded.header.num_classes,
            n_trees = loaded.pipeline.forest().n_trees(),
            "loaded pipeline artifact"
        );
        Ok(loaded)
    }

    /// Read only the header of the artifact at `path`.
    pub fn read_header(&self, path: impl AsRef<Path>) -> Result<FormatHeader, ArtifactError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| ArtifactError::io(path, e))?;
        self.codec.read_header(&bytes)
    }

    /// Write atomically: the bytes go to a temporary file in the target
    /// directory which is then renamed over `path`.
    pub fn write(
        &self,
        path: impl AsRef<Path>,
        pipeline: &ClassificationPipeline,
        metadata: &ArtifactMetadata,
    ) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let bytes = self.to_bytes(pipeline, metadata)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ArtifactError::io(dir, e))?;
        tmp.write_all(&bytes).map_err(|e| ArtifactError::io(path, e))?;
        tmp.as_file().sync_all().map_err(|e| ArtifactError::io(path, e))?;
        tmp.persist(path).map_err(|e| ArtifactError::io(path, e.error))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "saved pipeline artifact");
        Ok(())
    }

    /// Encode to artifact bytes.
    pub fn to_bytes(
        &self,
        pipeline: &ClassificationPipeline,
        metadata: &ArtifactMetadata,
    ) -> Result<Vec<u8>, ArtifactError> {
        let contract = pipeline.transform().contract();
        let mut header = FormatHeader::new(
            ModelType::ClassificationPipeline,
            contract.len() as u32,
            pipeline.n_classes() as u32,
        );
        if contract.categorical().next().is_some() {
            header.flags.set(FormatFlags::HAS_CATEGORICAL);
        }

        let payload = Payload::V1(PayloadV1 {
            metadata: metadata.clone(),
            pipeline: PipelinePayload::from_pipeline(pipeline),
        });
        let raw = postcard::to_allocvec(&payload).map_err(ArtifactError::Encoding)?;
        self.codec.encode(header, &raw)
    }

    /// Decode artifact bytes and validate the pipeline.
    pub fn from_bytes(&self, bytes: &[u8]) -> Result<LoadedArtifact, ArtifactError> {
        let (header, raw) = self.codec.decode(bytes)?;
        let Payload::V1(v1) = postcard::from_bytes::<Payload>(&raw).map_err(ArtifactError::Decoding)?;

        let pipeline = v1.pipeline.into_pipeline()?;
        if pipeline.transform().contract().len() != header.num_features as usize
            || pipeline.n_classes() != header.num_classes as usize
        {
            return Err(ArtifactError::Corrupt(
                "header dimensions disagree with the payload".into(),
            ));
        }

        Ok(LoadedArtifact {
            header,
            metadata: v1.metadata,
            pipeline,
        })
    }
}
