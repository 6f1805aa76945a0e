//! Offline jobs: raw data cleaning and pipeline training.
//!
//! Both jobs are plain functions over a config struct so they can run from
//! the CLI or from tests without any global state.

pub mod features;
pub mod split;
pub mod train;

use thiserror::Error;

use crate::artifact::ArtifactError;
use crate::pipeline::FitError;
use crate::table::TableError;
use crate::table::io::{LoadError, WriteError};

pub use features::{ClipRule, FeatureJobConfig, MULTISIM_FEATURES, MULTISIM_TARGET, engineer_features};
pub use split::stratified_split;
pub use train::{TrainJobConfig, TrainReport};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("input is missing required column(s): {}", .0.join(", "))]
    MissingColumn(Vec<String>),

    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read input: {0}")]
    Load(#[from] LoadError),

    #[error("failed to write output: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("training failed: {0}")]
    Fit(#[from] FitError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
