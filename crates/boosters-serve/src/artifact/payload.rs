//! Serializable payload structures.
//!
//! These mirror the runtime types but stay stable across refactors of the
//! runtime representation. Postcard encodes them compactly; all collections
//! are ordered so equal pipelines produce equal bytes.

use serde::{Deserialize, Serialize};

/// Versioned root payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    V1(PayloadV1),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadV1 {
    pub metadata: ArtifactMetadata,
    pub pipeline: PipelinePayload,
}

/// Free-form provenance stored next to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Tool and version that wrote the artifact.
    pub producer: String,
    /// Ordered key/value pairs, e.g. training metrics.
    pub attributes: Vec<(String, String)>,
}

impl ArtifactMetadata {
    pub fn new() -> Self {
        Self {
            producer: concat!("boosters-serve ", env!("CARGO_PKG_VERSION")).to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePayload {
    pub contract: Vec<FeaturePayload>,
    pub encoder: EncoderPayload,
    pub forest: ForestPayload,
    pub classes: Vec<LabelPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub name: String,
    pub categorical: bool,
}

/// Postcard does not support untagged enums, so labels get their own tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LabelPayload {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderPayload {
    pub prior_weight: f32,
    pub priors: Vec<f32>,
    /// One table per categorical feature, categories sorted by key.
    pub features: Vec<Vec<CategoryPayload>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPayload {
    pub key: String,
    pub count: u32,
    pub sums: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestPayload {
    pub n_groups: u32,
    pub base_score: Vec<f32>,
    pub tree_groups: Vec<u32>,
    pub trees: Vec<TreePayload>,
}

/// Structure-of-arrays tree, one entry per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreePayload {
    pub split_features: Vec<u32>,
    pub thresholds: Vec<f32>,
    pub left_children: Vec<u32>,
    pub right_children: Vec<u32>,
    pub default_left: Vec<bool>,
    pub is_leaf: Vec<bool>,
    pub leaf_values: Vec<f32>,
}
