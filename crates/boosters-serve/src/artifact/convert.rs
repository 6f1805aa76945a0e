//! Conversion between runtime pipeline types and payload types.

use std::collections::HashMap;

use super::ArtifactError;
use super::payload::{
    CategoryPayload, EncoderPayload, FeaturePayload, ForestPayload, LabelPayload, PipelinePayload, TreePayload,
};
use crate::pipeline::encoder::{CategoryStats, FeatureStats};
use crate::pipeline::{ClassificationPipeline, ColumnTransform, Forest, Label, TargetEncoder, Tree};
use crate::schema::{FeatureContract, FeatureKind, FeatureSpec};

// ============================================================================
// Runtime -> Payload
// ============================================================================

impl PipelinePayload {
    pub fn from_pipeline(pipeline: &ClassificationPipeline) -> Self {
        let transform = pipeline.transform();
        Self {
            contract: transform
                .contract()
                .features()
                .iter()
                .map(|spec| FeaturePayload {
                    name: spec.name.clone(),
                    categorical: spec.kind.is_categorical(),
                })
                .collect(),
            encoder: encoder_to_payload(transform.encoder()),
            forest: forest_to_payload(pipeline.forest()),
            classes: pipeline.classes().iter().map(label_to_payload).collect(),
        }
    }

    /// Rebuild the runtime pipeline and run its consistency checks.
    pub fn into_pipeline(self) -> Result<ClassificationPipeline, ArtifactError> {
        let contract = FeatureContract::new(
            self.contract
                .into_iter()
                .map(|f| FeatureSpec {
                    name: f.name,
                    kind: if f.categorical {
                        FeatureKind::Categorical
                    } else {
                        FeatureKind::Numeric
                    },
                })
                .collect(),
        );
        let encoder = payload_to_encoder(self.encoder)?;
        let forest = payload_to_forest(self.forest);
        let classes = self.classes.into_iter().map(payload_to_label).collect();

        Ok(ClassificationPipeline::from_parts(
            ColumnTransform::new(contract, encoder),
            forest,
            classes,
        )?)
    }
}

fn label_to_payload(label: &Label) -> LabelPayload {
    match label {
        Label::Int(v) => LabelPayload::Int(*v),
        Label::Text(v) => LabelPayload::Text(v.clone()),
    }
}

fn payload_to_label(label: LabelPayload) -> Label {
    match label {
        LabelPayload::Int(v) => Label::Int(v),
        LabelPayload::Text(v) => Label::Text(v),
    }
}

fn encoder_to_payload(encoder: &TargetEncoder) -> EncoderPayload {
    let features = encoder
        .features()
        .iter()
        .map(|feature| {
            let mut categories: Vec<CategoryPayload> = feature
                .categories()
                .iter()
                .map(|(key, stats)| CategoryPayload {
                    key: key.clone(),
                    count: stats.count,
                    sums: stats.sums.clone(),
                })
                .collect();
            categories.sort_by(|a, b| a.key.cmp(&b.key));
            categories
        })
        .collect();

    EncoderPayload {
        prior_weight: encoder.prior_weight(),
        priors: encoder.priors().to_vec(),
        features,
    }
}

fn payload_to_encoder(payload: EncoderPayload) -> Result<TargetEncoder, ArtifactError> {
    if !payload.prior_weight.is_finite() || payload.priors.iter().any(|p| !p.is_finite()) {
        return Err(ArtifactError::Corrupt("encoder priors are not finite".into()));
    }

    let mut features = Vec::with_capacity(payload.features.len());
    for categories in payload.features {
        let mut map = HashMap::with_capacity(categories.len());
        for category in categories {
            let stats = CategoryStats {
                count: category.count,
                sums: category.sums,
            };
            if map.insert(category.key, stats).is_some() {
                return Err(ArtifactError::Corrupt("duplicate encoder category".into()));
            }
        }
        features.push(FeatureStats::from_categories(map));
    }
    Ok(TargetEncoder::from_parts(payload.prior_weight, payload.priors, features))
}

fn forest_to_payload(forest: &Forest) -> ForestPayload {
    ForestPayload {
        n_groups: forest.n_groups(),
        base_score: forest.base_score().to_vec(),
        tree_groups: forest.tree_groups().to_vec(),
        trees: forest.trees().map(tree_to_payload).collect(),
    }
}

fn tree_to_payload(tree: &Tree) -> TreePayload {
    TreePayload {
        split_features: tree.split_indices().to_vec(),
        thresholds: tree.split_thresholds().to_vec(),
        left_children: tree.left_children().to_vec(),
        right_children: tree.right_children().to_vec(),
        default_left: tree.default_left().to_vec(),
        is_leaf: tree.leaf_flags().to_vec(),
        leaf_values: tree.leaf_values().to_vec(),
    }
}

/// Structural checks happen in [`ClassificationPipeline::from_parts`].
fn payload_to_forest(payload: ForestPayload) -> Forest {
    let trees = payload
        .trees
        .into_iter()
        .map(|t| {
            Tree::new(
                t.split_features,
                t.thresholds,
                t.left_children,
                t.right_children,
                t.default_left,
                t.is_leaf,
                t.leaf_values,
            )
        })
        .collect();
    Forest::from_parts(trees, payload.tree_groups, payload.n_groups, payload.base_score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineValidationError;
    use crate::testing;

    #[test]
    fn pipeline_roundtrip() {
        let pipeline = testing::fitted_pipeline();
        let restored = PipelinePayload::from_pipeline(&pipeline).into_pipeline().unwrap();
        assert_eq!(restored, pipeline);
    }

    #[test]
    fn categories_are_sorted() {
        let payload = PipelinePayload::from_pipeline(&testing::fitted_pipeline());
        for feature in &payload.encoder.features {
            assert!(feature.windows(2).all(|w| w[0].key < w[1].key));
        }
    }

    #[test]
    fn invalid_structure_is_rejected() {
        let mut payload = PipelinePayload::from_pipeline(&testing::fitted_pipeline());
        let tree = payload.forest.trees.iter_mut().find(|t| !t.is_leaf[0]).unwrap();
        tree.left_children[0] = 10_000;
        assert!(matches!(
            payload.into_pipeline(),
            Err(ArtifactError::Invalid(PipelineValidationError::Forest(_)))
        ));

        let mut payload = PipelinePayload::from_pipeline(&testing::fitted_pipeline());
        payload.classes.truncate(1);
        assert!(matches!(
            payload.into_pipeline(),
            Err(ArtifactError::Invalid(PipelineValidationError::TooFewClasses(1)))
        ));
    }

    #[test]
    fn duplicate_category_is_rejected() {
        let mut payload = PipelinePayload::from_pipeline(&testing::fitted_pipeline());
        let feature = payload.encoder.features.iter_mut().find(|f| !f.is_empty()).unwrap();
        let first = feature[0].clone();
        feature.push(first);
        assert!(matches!(payload.into_pipeline(), Err(ArtifactError::Corrupt(_))));
    }
}
