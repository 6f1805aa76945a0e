//! Ordered target statistics for categorical features.
//!
//! A category is replaced by a smoothed mean of the target over rows with
//! that category:
//!
//! ```text
//! encoded = (sum + prior * a) / (count + a)
//! ```
//!
//! where `prior` is the overall target mean and `a` the prior weight.
//! During fitting, row `i` only sees the statistics of rows `0..i`, so a row's
//! own target never leaks into its encoding. At prediction time the full
//! training statistics are used. Categories never seen in training, and
//! missing values, encode to the prior.
//!
//! Binary targets produce one output per feature (the positive rate).
//! Multiclass targets produce one output per class (one-vs-rest rates).

use std::collections::HashMap;

use crate::table::ColumnData;

/// Accumulated target statistics of one category.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryStats {
    pub count: u32,
    /// Per-output target sums.
    pub sums: Vec<f32>,
}

impl CategoryStats {
    fn new(n_outputs: usize) -> Self {
        Self {
            count: 0,
            sums: vec![0.0; n_outputs],
        }
    }
}

/// Fitted statistics for one categorical feature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureStats {
    categories: HashMap<String, CategoryStats>,
}

impl FeatureStats {
    pub fn from_categories(categories: HashMap<String, CategoryStats>) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &HashMap<String, CategoryStats> {
        &self.categories
    }

    pub fn n_categories(&self) -> usize {
        self.categories.len()
    }
}

/// Target encoder over all categorical features of a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEncoder {
    prior_weight: f32,
    priors: Vec<f32>,
    features: Vec<FeatureStats>,
}

/// Number of encoder outputs per feature for `n_classes` target classes.
pub fn outputs_for_classes(n_classes: usize) -> usize {
    if n_classes <= 2 { 1 } else { n_classes }
}

#[inline]
fn target_value(label: u32, output: usize, n_outputs: usize) -> f32 {
    let hit = if n_outputs == 1 {
        label == 1
    } else {
        label as usize == output
    };
    if hit { 1.0 } else { 0.0 }
}

impl TargetEncoder {
    /// Assemble an encoder from stored parts.
    pub fn from_parts(prior_weight: f32, priors: Vec<f32>, features: Vec<FeatureStats>) -> Self {
        Self {
            prior_weight,
            priors,
            features,
        }
    }

    /// Fit on categorical columns and return the ordered encodings of the
    /// training rows.
    ///
    /// The returned vector holds, for each feature and each output, one
    /// encoded value per row: `encoded[feature][output][row]`.
    pub fn fit_transform(
        columns: &[&ColumnData],
        targets: &[u32],
        n_classes: usize,
        prior_weight: f32,
    ) -> (Self, Vec<Vec<Vec<f32>>>) {
        let n_outputs = outputs_for_classes(n_classes);
        let n_rows = targets.len();

        let priors: Vec<f32> = (0..n_outputs)
            .map(|o| {
                if n_rows == 0 {
                    0.0
                } else {
                    let total: f32 = targets.iter().map(|&t| target_value(t, o, n_outputs)).sum();
                    total / n_rows as f32
                }
            })
            .collect();

        let mut features = Vec::with_capacity(columns.len());
        let mut encoded = Vec::with_capacity(columns.len());

        for column in columns {
            let mut categories: HashMap<String, CategoryStats> = HashMap::new();
            let mut outputs = vec![vec![0.0f32; n_rows]; n_outputs];

            for (row, &label) in targets.iter().enumerate() {
                match column.category_at(row) {
                    None => {
                        for (o, out) in outputs.iter_mut().enumerate() {
                            out[row] = priors[o];
                        }
                    }
                    Some(key) => {
                        let stats = categories
                            .entry(key.into_owned())
                            .or_insert_with(|| CategoryStats::new(n_outputs));
                        for (o, out) in outputs.iter_mut().enumerate() {
                            out[row] = smoothed(stats.sums[o], stats.count, priors[o], prior_weight);
                            stats.sums[o] += target_value(label, o, n_outputs);
                        }
                        stats.count += 1;
                    }
                }
            }

            features.push(FeatureStats { categories });
            encoded.push(outputs);
        }

        (
            Self {
                prior_weight,
                priors,
                features,
            },
            encoded,
        )
    }

    #[inline]
    pub fn n_outputs(&self) -> usize {
        self.priors.len()
    }

    #[inline]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    pub fn prior_weight(&self) -> f32 {
        self.prior_weight
    }

    pub fn priors(&self) -> &[f32] {
        &self.priors
    }

    pub fn features(&self) -> &[FeatureStats] {
        &self.features
    }

    /// Encode one value of categorical feature `feature` into `out`
    /// (length [`n_outputs`](Self::n_outputs)).
    pub fn encode_into(&self, feature: usize, key: Option<&str>, out: &mut [f32]) {
        let stats = key.and_then(|k| self.features[feature].categories.get(k));
        match stats {
            None => out.copy_from_slice(&self.priors),
            Some(stats) => {
                for (o, slot) in out.iter_mut().enumerate() {
                    *slot = smoothed(stats.sums[o], stats.count, self.priors[o], self.prior_weight);
                }
            }
        }
    }

    /// Encode a whole column: `result[output][row]`.
    pub fn encode_column(&self, feature: usize, column: &ColumnData) -> Vec<Vec<f32>> {
        let n_outputs = self.n_outputs();
        let n_rows = column.len();
        let mut outputs = vec![vec![0.0f32; n_rows]; n_outputs];
        let mut scratch = vec![0.0f32; n_outputs];
        for row in 0..n_rows {
            let key = column.category_at(row);
            self.encode_into(feature, key.as_deref(), &mut scratch);
            for (out, &value) in outputs.iter_mut().zip(&scratch) {
                out[row] = value;
            }
        }
        outputs
    }
}

#[inline]
fn smoothed(sum: f32, count: u32, prior: f32, prior_weight: f32) -> f32 {
    let denom = count as f32 + prior_weight;
    if denom > 0.0 {
        (sum + prior * prior_weight) / denom
    } else {
        prior
    }
}
