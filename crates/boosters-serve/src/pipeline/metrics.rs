//! Evaluation metrics for the training job.

use ndarray::ArrayView2;

/// Clamp for probabilities before the logarithm.
const EPS: f64 = 1e-15;

/// Fraction of rows whose predicted class index matches the truth.
///
/// Returns `0.0` for empty input.
pub fn accuracy(truth: &[u32], predicted: &[u32]) -> f64 {
    debug_assert_eq!(truth.len(), predicted.len());
    if truth.is_empty() {
        return 0.0;
    }
    let hits = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    hits as f64 / truth.len() as f64
}

/// Multiclass cross-entropy: `-mean(log(p_true_class))`.
///
/// `probabilities` has shape `[n_rows, n_classes]`; labels are class indices.
/// Binary problems use the same formula with two columns.
pub fn log_loss(probabilities: ArrayView2<'_, f32>, truth: &[u32]) -> f64 {
    let (n_rows, n_classes) = probabilities.dim();
    debug_assert_eq!(n_rows, truth.len());
    if n_rows == 0 || n_classes == 0 {
        return 0.0;
    }

    let total: f64 = truth
        .iter()
        .enumerate()
        .map(|(row, &label)| {
            let p = probabilities
                .get([row, label as usize])
                .map_or(0.0, |&p| p as f64)
                .clamp(EPS, 1.0 - EPS);
            -p.ln()
        })
        .sum();
    total / n_rows as f64
}

/// Index of the largest value in each row. Ties pick the lowest index.
pub fn argmax_rows(probabilities: ArrayView2<'_, f32>) -> Vec<u32> {
    probabilities
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0usize;
            for (idx, &value) in row.iter().enumerate() {
                if value > row[best] {
                    best = idx;
                }
            }
            best as u32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn accuracy_counts_matches() {
        assert_abs_diff_eq!(accuracy(&[0, 1, 1, 0], &[0, 1, 0, 0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn log_loss_of_known_probabilities() {
        let probs = array![[0.9f32, 0.1], [0.2, 0.8]];
        let expected = -(0.9f64.ln() + 0.8f64.ln()) / 2.0;
        assert_abs_diff_eq!(log_loss(probs.view(), &[0, 1]), expected, epsilon = 1e-6);
    }

    #[test]
    fn log_loss_clamps_zero_probability() {
        let probs = array![[1.0f32, 0.0]];
        let loss = log_loss(probs.view(), &[1]);
        assert!(loss.is_finite());
        assert!(loss > 30.0);
    }

    #[test]
    fn argmax_prefers_first_on_ties() {
        let probs = array![[0.5f32, 0.5], [0.1, 0.9], [0.2, 0.3]];
        assert_eq!(argmax_rows(probs.view()), vec![0, 1, 1]);
    }
}
