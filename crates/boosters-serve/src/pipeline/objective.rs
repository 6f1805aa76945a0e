//! Classification objectives.
//!
//! Training buffers (margins, gradients) use the output-major layout
//! `values[output * n_rows + row]`. Inference margins arrive as a
//! `[n_rows, n_outputs]` array.

use ndarray::{Array2, ArrayView2};

/// Gradient and hessian of one sample for one output.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GradsTuple {
    pub grad: f32,
    pub hess: f32,
}

/// Hessians are floored so leaves with confident predictions stay finite.
const HESS_MIN: f32 = 1e-6;

/// Probabilities are clamped before taking logarithms.
const PROB_EPS: f64 = 1e-7;

/// Objective used to fit the forest and to turn margins into probabilities.
pub trait ObjectiveFn: Send + Sync {
    /// Number of margin outputs (forest groups).
    fn n_outputs(&self) -> usize;

    /// Fill `grad_hess` from current margins and class-index targets.
    fn compute_gradients(
        &self,
        n_rows: usize,
        predictions: &[f32],
        targets: &[u32],
        grad_hess: &mut [GradsTuple],
    );

    /// Initial margin per output.
    fn compute_base_score(&self, targets: &[u32], outputs: &mut [f32]);

    /// Class probabilities from margins.
    ///
    /// `margins` has shape `[n_rows, n_outputs]`; the result has shape
    /// `[n_rows, n_classes]` and each row sums to one.
    fn class_probabilities(&self, margins: ArrayView2<'_, f32>) -> Array2<f32>;

    fn name(&self) -> &'static str;
}

/// Objective for a target with `n_classes` distinct labels.
pub fn objective_for(n_classes: usize) -> Box<dyn ObjectiveFn> {
    if n_classes <= 2 {
        Box::new(LogisticLoss)
    } else {
        Box::new(SoftmaxLoss::new(n_classes))
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// =============================================================================
// Logistic Loss
// =============================================================================

/// Binary cross-entropy on log-odds margins.
///
/// - Gradient: `σ(pred) - y`
/// - Hessian: `σ(pred) * (1 - σ(pred))`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogisticLoss;

impl ObjectiveFn for LogisticLoss {
    fn n_outputs(&self) -> usize {
        1
    }

    fn compute_gradients(
        &self,
        n_rows: usize,
        predictions: &[f32],
        targets: &[u32],
        grad_hess: &mut [GradsTuple],
    ) {
        debug_assert_eq!(predictions.len(), n_rows);
        debug_assert_eq!(grad_hess.len(), n_rows);

        for ((pair, &pred), &label) in grad_hess.iter_mut().zip(predictions).zip(targets) {
            let p = sigmoid(pred);
            let y = label as f32;
            pair.grad = p - y;
            pair.hess = (p * (1.0 - p)).max(HESS_MIN);
        }
    }

    fn compute_base_score(&self, targets: &[u32], outputs: &mut [f32]) {
        if targets.is_empty() {
            outputs[0] = 0.0;
            return;
        }
        let positives = targets.iter().filter(|&&t| t == 1).count() as f64;
        let p = (positives / targets.len() as f64).clamp(PROB_EPS, 1.0 - PROB_EPS);
        outputs[0] = (p / (1.0 - p)).ln() as f32;
    }

    fn class_probabilities(&self, margins: ArrayView2<'_, f32>) -> Array2<f32> {
        let n_rows = margins.nrows();
        let mut out = Array2::zeros((n_rows, 2));
        for (row, &margin) in margins.column(0).iter().enumerate() {
            let p = sigmoid(margin);
            out[[row, 0]] = 1.0 - p;
            out[[row, 1]] = p;
        }
        out
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}

// =============================================================================
// Softmax Loss
// =============================================================================

/// Multiclass cross-entropy with one margin per class.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxLoss {
    pub num_classes: usize,
}

impl SoftmaxLoss {
    pub fn new(num_classes: usize) -> Self {
        debug_assert!(num_classes >= 2, "num_classes must be >= 2");
        Self { num_classes }
    }
}

impl ObjectiveFn for SoftmaxLoss {
    fn n_outputs(&self) -> usize {
        self.num_classes
    }

    fn compute_gradients(
        &self,
        n_rows: usize,
        predictions: &[f32],
        targets: &[u32],
        grad_hess: &mut [GradsTuple],
    ) {
        let k = self.num_classes;
        debug_assert_eq!(predictions.len(), k * n_rows);
        debug_assert_eq!(grad_hess.len(), k * n_rows);

        for (i, &label) in targets.iter().enumerate().take(n_rows) {
            let label = label as usize;
            let max_logit = (0..k)
                .map(|c| predictions[c * n_rows + i])
                .fold(f32::NEG_INFINITY, f32::max);
            let exp_sum: f32 = (0..k)
                .map(|c| (predictions[c * n_rows + i] - max_logit).exp())
                .sum();

            for c in 0..k {
                let idx = c * n_rows + i;
                let p = (predictions[idx] - max_logit).exp() / exp_sum;
                let indicator = if c == label { 1.0 } else { 0.0 };
                grad_hess[idx].grad = p - indicator;
                grad_hess[idx].hess = (p * (1.0 - p)).max(HESS_MIN);
            }
        }
    }

    fn compute_base_score(&self, targets: &[u32], outputs: &mut [f32]) {
        let k = self.num_classes;
        if targets.is_empty() {
            outputs[..k].fill(0.0);
            return;
        }
        let mut counts = vec![0usize; k];
        for &t in targets {
            if let Some(count) = counts.get_mut(t as usize) {
                *count += 1;
            }
        }
        let total = targets.len() as f64;
        for (out, &count) in outputs.iter_mut().zip(&counts) {
            let p = (count as f64 / total).clamp(PROB_EPS, 1.0 - PROB_EPS);
            *out = p.ln() as f32;
        }
    }

    fn class_probabilities(&self, margins: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = margins.to_owned();
        for mut row in out.rows_mut() {
            let max_val = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            row.mapv_inplace(|x| (x - max_val).exp());
            let sum = row.sum();
            if sum > 0.0 {
                row.mapv_inplace(|x| x / sum);
            }
        }
        out
    }

    fn name(&self) -> &'static str {
        "softmax"
    }
}

// =============================================================================
// Tests
// =============================================================================
