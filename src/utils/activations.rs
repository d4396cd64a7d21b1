//! Activation functions applied between layers.
//!
//! All functions operate in-place on `ndarray` matrices whose rows are
//! samples, matching how the network stores a batch.

use ndarray::{Array2, ArrayView2};

/// ReLU applied in-place: negative entries become 0, the rest are unchanged.
pub fn relu_inplace(values: &mut Array2<f32>) {
    values.mapv_inplace(|v| if v < 0.0 { 0.0 } else { v });
}

/// Zero out gradient entries wherever the forward ReLU output was inactive.
///
/// `activated` must be the matrix produced by [`relu_inplace`] during the
/// forward pass, with the same shape as `gradient`.
pub fn relu_backward_inplace(gradient: &mut Array2<f32>, activated: &ArrayView2<f32>) {
    assert_eq!(
        gradient.dim(),
        activated.dim(),
        "gradient shape {:?} does not match activation shape {:?}",
        gradient.dim(),
        activated.dim()
    );
    for (grad, &out) in gradient.iter_mut().zip(activated.iter()) {
        if out <= 0.0 {
            *grad = 0.0;
        }
    }
}

/// Row-wise softmax applied in-place, converting logits to probabilities.
///
/// The row maximum is subtracted before exponentiation so large logits do not
/// overflow to infinity.
pub fn softmax_inplace(scores: &mut Array2<f32>) {
    if scores.ncols() == 0 {
        return;
    }

    for mut row in scores.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max).exp();
            sum += *value;
        }

        let inv_sum = 1.0 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}
