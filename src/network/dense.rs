//! Dense (fully connected) layer.
//!
//! Each layer performs the linear transformation `y = xW + b` on a batch of
//! row vectors and carries an explicit [`LayerRole`] assigned at
//! construction, so a layer's place in the stack never has to be inferred
//! from its position.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::utils::SimpleRng;

/// Role a dense layer plays inside the network.
///
/// The role decides which activation follows the linear step: hidden layers
/// are followed by ReLU, the output layer by softmax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerRole {
    /// Interior layer, activated with ReLU.
    Hidden,
    /// Final layer, activated with softmax over the class scores.
    Output,
}

/// Dense layer with weights, biases and an explicit role.
///
/// Weights form an `input_size x output_size` matrix so a batch stored as
/// rows multiplies straight through: `(n x in) . (in x out) = (n x out)`.
///
/// # Examples
///
/// ```
/// use mnist_trainer::network::{DenseLayer, LayerRole};
/// use mnist_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(784, 128, LayerRole::Hidden, &mut rng);
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 128);
/// assert_eq!(layer.parameter_count(), 784 * 128 + 128);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    role: LayerRole,
    weights: Array2<f32>,
    bias: Array1<f32>,
    #[serde(skip)]
    weight_grad: Option<Array2<f32>>,
    #[serde(skip)]
    bias_grad: Option<Array1<f32>>,
}

impl DenseLayer {
    /// Create a layer with Xavier-initialized weights and zero biases.
    ///
    /// Weights are drawn uniformly from `[-limit, limit]` with
    /// `limit = sqrt(6 / (input_size + output_size))`, which keeps early
    /// activations in a sane range for both ReLU and softmax layers.
    ///
    /// # Panics
    ///
    /// Panics when either size is zero.
    pub fn new(
        input_size: usize,
        output_size: usize,
        role: LayerRole,
        rng: &mut SimpleRng,
    ) -> Self {
        assert!(input_size > 0, "layer input size must be nonzero");
        assert!(output_size > 0, "layer output size must be nonzero");

        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();
        let weights =
            Array2::from_shape_fn((input_size, output_size), |_| rng.gen_range(-limit, limit));

        Self {
            input_size,
            output_size,
            role,
            weights,
            bias: Array1::zeros(output_size),
            weight_grad: None,
            bias_grad: None,
        }
    }

    /// Number of input features.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of output features.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// The role assigned at construction.
    pub fn role(&self) -> LayerRole {
        self.role
    }

    /// Number of trainable parameters (weights plus biases).
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    /// Compute the linear output `input . W + b` for a batch of rows.
    ///
    /// The caller applies the activation matching [`DenseLayer::role`].
    ///
    /// # Panics
    ///
    /// Panics when `input` does not have `input_size` columns.
    pub fn forward(&self, input: &ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(
            input.ncols(),
            self.input_size,
            "input has {} columns, layer expects {}",
            input.ncols(),
            self.input_size
        );
        input.dot(&self.weights) + &self.bias
    }

    /// Accumulate parameter gradients and return the gradient with respect
    /// to the layer input.
    ///
    /// `input` must be the same batch passed to [`DenseLayer::forward`] and
    /// `delta` the loss gradient at this layer's pre-activation output.
    ///
    /// # Panics
    ///
    /// Panics when the shapes do not line up with the forward pass.
    pub fn backward(&mut self, input: &ArrayView2<f32>, delta: &ArrayView2<f32>) -> Array2<f32> {
        assert_eq!(
            input.nrows(),
            delta.nrows(),
            "input batch {} does not match delta batch {}",
            input.nrows(),
            delta.nrows()
        );
        assert_eq!(input.ncols(), self.input_size, "input width mismatch");
        assert_eq!(delta.ncols(), self.output_size, "delta width mismatch");

        self.weight_grad = Some(input.t().dot(delta));
        self.bias_grad = Some(delta.sum_axis(Axis(0)));
        delta.dot(&self.weights.t())
    }

    /// Apply the gradients accumulated by the last [`DenseLayer::backward`]
    /// call, scaled by `learning_rate`, then clear them.
    ///
    /// # Panics
    ///
    /// Panics when no gradients are pending.
    pub fn apply_gradients(&mut self, learning_rate: f32) {
        let weight_grad = self
            .weight_grad
            .take()
            .expect("apply_gradients called without a pending backward pass");
        let bias_grad = self
            .bias_grad
            .take()
            .expect("apply_gradients called without a pending backward pass");

        self.weights -= &(weight_grad * learning_rate);
        self.bias -= &(bias_grad * learning_rate);
    }

    /// Check that the stored parameter shapes match the declared sizes.
    ///
    /// Deserialized checkpoints go through this before being trusted.
    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.output_size == 0 {
            return Err("layer has a zero dimension".to_string());
        }
        if self.weights.dim() != (self.input_size, self.output_size) {
            return Err(format!(
                "weight matrix is {:?}, expected ({}, {})",
                self.weights.dim(),
                self.input_size,
                self.output_size
            ));
        }
        if self.bias.len() != self.output_size {
            return Err(format!(
                "bias vector has length {}, expected {}",
                self.bias.len(),
                self.output_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_creation_shapes_and_parameter_count() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(10, 5, LayerRole::Hidden, &mut rng);

        assert_eq!(layer.input_size(), 10);
        assert_eq!(layer.output_size(), 5);
        assert_eq!(layer.role(), LayerRole::Hidden);
        assert_eq!(layer.weights.dim(), (10, 5));
        assert_eq!(layer.bias.len(), 5);
        assert_eq!(layer.parameter_count(), 55);
    }

    #[test]
    fn test_xavier_initialization_bounds() {
        let mut rng = SimpleRng::new(42);
        let layer = DenseLayer::new(100, 50, LayerRole::Hidden, &mut rng);

        // limit = sqrt(6 / 150) = 0.2
        let limit = (6.0f32 / 150.0).sqrt();
        for &weight in layer.weights.iter() {
            assert!(
                (-limit..=limit).contains(&weight),
                "weight {} outside [{}, {}]",
                weight,
                -limit,
                limit
            );
        }
        assert!(layer.bias.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_same_seed_gives_identical_weights() {
        let mut rng_a = SimpleRng::new(9);
        let mut rng_b = SimpleRng::new(9);

        let a = DenseLayer::new(12, 6, LayerRole::Output, &mut rng_a);
        let b = DenseLayer::new(12, 6, LayerRole::Output, &mut rng_b);

        assert_eq!(a.weights, b.weights);
        assert_eq!(a.bias, b.bias);
    }

    #[test]
    #[should_panic(expected = "input size must be nonzero")]
    fn test_zero_input_size_panics() {
        let mut rng = SimpleRng::new(1);
        DenseLayer::new(0, 4, LayerRole::Hidden, &mut rng);
    }

    #[test]
    fn test_forward_matches_hand_computation() {
        let mut rng = SimpleRng::new(3);
        let mut layer = DenseLayer::new(2, 2, LayerRole::Hidden, &mut rng);
        layer.weights = array![[1.0, 2.0], [3.0, 4.0]];
        layer.bias = array![0.5, -0.5];

        let input = array![[1.0, 1.0], [2.0, 0.0]];
        let output = layer.forward(&input.view());

        // Row 0: [1+3+0.5, 2+4-0.5], row 1: [2+0.5, 4-0.5]
        assert_relative_eq!(output[[0, 0]], 4.5);
        assert_relative_eq!(output[[0, 1]], 5.5);
        assert_relative_eq!(output[[1, 0]], 2.5);
        assert_relative_eq!(output[[1, 1]], 3.5);
    }

    #[test]
    fn test_backward_produces_expected_gradients() {
        let mut rng = SimpleRng::new(3);
        let mut layer = DenseLayer::new(2, 1, LayerRole::Output, &mut rng);
        layer.weights = array![[2.0], [-1.0]];
        layer.bias = array![0.0];

        let input = array![[1.0, 2.0], [3.0, 4.0]];
        let delta = array![[0.5], [1.0]];

        let grad_input = layer.backward(&input.view(), &delta.view());

        // dW = input^T . delta, db = column sums of delta
        let weight_grad = layer.weight_grad.as_ref().unwrap();
        assert_relative_eq!(weight_grad[[0, 0]], 0.5 + 3.0);
        assert_relative_eq!(weight_grad[[1, 0]], 1.0 + 4.0);
        assert_relative_eq!(layer.bias_grad.as_ref().unwrap()[0], 1.5);

        // dX = delta . W^T
        assert_relative_eq!(grad_input[[0, 0]], 1.0);
        assert_relative_eq!(grad_input[[0, 1]], -0.5);
        assert_relative_eq!(grad_input[[1, 0]], 2.0);
        assert_relative_eq!(grad_input[[1, 1]], -1.0);
    }

    #[test]
    fn test_apply_gradients_steps_against_the_gradient() {
        let mut rng = SimpleRng::new(3);
        let mut layer = DenseLayer::new(1, 1, LayerRole::Output, &mut rng);
        layer.weights = array![[1.0]];
        layer.bias = array![0.0];

        let input = array![[2.0]];
        let delta = array![[0.5]];
        layer.backward(&input.view(), &delta.view());
        layer.apply_gradients(0.1);

        // w -= 0.1 * (2.0 * 0.5), b -= 0.1 * 0.5
        assert_relative_eq!(layer.weights[[0, 0]], 0.9);
        assert_relative_eq!(layer.bias[0], -0.05);
        assert!(layer.weight_grad.is_none());
        assert!(layer.bias_grad.is_none());
    }

    #[test]
    #[should_panic(expected = "without a pending backward pass")]
    fn test_apply_gradients_without_backward_panics() {
        let mut rng = SimpleRng::new(3);
        let mut layer = DenseLayer::new(2, 2, LayerRole::Hidden, &mut rng);
        layer.apply_gradients(0.1);
    }

    #[test]
    fn test_validate_catches_tampered_shapes() {
        let mut rng = SimpleRng::new(3);
        let mut layer = DenseLayer::new(3, 2, LayerRole::Hidden, &mut rng);
        assert!(layer.validate().is_ok());

        layer.bias = array![0.0, 0.0, 0.0];
        assert!(layer.validate().is_err());
    }
}
