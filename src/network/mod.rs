//! Feedforward network of dense layers trained with gradient descent.
//!
//! A [`Network`] is built incrementally: hidden layers first, then exactly
//! one output layer. Hidden layers are ReLU-activated, the output layer emits
//! softmax probabilities, and training minimizes cross-entropy over a fixed
//! iteration budget of full-batch gradient descent steps.

pub mod dense;

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::utils::activations::{relu_backward_inplace, relu_inplace, softmax_inplace};
use crate::utils::SimpleRng;

pub use dense::{DenseLayer, LayerRole};

// Floor for the predicted probability inside the log loss, so a confidently
// wrong network yields a large finite loss instead of infinity.
const LOSS_EPSILON: f32 = 1e-9;

/// Progress snapshot handed to the training observer after every iteration.
///
/// Loss and accuracy are measured on that iteration's forward pass, before
/// the parameter update it triggered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationUpdate {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Mean cross-entropy loss over the training batch.
    pub loss: f32,
    /// Fraction of the training batch classified correctly, in `[0, 1]`.
    pub accuracy: f32,
}

/// Stack of dense layers ending in a softmax output layer.
///
/// # Examples
///
/// ```
/// use mnist_trainer::network::Network;
/// use mnist_trainer::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let mut network = Network::new(4, 2);
/// network.add_hidden_layer(3, &mut rng);
/// network.add_output_layer(&mut rng);
///
/// assert_eq!(network.parameter_count(), (4 * 3 + 3) + (3 * 2 + 2));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    input_size: usize,
    output_size: usize,
    layers: Vec<DenseLayer>,
}

impl Network {
    /// Create an empty network for inputs of `input_size` features and
    /// `output_size` classes.
    ///
    /// # Panics
    ///
    /// Panics when either size is zero.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        assert!(input_size > 0, "network input size must be nonzero");
        assert!(output_size > 0, "network output size must be nonzero");
        Self {
            input_size,
            output_size,
            layers: Vec::new(),
        }
    }

    /// Number of input features.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Number of output classes.
    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Number of layers added so far.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Total number of trainable parameters across all layers.
    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(DenseLayer::parameter_count).sum()
    }

    /// Whether the output layer has been added.
    pub fn has_output_layer(&self) -> bool {
        self.layers
            .last()
            .is_some_and(|layer| layer.role() == LayerRole::Output)
    }

    fn next_input_size(&self) -> usize {
        self.layers
            .last()
            .map_or(self.input_size, DenseLayer::output_size)
    }

    /// Append a ReLU hidden layer with `neurons` outputs.
    ///
    /// # Panics
    ///
    /// Panics when `neurons` is zero or the output layer is already in place.
    pub fn add_hidden_layer(&mut self, neurons: usize, rng: &mut SimpleRng) {
        assert!(
            !self.has_output_layer(),
            "cannot add a hidden layer after the output layer"
        );
        let input_size = self.next_input_size();
        self.layers
            .push(DenseLayer::new(input_size, neurons, LayerRole::Hidden, rng));
    }

    /// Append the softmax output layer, completing the network.
    ///
    /// # Panics
    ///
    /// Panics when an output layer was already added.
    pub fn add_output_layer(&mut self, rng: &mut SimpleRng) {
        assert!(
            !self.has_output_layer(),
            "the network already has an output layer"
        );
        let input_size = self.next_input_size();
        self.layers.push(DenseLayer::new(
            input_size,
            self.output_size,
            LayerRole::Output,
            rng,
        ));
    }

    fn assert_complete(&self) {
        assert!(
            self.has_output_layer(),
            "network has no output layer; add layers before training or predicting"
        );
    }

    /// Run every layer forward, keeping each activated output for backprop.
    fn forward_cached(&self, inputs: ArrayView2<f32>) -> Vec<Array2<f32>> {
        let mut activations: Vec<Array2<f32>> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut output = match activations.last() {
                Some(previous) => layer.forward(&previous.view()),
                None => layer.forward(&inputs),
            };
            match layer.role() {
                LayerRole::Hidden => relu_inplace(&mut output),
                LayerRole::Output => softmax_inplace(&mut output),
            }
            activations.push(output);
        }
        activations
    }

    /// Compute class probabilities for a batch of rows.
    ///
    /// Returns an `n x output_size` matrix whose rows each sum to 1.
    ///
    /// # Panics
    ///
    /// Panics when the network is incomplete or `inputs` does not have
    /// `input_size` columns.
    pub fn forward(&self, inputs: &Array2<f32>) -> Array2<f32> {
        self.assert_complete();
        assert_eq!(
            inputs.ncols(),
            self.input_size,
            "inputs have {} columns, network expects {}",
            inputs.ncols(),
            self.input_size
        );
        self.forward_cached(inputs.view())
            .pop()
            .expect("a complete network has at least one layer")
    }

    /// Forward the batch and return the winning class index for every row.
    pub fn classify(&self, inputs: &Array2<f32>) -> Vec<usize> {
        let probabilities = self.forward(inputs);
        probabilities.rows().into_iter().map(argmax).collect()
    }

    /// Train with full-batch gradient descent for a fixed iteration budget.
    ///
    /// The batch is the first `min(max_items, available)` rows of `inputs`.
    /// Each iteration runs one forward pass over the batch, derives the
    /// cross-entropy gradient, backpropagates it and updates every layer,
    /// then calls `observer` with that iteration's [`IterationUpdate`].
    ///
    /// # Arguments
    ///
    /// * `inputs` - Sample matrix, one row per sample
    /// * `targets` - `n x 1` matrix of class labels matching `inputs`
    /// * `max_items` - Upper bound on the batch size
    /// * `iterations` - Number of gradient descent steps (at least 1)
    /// * `learning_rate` - Step size for the parameter updates
    /// * `observer` - Callback invoked synchronously after every iteration
    ///
    /// # Panics
    ///
    /// Panics when the network is incomplete, the batch is empty, the shapes
    /// are inconsistent, the iteration budget is zero, or the learning rate
    /// is not positive and finite.
    pub fn train(
        &mut self,
        inputs: &Array2<f32>,
        targets: &Array2<f32>,
        max_items: usize,
        iterations: usize,
        learning_rate: f32,
        observer: &mut dyn FnMut(&IterationUpdate),
    ) {
        self.assert_complete();
        assert!(iterations > 0, "iteration budget must be at least 1");
        assert!(
            learning_rate > 0.0 && learning_rate.is_finite(),
            "learning rate must be positive and finite, got {}",
            learning_rate
        );
        assert_eq!(
            inputs.ncols(),
            self.input_size,
            "inputs have {} columns, network expects {}",
            inputs.ncols(),
            self.input_size
        );
        assert_eq!(
            targets.nrows(),
            inputs.nrows(),
            "{} targets for {} samples",
            targets.nrows(),
            inputs.nrows()
        );
        assert_eq!(targets.ncols(), 1, "targets must be a single column");

        let batch = max_items.min(inputs.nrows());
        assert!(batch > 0, "cannot train on an empty batch");

        let batch_inputs = inputs.slice(s![..batch, ..]);
        let batch_targets = targets.slice(s![..batch, ..]);

        for iteration in 1..=iterations {
            let activations = self.forward_cached(batch_inputs);
            let probabilities = activations
                .last()
                .expect("a complete network has at least one layer");

            let (mut delta, loss, accuracy) =
                self.loss_gradient(probabilities, &batch_targets, batch);

            for index in (0..self.layers.len()).rev() {
                let layer_input = if index == 0 {
                    batch_inputs.view()
                } else {
                    activations[index - 1].view()
                };
                let grad_input = self.layers[index].backward(&layer_input, &delta.view());
                if index > 0 {
                    delta = grad_input;
                    relu_backward_inplace(&mut delta, &activations[index - 1].view());
                }
            }

            for layer in &mut self.layers {
                layer.apply_gradients(learning_rate);
            }

            let update = IterationUpdate {
                iteration,
                loss,
                accuracy,
            };
            log::debug!(
                "iteration {}/{}: loss {:.4}, accuracy {:.3}",
                iteration,
                iterations,
                loss,
                accuracy
            );
            observer(&update);
        }
    }

    /// Cross-entropy gradient at the softmax output, plus batch metrics.
    ///
    /// For softmax with cross-entropy the gradient at the pre-activation
    /// scores is the probability matrix with 1 subtracted at each true
    /// label, scaled by the batch size.
    fn loss_gradient(
        &self,
        probabilities: &Array2<f32>,
        targets: &ArrayView2<f32>,
        batch: usize,
    ) -> (Array2<f32>, f32, f32) {
        let mut delta = probabilities.clone();
        let mut loss_total = 0.0f32;
        let mut correct = 0usize;

        for row in 0..batch {
            let label = targets[[row, 0]] as usize;
            assert!(
                label < self.output_size,
                "target label {} is out of range for {} classes",
                label,
                self.output_size
            );
            let predicted = probabilities[[row, label]];
            loss_total += -predicted.max(LOSS_EPSILON).ln();
            delta[[row, label]] -= 1.0;
            if argmax(probabilities.row(row)) == label {
                correct += 1;
            }
        }

        let scale = 1.0 / batch as f32;
        delta.mapv_inplace(|v| v * scale);
        (delta, loss_total * scale, correct as f32 * scale)
    }

    /// Check the layer chain is well formed: sizes line up end to end and
    /// exactly one output layer sits at the end.
    ///
    /// Freshly built networks satisfy this by construction; deserialized
    /// checkpoints go through it before being trusted.
    pub fn validate(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("network has no layers".to_string());
        }

        let mut expected_input = self.input_size;
        for (index, layer) in self.layers.iter().enumerate() {
            layer
                .validate()
                .map_err(|e| format!("layer {}: {}", index, e))?;
            if layer.input_size() != expected_input {
                return Err(format!(
                    "layer {} expects {} inputs but receives {}",
                    index,
                    layer.input_size(),
                    expected_input
                ));
            }
            let is_last = index == self.layers.len() - 1;
            match (layer.role(), is_last) {
                (LayerRole::Output, false) => {
                    return Err(format!("layer {} is an output layer but not last", index));
                }
                (LayerRole::Hidden, true) => {
                    return Err("last layer is not an output layer".to_string());
                }
                _ => {}
            }
            expected_input = layer.output_size();
        }

        if expected_input != self.output_size {
            return Err(format!(
                "output layer emits {} classes, network declares {}",
                expected_input, self.output_size
            ));
        }
        Ok(())
    }
}

/// Index of the largest value in a row; ties go to the lowest index.
fn argmax(row: ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (index, &value) in row.iter().enumerate() {
        if value > row[best] {
            best = index;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn complete_network(seed: u64) -> Network {
        let mut rng = SimpleRng::new(seed);
        let mut network = Network::new(4, 2);
        network.add_hidden_layer(3, &mut rng);
        network.add_output_layer(&mut rng);
        network
    }

    #[test]
    fn test_layers_chain_their_sizes() {
        let network = complete_network(42);

        assert_eq!(network.layer_count(), 2);
        assert_eq!(network.layers[0].input_size(), 4);
        assert_eq!(network.layers[0].output_size(), 3);
        assert_eq!(network.layers[1].input_size(), 3);
        assert_eq!(network.layers[1].output_size(), 2);
        assert!(network.validate().is_ok());
    }

    #[test]
    #[should_panic(expected = "already has an output layer")]
    fn test_second_output_layer_panics() {
        let mut rng = SimpleRng::new(1);
        let mut network = complete_network(42);
        network.add_output_layer(&mut rng);
    }

    #[test]
    #[should_panic(expected = "after the output layer")]
    fn test_hidden_layer_after_output_panics() {
        let mut rng = SimpleRng::new(1);
        let mut network = complete_network(42);
        network.add_hidden_layer(5, &mut rng);
    }

    #[test]
    #[should_panic(expected = "no output layer")]
    fn test_forward_on_incomplete_network_panics() {
        let mut rng = SimpleRng::new(1);
        let mut network = Network::new(4, 2);
        network.add_hidden_layer(3, &mut rng);
        network.forward(&Array2::zeros((1, 4)));
    }

    #[test]
    fn test_forward_rows_are_probability_distributions() {
        let network = complete_network(7);
        let inputs = array![[0.0, 0.25, 0.5, 1.0], [1.0, 0.75, 0.5, 0.0]];

        let probabilities = network.forward(&inputs);

        assert_eq!(probabilities.dim(), (2, 2));
        for row in probabilities.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-5);
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_output_only_network_is_valid() {
        let mut rng = SimpleRng::new(5);
        let mut network = Network::new(4, 2);
        network.add_output_layer(&mut rng);

        assert!(network.validate().is_ok());
        let probabilities = network.forward(&array![[0.1, 0.2, 0.3, 0.4]]);
        assert_relative_eq!(probabilities.row(0).sum(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_training_reduces_loss_and_reports_every_iteration() {
        let mut network = complete_network(42);
        let inputs = array![
            [1.0, 0.9, 0.0, 0.1],
            [0.9, 1.0, 0.1, 0.0],
            [0.0, 0.1, 1.0, 0.9],
            [0.1, 0.0, 0.9, 1.0],
        ];
        let targets = array![[0.0], [0.0], [1.0], [1.0]];

        let mut updates = Vec::new();
        network.train(&inputs, &targets, usize::MAX, 40, 0.5, &mut |u| {
            updates.push(*u)
        });

        assert_eq!(updates.len(), 40);
        assert_eq!(updates[0].iteration, 1);
        assert_eq!(updates[39].iteration, 40);
        assert!(
            updates[39].loss < updates[0].loss,
            "loss did not decrease: {} -> {}",
            updates[0].loss,
            updates[39].loss
        );
    }

    #[test]
    fn test_max_items_caps_the_batch() {
        let mut network = complete_network(11);
        let inputs = array![
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
        ];
        let targets = array![[0.0], [1.0], [1.0]];

        // Metrics must come from the two-sample batch, so accuracy is a
        // multiple of 0.5.
        let mut seen = Vec::new();
        network.train(&inputs, &targets, 2, 3, 0.1, &mut |u| {
            seen.push(u.accuracy)
        });

        assert!(seen
            .iter()
            .all(|&a| (a * 2.0 - (a * 2.0).round()).abs() < 1e-6));
    }

    #[test]
    #[should_panic(expected = "empty batch")]
    fn test_training_on_empty_inputs_panics() {
        let mut network = complete_network(1);
        let inputs = Array2::zeros((0, 4));
        let targets = Array2::zeros((0, 1));
        network.train(&inputs, &targets, 10, 1, 0.1, &mut |_| {});
    }

    #[test]
    #[should_panic(expected = "iteration budget")]
    fn test_zero_iterations_panics() {
        let mut network = complete_network(1);
        let inputs = Array2::zeros((1, 4));
        let targets = Array2::zeros((1, 1));
        network.train(&inputs, &targets, 10, 0, 0.1, &mut |_| {});
    }

    #[test]
    #[should_panic(expected = "learning rate")]
    fn test_non_positive_learning_rate_panics() {
        let mut network = complete_network(1);
        let inputs = Array2::zeros((1, 4));
        let targets = Array2::zeros((1, 1));
        network.train(&inputs, &targets, 10, 1, 0.0, &mut |_| {});
    }

    #[test]
    fn test_classify_picks_the_largest_probability() {
        let network = complete_network(3);
        let inputs = array![[0.2, 0.4, 0.6, 0.8]];

        let probabilities = network.forward(&inputs);
        let classes = network.classify(&inputs);

        let expected = if probabilities[[0, 0]] >= probabilities[[0, 1]] {
            0
        } else {
            1
        };
        assert_eq!(classes, vec![expected]);
    }

    #[test]
    fn test_argmax_breaks_ties_toward_the_lowest_index() {
        let row = array![0.25, 0.25, 0.25, 0.25];
        assert_eq!(argmax(row.view()), 0);

        let row = array![0.1, 0.4, 0.4, 0.1];
        assert_eq!(argmax(row.view()), 1);
    }

    #[test]
    fn test_validate_rejects_a_broken_chain() {
        let mut rng = SimpleRng::new(2);
        let mut network = complete_network(2);
        // Splice in a layer whose input width does not match.
        network.layers[1] = DenseLayer::new(5, 2, LayerRole::Output, &mut rng);

        assert!(network.validate().is_err());
    }
}
