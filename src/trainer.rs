//! Training orchestrator tying configuration, dataset and network together.
//!
//! A [`Trainer`] owns a base dataset and a [`TrainerConfig`] and publishes
//! the latest trained network as an atomically swapped snapshot. Every
//! training run starts from a fresh network built off the current
//! configuration; when the run finishes, its result replaces the published
//! snapshot in one step (last writer wins). Readers clone the snapshot
//! handle and are never blocked by a run in progress.

use std::error::Error;
use std::fs;
use std::io;
use std::panic;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use ndarray::Array2;

use crate::config::{validate_config, TrainerConfig};
use crate::dataset::Dataset;
use crate::network::{IterationUpdate, Network};
use crate::utils::SimpleRng;

/// Number of digit classes every trained network distinguishes.
pub const CLASS_COUNT: usize = 10;

/// Confidence the network assigns to a single digit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigitScore {
    /// The digit, `0..=9`.
    pub digit: u8,
    /// Softmax probability assigned to the digit, in `[0, 1]`.
    pub confidence: f32,
}

/// Outcome of a prediction: one confidence per digit, ascending by digit.
///
/// # Examples
///
/// ```
/// use mnist_trainer::trainer::Prediction;
///
/// let mut confidences = [0.1f32; 10];
/// confidences[3] = 0.9;
/// let prediction = Prediction::from_confidences(&confidences);
///
/// assert_eq!(prediction.digits().len(), 10);
/// assert_eq!(prediction.highest().digit, 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    scores: [DigitScore; CLASS_COUNT],
}

impl Prediction {
    /// Build a prediction from one confidence per digit, index = digit.
    ///
    /// # Panics
    ///
    /// Panics unless exactly [`CLASS_COUNT`] confidences are given.
    pub fn from_confidences(confidences: &[f32]) -> Self {
        assert_eq!(
            confidences.len(),
            CLASS_COUNT,
            "a prediction needs exactly {} confidences, got {}",
            CLASS_COUNT,
            confidences.len()
        );
        let mut scores = [DigitScore {
            digit: 0,
            confidence: 0.0,
        }; CLASS_COUNT];
        for (digit, &confidence) in confidences.iter().enumerate() {
            scores[digit] = DigitScore {
                digit: digit as u8,
                confidence,
            };
        }
        Self { scores }
    }

    /// All ten digit scores, ascending by digit.
    pub fn digits(&self) -> &[DigitScore] {
        &self.scores
    }

    /// The most confident digit; ties resolve to the lowest digit.
    pub fn highest(&self) -> DigitScore {
        let mut best = self.scores[0];
        for &score in &self.scores[1..] {
            if score.confidence > best.confidence {
                best = score;
            }
        }
        best
    }
}

/// Handle to a training run executing on a background thread.
///
/// Dropping the handle detaches the run; it still finishes and publishes
/// its network.
pub struct TrainingRun {
    handle: JoinHandle<usize>,
}

impl TrainingRun {
    /// Whether the run has finished and published its network.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the run completes and return the number of iterations it
    /// performed.
    ///
    /// # Panics
    ///
    /// Re-raises a panic that occurred on the worker thread.
    pub fn wait(self) -> usize {
        match self.handle.join() {
            Ok(iterations) => iterations,
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

/// Orchestrates training runs and serves predictions from the latest
/// trained network.
///
/// # Examples
///
/// ```
/// use mnist_trainer::config::TrainerConfig;
/// use mnist_trainer::dataset::{Dataset, Sample};
/// use mnist_trainer::trainer::Trainer;
///
/// let dataset = Dataset::new(2, vec![Sample::new(vec![0, 255, 255, 0], 3)]);
/// let config = TrainerConfig {
///     iterations: 5,
///     layers: vec![4],
///     seed: Some(1),
///     ..TrainerConfig::default()
/// };
///
/// let mut trainer = Trainer::new(config, dataset);
/// trainer.train(&mut |_| {});
///
/// let prediction = trainer.predict(&[0, 255, 255, 0]);
/// assert_eq!(prediction.digits().len(), 10);
/// ```
pub struct Trainer {
    config: TrainerConfig,
    dataset: Dataset,
    network: Arc<Mutex<Arc<Network>>>,
}

impl Trainer {
    /// Create a trainer and install an initialized, untrained network so
    /// predictions are possible before the first run.
    ///
    /// # Panics
    ///
    /// Panics when the configuration fails validation.
    pub fn new(config: TrainerConfig, dataset: Dataset) -> Self {
        if let Err(e) = validate_config(&config) {
            panic!("invalid trainer configuration: {}", e);
        }
        let mut rng = seed_rng(&config);
        let network = build_network(&config, dataset.pixel_count(), &mut rng);
        Self {
            config,
            dataset,
            network: Arc::new(Mutex::new(Arc::new(network))),
        }
    }

    /// The configuration this trainer runs with.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// The base dataset training runs draw from.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Clone a handle to the currently published network snapshot.
    pub fn network(&self) -> Arc<Network> {
        self.network.lock().expect("network lock poisoned").clone()
    }

    fn replace_network(&self, network: Network) {
        *self.network.lock().expect("network lock poisoned") = Arc::new(network);
    }

    /// Discard learned parameters by rebuilding the network from the
    /// current configuration.
    pub fn reset(&mut self) {
        let mut rng = seed_rng(&self.config);
        let network = build_network(&self.config, self.dataset.pixel_count(), &mut rng);
        self.replace_network(network);
    }

    /// Run one training pass synchronously.
    ///
    /// A fresh network is built from the configuration, the dataset is
    /// shuffled and cropped to `max_training_items`, and the configured
    /// number of iterations is run. `observer` is called after every
    /// iteration. The trained network replaces the published snapshot.
    ///
    /// # Panics
    ///
    /// Panics when the dataset is empty.
    pub fn train(&mut self, observer: &mut dyn FnMut(&IterationUpdate)) {
        let network = run_training(&self.config, &self.dataset, observer);
        self.replace_network(network);
    }

    /// Start a training pass on a background thread.
    ///
    /// The run works on clones of the configuration and dataset, so the
    /// trainer stays fully usable while it executes; predictions keep
    /// serving the previous snapshot until the run completes and swaps its
    /// network in. Runs that overlap resolve last writer wins.
    pub fn train_in_background<F>(&self, mut observer: F) -> TrainingRun
    where
        F: FnMut(&IterationUpdate) + Send + 'static,
    {
        let config = self.config.clone();
        let dataset = self.dataset.clone();
        let slot = Arc::clone(&self.network);

        let handle = thread::spawn(move || {
            let mut completed = 0;
            let network = run_training(&config, &dataset, &mut |update: &IterationUpdate| {
                completed = update.iteration;
                observer(update);
            });
            *slot.lock().expect("network lock poisoned") = Arc::new(network);
            completed
        });
        TrainingRun { handle }
    }

    /// Classify one image and decode the per-digit confidences.
    ///
    /// # Panics
    ///
    /// Panics when `pixels` does not hold `width * width` intensities for
    /// the trainer's image width.
    pub fn predict(&self, pixels: &[u8]) -> Prediction {
        let expected = self.dataset.pixel_count();
        assert_eq!(
            pixels.len(),
            expected,
            "prediction input has {} pixels, expected {}",
            pixels.len(),
            expected
        );
        let scaled: Vec<f32> = pixels.iter().map(|&p| f32::from(p) / 255.0).collect();
        let input =
            Array2::from_shape_vec((1, expected), scaled).expect("one row of pixel features");

        let network = self.network();
        let probabilities = network.forward(&input);
        Prediction::from_confidences(&probabilities.row(0).to_vec())
    }

    /// Accuracy of the published network over `dataset`, in `[0, 1]`.
    ///
    /// An empty dataset evaluates to 0.
    ///
    /// # Panics
    ///
    /// Panics when the dataset's image width differs from the trainer's.
    pub fn evaluate(&self, dataset: &Dataset) -> f32 {
        assert_eq!(
            dataset.width(),
            self.dataset.width(),
            "evaluation dataset width {} does not match trainer width {}",
            dataset.width(),
            self.dataset.width()
        );
        if dataset.is_empty() {
            return 0.0;
        }

        let (inputs, targets) = dataset.vectorize();
        let network = self.network();
        let classes = network.classify(&inputs);

        let correct = classes
            .iter()
            .zip(targets.column(0))
            .filter(|&(&class, &target)| class == target as usize)
            .count();
        correct as f32 / dataset.count() as f32
    }

    /// Write the published network's parameters to `path` as JSON.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn Error>> {
        let network = self.network();
        let json = serde_json::to_string_pretty(network.as_ref())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Replace the published network with parameters loaded from `path`.
    ///
    /// The checkpoint is validated before being installed: its layer chain
    /// must be consistent and its sizes must match this trainer's dataset.
    pub fn load_checkpoint<P: AsRef<Path>>(&mut self, path: P) -> Result<(), Box<dyn Error>> {
        let contents = fs::read_to_string(path)?;
        let network: Network = serde_json::from_str(&contents)?;

        network.validate().map_err(checkpoint_error)?;
        if network.input_size() != self.dataset.pixel_count() {
            return Err(checkpoint_error(format!(
                "checkpoint expects {} input features, dataset provides {}",
                network.input_size(),
                self.dataset.pixel_count()
            )));
        }
        if network.output_size() != CLASS_COUNT {
            return Err(checkpoint_error(format!(
                "checkpoint has {} output classes, expected {}",
                network.output_size(),
                CLASS_COUNT
            )));
        }

        self.replace_network(network);
        Ok(())
    }
}

fn checkpoint_error(message: String) -> Box<dyn Error> {
    Box::new(io::Error::new(io::ErrorKind::InvalidData, message))
}

fn seed_rng(config: &TrainerConfig) -> SimpleRng {
    match config.seed {
        Some(seed) => SimpleRng::new(seed),
        None => SimpleRng::from_entropy(),
    }
}

fn build_network(config: &TrainerConfig, input_size: usize, rng: &mut SimpleRng) -> Network {
    let mut network = Network::new(input_size, CLASS_COUNT);
    for &neurons in &config.layers {
        network.add_hidden_layer(neurons, rng);
    }
    network.add_output_layer(rng);
    network
}

/// Shared body of the sync and background training paths: fresh network,
/// shuffle, crop, vectorize, train.
fn run_training(
    config: &TrainerConfig,
    dataset: &Dataset,
    observer: &mut dyn FnMut(&IterationUpdate),
) -> Network {
    assert!(!dataset.is_empty(), "cannot train on an empty dataset");

    let mut rng = seed_rng(config);
    let mut network = build_network(config, dataset.pixel_count(), &mut rng);

    let prepared = dataset
        .shuffled(&mut rng)
        .cropped(config.max_training_items);
    let (inputs, targets) = prepared.vectorize();

    log::info!(
        "training on {} samples for {} iterations (lr {})",
        prepared.count(),
        config.iterations,
        config.learning_rate
    );

    network.train(
        &inputs,
        &targets,
        config.max_training_items,
        config.iterations,
        config.learning_rate,
        observer,
    );
    network
}
