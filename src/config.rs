//! Training configuration.
//!
//! This module provides the trainer's configuration value, JSON loading and
//! validation. Every knob has a default suitable for quick experimentation,
//! so a config file only needs to list the fields it overrides.

use serde::Deserialize;
use std::error::Error;
use std::fs;

/// Configuration for a training run.
///
/// The network architecture is described by `layers`, the hidden layer sizes
/// in order; the 10-class output layer is always appended implicitly.
///
/// # Example
///
/// ```json
/// {
///   "max_training_items": 2000,
///   "iterations": 50,
///   "learning_rate": 0.1,
///   "layers": [128, 64],
///   "seed": 42
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Upper bound on how many samples a training run uses.
    pub max_training_items: usize,

    /// Number of full-batch gradient descent iterations per run.
    pub iterations: usize,

    /// Step size for the parameter updates.
    pub learning_rate: f32,

    /// Hidden layer sizes, in order. May be empty for a softmax-only model.
    pub layers: Vec<usize>,

    /// Fixed RNG seed for reproducible runs; `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_training_items: 5000,
            iterations: 30,
            learning_rate: 0.05,
            layers: vec![64],
            seed: None,
        }
    }
}

/// Loads a trainer configuration from a JSON file.
///
/// Reads the file at `path`, deserializes it into a [`TrainerConfig`] (with
/// defaults filling any missing fields) and validates the result.
///
/// # Returns
///
/// `Ok(TrainerConfig)` on success, or an error if the file cannot be read,
/// the JSON is invalid, or a field fails validation.
///
/// # Examples
///
/// ```no_run
/// use mnist_trainer::config::load_config;
///
/// let config = load_config("config/train.json").unwrap();
/// assert!(config.iterations > 0);
/// ```
pub fn load_config(path: &str) -> Result<TrainerConfig, Box<dyn Error>> {
    let contents = fs::read_to_string(path)?;
    let config: TrainerConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks that every configuration value is usable for training.
///
/// Returns an error with a descriptive message when a value is out of range.
pub fn validate_config(config: &TrainerConfig) -> Result<(), Box<dyn Error>> {
    if config.max_training_items == 0 {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "max_training_items must be at least 1",
        )));
    }

    if config.iterations == 0 {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "iterations must be at least 1",
        )));
    }

    if !(config.learning_rate > 0.0 && config.learning_rate.is_finite()) {
        return Err(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "learning_rate must be positive and finite, got {}",
                config.learning_rate
            ),
        )));
    }

    for (index, &neurons) in config.layers.iter().enumerate() {
        if neurons == 0 {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("layer {} must have at least one neuron", index),
            )));
        }
    }

    Ok(())
}
