//! MNIST Feedforward Trainer
//!
//! This library loads handwritten-digit datasets in the IDX binary format,
//! prepares them through value-semantic transforms, and trains a dense
//! feedforward network (ReLU hidden layers, softmax output) with full-batch
//! gradient descent. A training orchestrator binds configuration, dataset
//! and network together and serves predictions from an atomically swapped
//! snapshot of the latest trained parameters.
//!
//! # Modules
//!
//! - `dataset`: IDX parsing, `Sample`/`Dataset` and the transform pipeline
//! - `network`: dense layer stack, forward pass and gradient descent
//! - `trainer`: orchestrator with sync/background runs and predictions
//! - `config`: training configuration and JSON loading
//! - `utils`: seeded RNG and activation functions

pub mod config;
pub mod dataset;
pub mod network;
pub mod trainer;
pub mod utils;

pub use config::{load_config, TrainerConfig};
pub use dataset::{parse_dataset, parse_dataset_files, Dataset, Sample};
pub use network::{IterationUpdate, LayerRole, Network};
pub use trainer::{DigitScore, Prediction, Trainer, TrainingRun};
pub use utils::SimpleRng;
