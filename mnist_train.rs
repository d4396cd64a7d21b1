// MNIST trainer demo: load the IDX files, train a dense network, evaluate
// on the held-out split and save a checkpoint.
//
// Usage: mnist_train [train-images] [train-labels] [test-images] [test-labels] [config.json]
// Paths default to the standard MNIST file names under ./data/.

use std::env;
use std::process;
use std::time::Instant;

use mnist_trainer::{load_config, parse_dataset_files, Trainer, TrainerConfig};

const DEFAULT_TRAIN_IMAGES: &str = "./data/train-images.idx3-ubyte";
const DEFAULT_TRAIN_LABELS: &str = "./data/train-labels.idx1-ubyte";
const DEFAULT_TEST_IMAGES: &str = "./data/t10k-images.idx3-ubyte";
const DEFAULT_TEST_LABELS: &str = "./data/t10k-labels.idx1-ubyte";
const CHECKPOINT_PATH: &str = "mnist_model.json";

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!(
            "Usage: {} [train-images] [train-labels] [test-images] [test-labels] [config.json]",
            args.first().map(String::as_str).unwrap_or("mnist_train")
        );
        return;
    }

    let train_images = args.get(1).map(String::as_str).unwrap_or(DEFAULT_TRAIN_IMAGES);
    let train_labels = args.get(2).map(String::as_str).unwrap_or(DEFAULT_TRAIN_LABELS);
    let test_images = args.get(3).map(String::as_str).unwrap_or(DEFAULT_TEST_IMAGES);
    let test_labels = args.get(4).map(String::as_str).unwrap_or(DEFAULT_TEST_LABELS);

    let config = match args.get(5) {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Could not load config {}: {}", path, e);
            process::exit(1);
        }),
        None => TrainerConfig::default(),
    };

    let program_start = Instant::now();

    println!("Loading training data...");
    let load_start = Instant::now();
    let training = parse_dataset_files(train_images, train_labels, None).unwrap_or_else(|e| {
        eprintln!("Could not load training data: {}", e);
        process::exit(1);
    });

    println!("Loading test data...");
    let testing = parse_dataset_files(test_images, test_labels, None).unwrap_or_else(|e| {
        eprintln!("Could not load test data: {}", e);
        process::exit(1);
    });
    let load_time = load_start.elapsed().as_secs_f64();

    if testing.width() != training.width() {
        eprintln!(
            "Test images are {0}x{0} but training images are {1}x{1}",
            testing.width(),
            training.width()
        );
        process::exit(1);
    }
    println!(
        "Loaded {} training and {} test samples ({}x{} pixels)",
        training.count(),
        testing.count(),
        training.width(),
        training.width()
    );
    println!("Data loading time: {:.2} seconds", load_time);

    println!(
        "Training network ({} iterations, learning rate {})...",
        config.iterations, config.learning_rate
    );
    let train_start = Instant::now();
    let mut trainer = Trainer::new(config, training);
    trainer.train(&mut |update| {
        println!(
            "Iteration {:>3}: loss {:.4}, accuracy {:.1}%",
            update.iteration,
            update.loss,
            update.accuracy * 100.0
        );
    });
    let train_time = train_start.elapsed().as_secs_f64();
    println!("Total training time: {:.2} seconds", train_time);

    println!("Evaluating on test data...");
    let test_start = Instant::now();
    let accuracy = trainer.evaluate(&testing);
    let test_time = test_start.elapsed().as_secs_f64();
    println!("Test accuracy: {:.2}%", accuracy * 100.0);

    println!("Saving checkpoint...");
    if let Err(e) = trainer.save_checkpoint(CHECKPOINT_PATH) {
        eprintln!("Could not save checkpoint: {}", e);
        process::exit(1);
    }
    println!("Model saved to {}", CHECKPOINT_PATH);

    let total_time = program_start.elapsed().as_secs_f64();
    println!("\n=== Performance Summary ===");
    println!("Data loading time: {:.2} seconds", load_time);
    println!("Total training time: {:.2} seconds", train_time);
    println!("Testing time: {:.2} seconds", test_time);
    println!("Total program time: {:.2} seconds", total_time);
    println!("========================");
}
