//! In-memory dataset of labeled images and its transform pipeline.
//!
//! A [`Dataset`] is an ordered collection of [`Sample`]s sharing one square
//! image width. Transforms are value-semantic: `shuffled`, `cropped` and
//! `concat` return a new dataset and leave the receiver untouched, so a base
//! dataset can feed several differently prepared training runs.

pub mod idx;

use ndarray::Array2;

use crate::utils::SimpleRng;

pub use idx::{parse_dataset, parse_dataset_files};

/// One labeled image: raw pixel intensities plus the digit they show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pixels: Vec<u8>,
    label: u8,
}

impl Sample {
    /// Create a sample from raw pixels and a digit label.
    ///
    /// # Panics
    ///
    /// Panics when `label` is greater than 9.
    pub fn new(pixels: Vec<u8>, label: u8) -> Self {
        assert!(label <= 9, "label {} is out of range (expected 0-9)", label);
        Self { pixels, label }
    }

    /// Raw pixel intensities in row-major order.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The digit this image shows.
    pub fn label(&self) -> u8 {
        self.label
    }
}

/// An ordered set of samples with a common square image width.
///
/// # Examples
///
/// ```
/// use mnist_trainer::dataset::{Dataset, Sample};
///
/// let dataset = Dataset::new(2, vec![
///     Sample::new(vec![0, 64, 128, 255], 1),
///     Sample::new(vec![255, 128, 64, 0], 2),
/// ]);
///
/// let cropped = dataset.cropped(1);
/// assert_eq!(cropped.count(), 1);
/// assert_eq!(dataset.count(), 2); // original is untouched
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    width: usize,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Create a dataset from samples that all have `width * width` pixels.
    ///
    /// # Panics
    ///
    /// Panics when `width` is zero or a sample has the wrong pixel count.
    pub fn new(width: usize, samples: Vec<Sample>) -> Self {
        assert!(width > 0, "image width must be nonzero");
        let pixel_count = width * width;
        for (index, sample) in samples.iter().enumerate() {
            assert_eq!(
                sample.pixels.len(),
                pixel_count,
                "sample {} has {} pixels, expected {}",
                index,
                sample.pixels.len(),
                pixel_count
            );
        }
        Self { width, samples }
    }

    /// Create an empty dataset with the given image width.
    pub fn empty(width: usize) -> Self {
        Self::new(width, Vec::new())
    }

    /// Side length of every image in the dataset.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of pixels per image (`width * width`).
    pub fn pixel_count(&self) -> usize {
        self.width * self.width
    }

    /// Number of samples.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// All samples in order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Return a new dataset with `other`'s samples appended after this one's.
    ///
    /// # Panics
    ///
    /// Panics when the two datasets have different image widths.
    pub fn concat(&self, other: &Dataset) -> Dataset {
        assert_eq!(
            self.width, other.width,
            "cannot concat datasets of width {} and {}",
            self.width, other.width
        );
        let mut samples = self.samples.clone();
        samples.extend(other.samples.iter().cloned());
        Dataset {
            width: self.width,
            samples,
        }
    }

    /// Return a new dataset with the samples in a seeded random order.
    pub fn shuffled(&self, rng: &mut SimpleRng) -> Dataset {
        let mut samples = self.samples.clone();
        rng.shuffle(&mut samples);
        Dataset {
            width: self.width,
            samples,
        }
    }

    /// Return a new dataset holding at most the first `count` samples.
    ///
    /// A `count` beyond the current size keeps every sample.
    pub fn cropped(&self, count: usize) -> Dataset {
        let kept = count.min(self.samples.len());
        Dataset {
            width: self.width,
            samples: self.samples[..kept].to_vec(),
        }
    }

    /// Convert the dataset into the pair of matrices the network trains on.
    ///
    /// Returns `(inputs, targets)` where `inputs` is `count x pixel_count`
    /// with intensities scaled into `[0, 1]`, and `targets` is `count x 1`
    /// holding each sample's label.
    pub fn vectorize(&self) -> (Array2<f32>, Array2<f32>) {
        let mut pixels = Vec::with_capacity(self.count() * self.pixel_count());
        let mut labels = Vec::with_capacity(self.count());
        for sample in &self.samples {
            pixels.extend(sample.pixels.iter().map(|&p| f32::from(p) / 255.0));
            labels.push(f32::from(sample.label));
        }

        let inputs = Array2::from_shape_vec((self.count(), self.pixel_count()), pixels)
            .expect("pixel counts are validated at construction");
        let targets = Array2::from_shape_vec((self.count(), 1), labels)
            .expect("one label per sample");
        (inputs, targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_dataset() -> Dataset {
        Dataset::new(
            1,
            vec![
                Sample::new(vec![0], 0),
                Sample::new(vec![128], 1),
                Sample::new(vec![255], 2),
            ],
        )
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_sample_rejects_label_above_nine() {
        Sample::new(vec![0], 10);
    }

    #[test]
    #[should_panic(expected = "expected 4")]
    fn test_dataset_rejects_wrong_pixel_count() {
        Dataset::new(2, vec![Sample::new(vec![0, 0, 0], 1)]);
    }

    #[test]
    fn test_concat_preserves_order_and_inputs() {
        let first = toy_dataset();
        let second = Dataset::new(1, vec![Sample::new(vec![9], 3)]);

        let combined = first.concat(&second);

        assert_eq!(combined.count(), 4);
        let labels: Vec<u8> = combined.samples().iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec![0, 1, 2, 3]);
        assert_eq!(first.count(), 3);
        assert_eq!(second.count(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot concat")]
    fn test_concat_rejects_mismatched_widths() {
        let one = Dataset::empty(1);
        let two = Dataset::empty(2);
        one.concat(&two);
    }

    #[test]
    fn test_cropped_takes_a_prefix() {
        let dataset = toy_dataset();
        let cropped = dataset.cropped(2);

        assert_eq!(cropped.count(), 2);
        assert_eq!(cropped.samples()[0], dataset.samples()[0]);
        assert_eq!(cropped.samples()[1], dataset.samples()[1]);
    }

    #[test]
    fn test_cropped_beyond_size_keeps_everything() {
        let dataset = toy_dataset();
        assert_eq!(dataset.cropped(100).count(), 3);
        assert_eq!(dataset.cropped(100), dataset);
    }

    #[test]
    fn test_shuffled_is_a_permutation_of_the_original() {
        let samples: Vec<Sample> = (0u8..10)
            .map(|i| Sample::new(vec![i * 20], i % 10))
            .collect();
        let dataset = Dataset::new(1, samples);

        let mut rng = SimpleRng::new(77);
        let shuffled = dataset.shuffled(&mut rng);

        assert_eq!(shuffled.count(), dataset.count());
        let mut original: Vec<&Sample> = dataset.samples().iter().collect();
        let mut permuted: Vec<&Sample> = shuffled.samples().iter().collect();
        original.sort_by_key(|s| s.pixels()[0]);
        permuted.sort_by_key(|s| s.pixels()[0]);
        assert_eq!(original, permuted);
    }

    #[test]
    fn test_vectorize_scales_into_unit_interval() {
        let (inputs, targets) = toy_dataset().vectorize();

        assert_eq!(inputs.dim(), (3, 1));
        assert_eq!(targets.dim(), (3, 1));
        assert!(inputs.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert_eq!(inputs[[0, 0]], 0.0);
        assert_eq!(inputs[[2, 0]], 1.0);
        assert_eq!(targets[[1, 0]], 1.0);
    }

    #[test]
    fn test_vectorize_empty_dataset_gives_empty_matrices() {
        let (inputs, targets) = Dataset::empty(3).vectorize();
        assert_eq!(inputs.dim(), (0, 9));
        assert_eq!(targets.dim(), (0, 1));
    }
}
