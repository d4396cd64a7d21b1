//! Seeded random number generator shared by shuffling and weight init.
//!
//! A small xorshift64* generator keeps the crate free of an external RNG
//! dependency while staying fully reproducible: every consumer receives the
//! generator by `&mut` reference, so a fixed seed fixes the entire training
//! run (shuffle order and initial weights alike).

use std::time::{SystemTime, UNIX_EPOCH};

// Any nonzero value works as the fallback state; xorshift cannot leave zero.
const FALLBACK_STATE: u64 = 0x853c_49e6_748f_ea9b;

/// Deterministic xorshift64* generator.
///
/// Construct with [`SimpleRng::new`] for reproducible runs or
/// [`SimpleRng::from_entropy`] for a clock-derived seed.
///
/// # Examples
///
/// ```
/// use mnist_trainer::utils::SimpleRng;
///
/// let mut a = SimpleRng::new(42);
/// let mut b = SimpleRng::new(42);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Debug, Clone)]
pub struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    /// Create a generator from an explicit seed.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { FALLBACK_STATE } else { seed };
        Self { state }
    }

    /// Create a generator seeded from the system clock.
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::new(nanos)
    }

    /// Advance the state and return the next 64-bit output.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform `f32` in `[0, 1)`, built from the top 24 bits of the output.
    pub fn next_f32(&mut self) -> f32 {
        const SCALE: f32 = 1.0 / (1u32 << 24) as f32;
        (self.next_u64() >> 40) as f32 * SCALE
    }

    /// Uniform `f32` in `[low, high)`.
    pub fn gen_range(&mut self, low: f32, high: f32) -> f32 {
        low + (high - low) * self.next_f32()
    }

    /// Uniform index in `[0, upper)`; returns 0 when `upper` is 0.
    pub fn gen_index(&mut self, upper: usize) -> usize {
        if upper == 0 {
            0
        } else {
            (self.next_u64() % upper as u64) as usize
        }
    }

    /// Fisher-Yates shuffle of an arbitrary slice.
    pub fn shuffle<T>(&mut self, data: &mut [T]) {
        for i in (1..data.len()).rev() {
            let j = self.gen_index(i + 1);
            data.swap(i, j);
        }
    }
}
