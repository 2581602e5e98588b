//! Deterministic random number generation.
//!
//! `SimRng` wraps rand's `SmallRng` so every random decision of a run
//! (command shapes, targets, delays, the failure index) is reproducible from
//! one seed.

use rand::rngs::SmallRng;
use rand::{Rng as _, RngCore, SeedableRng};

/// Seedable random stream used by the generator and the failure schedule.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: SmallRng,
    seed: u64,
}

impl SimRng {
    /// Creates a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates a generator from OS entropy.
    pub fn from_entropy() -> Self {
        Self::new(rand::random())
    }

    /// Derives a stream from a base seed and a list of discriminators.
    ///
    /// Used to give each restarted run its own stream: the same
    /// `(seed, cursor, failures)` always yields the same stream.
    pub fn derive(seed: u64, parts: &[u64]) -> Self {
        let mixed = parts
            .iter()
            .fold(splitmix64(seed), |acc, part| splitmix64(acc ^ part));
        Self::new(mixed)
    }

    /// Returns the seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Generates a random `f64` in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        self.inner.gen_range(0.0..1.0)
    }

    /// Generates a random `usize` in `[0, max)`.
    pub fn next_usize(&mut self, max: usize) -> usize {
        assert!(max > 0, "next_usize requires a non-empty range");
        self.inner.gen_range(0..max)
    }

    /// Generates a random `u64` in `[min, max)`.
    pub fn next_u64_range(&mut self, min: u64, max: u64) -> u64 {
        assert!(min < max, "min must be < max");
        self.inner.gen_range(min..max)
    }

    /// Generates a random `u64` in `[min, max]`.
    pub fn next_u64_inclusive(&mut self, min: u64, max: u64) -> u64 {
        assert!(min <= max, "min must be <= max");
        self.inner.gen_range(min..=max)
    }

    /// Forks an independent stream deterministically derived from this one.
    pub fn fork(&mut self) -> Self {
        Self::new(self.next_u64())
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = SimRng::new(12345);
        let mut b = SimRng::new(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn derive_depends_on_every_part() {
        let mut a = SimRng::derive(7, &[0, 0]);
        let mut b = SimRng::derive(7, &[10, 0]);
        let mut c = SimRng::derive(7, &[10, 1]);
        let (x, y, z) = (a.next_u64(), b.next_u64(), c.next_u64());
        assert!(x != y || y != z);
        assert_eq!(SimRng::derive(7, &[10, 1]).next_u64(), z);
    }

    #[test]
    fn ranges_are_respected() {
        let mut rng = SimRng::new(1);
        for _ in 0..1_000 {
            assert!(rng.next_usize(3) < 3);
            let v = rng.next_u64_range(5, 9);
            assert!((5..9).contains(&v));
            let w = rng.next_u64_inclusive(5, 9);
            assert!((5..=9).contains(&w));
            let f = rng.next_f64();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn inclusive_range_reaches_u64_max() {
        let mut rng = SimRng::new(5);
        assert_eq!(rng.next_u64_inclusive(u64::MAX, u64::MAX), u64::MAX);
        let v = rng.next_u64_inclusive(1, u64::MAX);
        assert!(v >= 1);
    }

    #[test]
    fn fork_diverges_from_parent() {
        let mut parent = SimRng::new(99);
        let mut child = parent.fork();
        assert_ne!(parent.next_u64(), child.next_u64());
    }
}
