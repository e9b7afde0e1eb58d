//! Deterministic sampling utilities
//!
//! Candidate sampling must reproduce bit-for-bit across runs, so the
//! evaluator re-seeds an explicit LCG at the start of every evaluation
//! pass instead of touching any ambient RNG.

use crate::errors::{RecCoreError, Result};
use std::num::Wrapping;

/// Linear Congruential Generator for deterministic pseudo-randomness.
/// Uses constants from Numerical Recipes (glibc).
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: i64) -> Self {
        Self {
            state: Wrapping(seed.abs() % Self::MODULUS),
        }
    }

    /// Next pseudo-random value in `[0, MODULUS)`.
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 & (Self::MODULUS - 1)).abs()
    }

    /// Next pseudo-random value in `[0, max)`; 0 when `max <= 0`.
    pub fn next_range(&mut self, max: i64) -> i64 {
        if max <= 0 {
            return 0;
        }
        self.next_i64() % max
    }
}

/// Draw `n` elements uniformly without replacement via partial
/// Fisher-Yates over a copy of the pool.
///
/// A request larger than the pool is a configuration defect (the caller
/// asked for more negatives than exist) and fails loudly.
pub fn sample_without_replacement<T: Copy>(
    pool: &[T],
    n: usize,
    rng: &mut LcgRng,
) -> Result<Vec<T>> {
    if n > pool.len() {
        return Err(RecCoreError::Config(format!(
            "requested {} samples from a pool of {}",
            n,
            pool.len()
        )));
    }

    let mut scratch: Vec<T> = pool.to_vec();
    for i in 0..n {
        let j = i + rng.next_range((scratch.len() - i) as i64) as usize;
        scratch.swap(i, j);
    }
    scratch.truncate(n);
    Ok(scratch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lcg_determinism() {
        let mut rng1 = LcgRng::new(10);
        let mut rng2 = LcgRng::new(10);

        for _ in 0..100 {
            assert_eq!(rng1.next_i64(), rng2.next_i64());
        }
    }

    #[test]
    fn test_lcg_range() {
        let mut rng = LcgRng::new(42);
        for _ in 0..100 {
            let val = rng.next_range(10);
            assert!((0..10).contains(&val));
        }
    }

    #[test]
    fn test_sample_without_replacement_unique() -> Result<()> {
        let pool: Vec<u32> = (0..50).collect();
        let mut rng = LcgRng::new(10);

        let sample = sample_without_replacement(&pool, 20, &mut rng)?;
        assert_eq!(sample.len(), 20);

        let mut seen = std::collections::BTreeSet::new();
        for item in &sample {
            assert!(seen.insert(*item), "duplicate in sample");
        }
        Ok(())
    }

    #[test]
    fn test_oversized_request_fails() {
        let pool: Vec<u32> = (0..5).collect();
        let mut rng = LcgRng::new(10);

        let result = sample_without_replacement(&pool, 6, &mut rng);
        assert!(matches!(result, Err(RecCoreError::Config(_))));
    }

    #[test]
    fn test_sampling_reproducible() -> Result<()> {
        let pool: Vec<u32> = (0..100).collect();

        let s1 = sample_without_replacement(&pool, 30, &mut LcgRng::new(10))?;
        let s2 = sample_without_replacement(&pool, 30, &mut LcgRng::new(10))?;
        assert_eq!(s1, s2);

        Ok(())
    }
}
