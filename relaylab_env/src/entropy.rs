//! Injectable randomness for deterministic simulation.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A source of probabilistic outcomes.
///
/// All chance in the engine (flaky-network drops, reconnect success)
/// flows through this trait so that a seeded implementation makes
/// every run reproducible.
pub trait Entropy {
    /// Returns `true` with probability `p` (clamped to 0.0..=1.0).
    fn chance(&mut self, p: f64) -> bool;

    /// Returns a uniformly random u64.
    fn next_u64(&mut self) -> u64;

    /// Returns a uniform index in `0..n`. `n` must be non-zero.
    fn pick(&mut self, n: usize) -> usize;
}

/// Deterministic entropy derived from a single 64-bit seed.
pub struct SeededEntropy {
    seed: u64,
    rng: ChaCha8Rng,
}

impl SeededEntropy {
    /// Creates a seeded entropy source.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Derives an independent stream for a named consumer.
    ///
    /// Generator drops and reconnect outcomes draw from separate
    /// streams so that changing one policy does not perturb the
    /// other's sequence under the same master seed.
    pub fn fork(&self, stream: u64) -> Self {
        let derived = self.seed.wrapping_mul(0x517cc1b727220a95) ^ stream;
        Self::new(derived)
    }

    /// Returns the master seed (for logging).
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Entropy for SeededEntropy {
    fn chance(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }

    fn pick(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SeededEntropy::new(42);
        let mut b = SeededEntropy::new(42);

        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_fork_is_independent_of_draw_order() {
        let base = SeededEntropy::new(7);
        let mut fork_before = base.fork(1);

        let mut base = base;
        let _ = base.next_u64();
        let mut fork_after = base.fork(1);

        // Forking derives from the master seed, not the RNG state
        assert_eq!(fork_before.next_u64(), fork_after.next_u64());
    }

    #[test]
    fn test_chance_extremes() {
        let mut e = SeededEntropy::new(1);
        assert!(!e.chance(0.0));
        assert!(e.chance(1.0));
        // Out-of-range probabilities are clamped, not panicked on
        assert!(e.chance(2.5));
        assert!(!e.chance(-1.0));
    }

    #[test]
    fn test_chance_rate_roughly_matches_p() {
        let mut e = SeededEntropy::new(99);
        let hits = (0..10_000).filter(|_| e.chance(0.3)).count();
        assert!((2_700..=3_300).contains(&hits), "hits={hits}");
    }

    #[test]
    fn test_pick_in_range() {
        let mut e = SeededEntropy::new(3);
        for _ in 0..1000 {
            assert!(e.pick(5) < 5);
        }
    }
}
