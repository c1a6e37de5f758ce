//! Random sources for trigger decisions.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// Source of uniform draws in `[0, 1)` used for trigger decisions.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

/// Seedable pseudo-random source.
pub struct SeededRandom {
    rng: StdRng,
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed from the OS. The chosen seed is logged so a run can be replayed.
    pub fn from_entropy() -> Self {
        let seed = rand::thread_rng().gen::<u64>();
        info!(seed, "Trigger random source seeded");
        Self::new(seed)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
pub struct ScriptedRandom {
    values: Vec<f64>,
    position: usize,
}

impl ScriptedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            position: 0,
        }
    }

    /// Always draws `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for ScriptedRandom {
    fn next_f64(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = SeededRandom::new(42);
        let mut b = SeededRandom::new(42);
        for _ in 0..16 {
            let x = a.next_f64();
            assert_eq!(x, b.next_f64());
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_scripted_cycles() {
        let mut source = ScriptedRandom::new(vec![0.1, 0.9]);
        assert_eq!(source.next_f64(), 0.1);
        assert_eq!(source.next_f64(), 0.9);
        assert_eq!(source.next_f64(), 0.1);
    }
}
