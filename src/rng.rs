//! Injectable randomness.
//!
//! Every stochastic component draws from a [`RandomSource`] handed to it by
//! the caller.  Seeded sources make whole runs reproducible; production runs
//! take a fresh source from OS entropy.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
    seed: Option<u64>,
}

impl RandomSource {
    /// Deterministic source; identical seeds yield identical draw sequences.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            seed: None,
        }
    }

    /// `Some(seed)` for seeded sources.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Fair coin.
    pub fn coin(&mut self) -> bool {
        self.rng.random_bool(0.5)
    }

    /// `true` with probability `p`; `p` is clamped into `[0, 1]`.
    pub fn chance(&mut self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self.rng.random_bool(p)
    }

    /// Uniform draw in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.random::<u64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_sources_repeat() {
        let mut a = RandomSource::seeded(7);
        let mut b = RandomSource::seeded(7);
        let xs: Vec<u64> = (0..16).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..16).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
        assert_eq!(a.seed(), Some(7));
    }

    #[test]
    fn chance_extremes() {
        let mut r = RandomSource::seeded(1);
        assert!((0..100).all(|_| r.chance(1.0)));
        assert!((0..100).all(|_| !r.chance(0.0)));
        assert!((0..100).all(|_| !r.chance(f64::NAN)));
        assert!((0..100).all(|_| r.chance(3.0)));
    }

    #[test]
    fn unit_in_range() {
        let mut r = RandomSource::from_entropy();
        assert!(r.seed().is_none());
        for _ in 0..1000 {
            let u = r.unit();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
