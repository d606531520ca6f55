//! Randomized delay inserted between worker launches.
//!
//! Delays are drawn uniformly from `{0, step, 2*step, ..., k*step}` with
//! `k = bound / step`, so every draw lies within `[0, bound]`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::RunConfig;

pub struct Jitter<R = StdRng> {
    step: Duration,
    max_steps: u32,
    rng: R,
}

impl Jitter<StdRng> {
    /// Seeded generator, reproducible across runs.
    pub fn seeded(step: Duration, bound: Duration, seed: u64) -> Self {
        Self::with_rng(step, bound, StdRng::seed_from_u64(seed))
    }

    /// Generator configured from `config`, seeded from entropy unless
    /// `jitter_seed` is set.
    pub fn from_config(config: &RunConfig) -> Self {
        let rng = match config.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config.jitter_step, config.jitter_bound, rng)
    }
}

impl<R: Rng> Jitter<R> {
    pub fn with_rng(step: Duration, bound: Duration, rng: R) -> Self {
        let max_steps = if step.is_zero() {
            0
        } else {
            (bound.as_nanos() / step.as_nanos()).min(u32::MAX as u128) as u32
        };
        Self {
            step,
            max_steps,
            rng,
        }
    }

    /// Largest delay [`next_delay`](Self::next_delay) can return.
    pub fn max_delay(&self) -> Duration {
        self.step * self.max_steps
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.max_steps == 0 {
            return Duration::ZERO;
        }
        self.step * self.rng.gen_range(0..=self.max_steps)
    }
}
