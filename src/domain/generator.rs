//! Per-trial parameter generation.
//!
//! Every trial draws from its own RNG seeded from the master seed and the
//! trial id, so a trial's parameters do not depend on which worker ran it
//! or in which order.

use std::ops::RangeInclusive;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::multipliers::{self, MultiplierConfig};
use crate::domain::ranges::{self, INCREMENTAL_STEPS};
use crate::domain::trial::{TrialId, TrialParams};

/// How range sets are produced across the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeMode {
    Random { trials: u32 },
    /// Fixed scan `i = 0, 0.5, ..., 10`.
    Incremental,
}

impl RangeMode {
    pub fn trial_count(&self) -> u32 {
        match self {
            RangeMode::Random { trials } => *trials,
            RangeMode::Incremental => INCREMENTAL_STEPS as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamGenerator {
    multipliers: MultiplierConfig,
    mode: RangeMode,
    force_negative: bool,
    seed: u64,
}

impl ParamGenerator {
    pub fn new(multipliers: MultiplierConfig, mode: RangeMode, force_negative: bool, seed: u64) -> Self {
        ParamGenerator {
            multipliers,
            mode,
            force_negative,
            seed,
        }
    }

    /// Ids of the non-baseline trials, `1..=N`.
    pub fn trial_ids(&self) -> RangeInclusive<u32> {
        1..=self.mode.trial_count()
    }

    pub fn params(&self, trial: TrialId) -> TrialParams {
        let mut rng = trial_rng(self.seed, trial);
        let multipliers = multipliers::generate(&self.multipliers, &mut rng);
        let ranges = match self.mode {
            RangeMode::Random { .. } => ranges::random(self.force_negative, &mut rng),
            RangeMode::Incremental => {
                let step = trial.0.saturating_sub(1) as usize;
                ranges::incremental(ranges::incremental_index(step))
            }
        };
        TrialParams {
            multipliers,
            ranges,
        }
    }
}

/// Independent stream per trial.
pub fn trial_rng(seed: u64, trial: TrialId) -> StdRng {
    let mixed = seed ^ u64::from(trial.0).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    StdRng::seed_from_u64(mixed)
}
