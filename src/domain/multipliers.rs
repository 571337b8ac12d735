//! Per-tier investment multipliers and their generation.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::domain::error::SmartDcaError;
use crate::domain::tier::Tier;

/// Bounds and mode for multiplier generation.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiplierConfig {
    pub max_cap: f64,
    pub min_cap: f64,
    pub increment: f64,
    pub force_max: bool,
    pub force_min: bool,
    pub randomize: bool,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        MultiplierConfig {
            max_cap: 2.0,
            min_cap: 0.25,
            increment: 0.25,
            force_max: false,
            force_min: false,
            randomize: false,
        }
    }
}

/// Tier → multiplier. The neutral tier is always 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplierSet {
    values: [f64; 7],
}

impl MultiplierSet {
    /// Build from values in tier order (`n3` first).
    pub fn new(values: [f64; 7]) -> Result<Self, SmartDcaError> {
        if let Some(v) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(SmartDcaError::InvalidMultipliers {
                reason: format!("multiplier {v} is not a positive number"),
            });
        }
        if values[Tier::Neutral.index()] != 1.0 {
            return Err(SmartDcaError::InvalidMultipliers {
                reason: format!(
                    "neutral multiplier must be 1, got {}",
                    values[Tier::Neutral.index()]
                ),
            });
        }
        Ok(MultiplierSet { values })
    }

    /// Every tier invests the base amount.
    pub fn flat() -> Self {
        MultiplierSet { values: [1.0; 7] }
    }

    pub fn get(&self, tier: Tier) -> f64 {
        self.values[tier.index()]
    }

    pub fn values(&self) -> &[f64; 7] {
        &self.values
    }

    /// `n3 ≥ n2 ≥ n1 ≥ 1 ≥ p1 ≥ p2 ≥ p3`
    pub fn is_monotonic(&self) -> bool {
        self.values.windows(2).all(|w| w[0] >= w[1])
    }
}

impl fmt::Display for MultiplierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tier) in Tier::ALL.into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", tier, self.get(tier))?;
        }
        Ok(())
    }
}

impl FromStr for MultiplierSet {
    type Err = SmartDcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| SmartDcaError::InvalidMultipliers { reason };
        let mut values = [f64::NAN; 7];
        let mut seen = 0;

        for token in s.split_whitespace() {
            let (label, value) = token
                .split_once(':')
                .ok_or_else(|| invalid(format!("malformed entry `{token}`")))?;
            let tier: Tier = label.parse().map_err(invalid)?;
            values[tier.index()] = value
                .parse()
                .map_err(|e| invalid(format!("`{token}`: {e}")))?;
            seen += 1;
        }

        if seen != 7 || values.iter().any(|v| v.is_nan()) {
            return Err(invalid(format!("expected 7 tiers in `{s}`")));
        }
        MultiplierSet::new(values)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Arithmetic progression around 1, clamped to the configured caps.
///
/// `force_max`/`force_min` pin the outer tiers to the caps themselves.
pub fn deterministic(config: &MultiplierConfig) -> MultiplierSet {
    let incr = config.increment;
    let mut values = [0.0; 7];
    for tier in Tier::ALL {
        let step = tier.distance() as f64 * incr;
        let raw = if tier.is_negative() { 1.0 + step } else { 1.0 - step };
        values[tier.index()] = raw.clamp(config.min_cap, config.max_cap);
    }
    values[Tier::Neutral.index()] = 1.0;

    if config.force_max {
        values[Tier::N3.index()] = config.max_cap;
    }
    if config.force_min {
        values[Tier::P3.index()] = config.min_cap;
    }

    MultiplierSet { values }
}

/// Uniform sample in `[lo, hi]` rounded to 2 decimals, kept inside the bounds.
fn sample<R: Rng + ?Sized>(rng: &mut R, lo: f64, hi: f64) -> f64 {
    round_to(rng.gen_range(lo..=hi), 2).clamp(lo, hi)
}

/// Nested uniform samples that keep the chain monotonic.
pub fn random<R: Rng + ?Sized>(config: &MultiplierConfig, rng: &mut R) -> MultiplierSet {
    let max = if config.force_max {
        config.max_cap
    } else {
        sample(rng, 1.0, config.max_cap)
    };
    let min = if config.force_min {
        config.min_cap
    } else {
        sample(rng, config.min_cap, 1.0)
    };

    let n2 = sample(rng, 1.0, max);
    let n1 = sample(rng, 1.0, n2);
    let p2 = sample(rng, min, 1.0);
    let p1 = sample(rng, p2, 1.0);

    MultiplierSet {
        values: [max, n2, n1, 1.0, p1, p2, min],
    }
}

/// Dispatch on `config.randomize`.
pub fn generate<R: Rng + ?Sized>(config: &MultiplierConfig, rng: &mut R) -> MultiplierSet {
    if config.randomize {
        random(config, rng)
    } else {
        deterministic(config)
    }
}
