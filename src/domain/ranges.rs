//! Deviation bands per tier and their generation.
//!
//! A [`RangeSet`] partitions the real line into seven contiguous half-open
//! intervals `[lower, upper)`, one per [`Tier`]. The outer bounds are
//! infinite, so every finite deviation lands in exactly one tier.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::domain::error::SmartDcaError;
use crate::domain::tier::Tier;

/// Ceiling for randomly generated boundaries, in percent.
pub const RANDOM_BOUNDARY_CEILING: f64 = 15.0;

/// Width of each non-neutral band in incremental mode.
pub const INCREMENTAL_BAND_WIDTH: f64 = 2.5;

/// Number of incremental scan steps (`i = 0, 0.5, …, 10.0`).
pub const INCREMENTAL_STEPS: usize = 21;

/// Half-open interval `[lower, upper)` of percentage deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub lower: f64,
    pub upper: f64,
}

impl Band {
    pub fn new(lower: f64, upper: f64) -> Self {
        Band { lower, upper }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value < self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSet {
    bands: [Band; 7],
}

impl RangeSet {
    /// Build from bands in tier order, checking contiguity and exhaustiveness.
    pub fn new(bands: [Band; 7]) -> Result<Self, SmartDcaError> {
        let invalid = |reason: String| SmartDcaError::InvalidRanges { reason };

        if bands.iter().any(|b| b.lower.is_nan() || b.upper.is_nan()) {
            return Err(invalid("NaN boundary".into()));
        }
        if bands[0].lower != f64::NEG_INFINITY {
            return Err(invalid(format!(
                "n3 must be unbounded below, got {}",
                bands[0].lower
            )));
        }
        if bands[6].upper != f64::INFINITY {
            return Err(invalid(format!(
                "p3 must be unbounded above, got {}",
                bands[6].upper
            )));
        }
        for (tier, band) in Tier::ALL.into_iter().zip(bands.iter()) {
            if band.lower > band.upper {
                return Err(invalid(format!(
                    "{tier} lower bound {} exceeds upper bound {}",
                    band.lower, band.upper
                )));
            }
        }
        for (i, pair) in bands.windows(2).enumerate() {
            if pair[0].upper != pair[1].lower {
                return Err(invalid(format!(
                    "gap between {} and {}: {} != {}",
                    Tier::ALL[i],
                    Tier::ALL[i + 1],
                    pair[0].upper,
                    pair[1].lower
                )));
            }
        }

        Ok(RangeSet { bands })
    }

    /// Every deviation falls into the neutral tier.
    pub fn single_tier() -> Self {
        let lo = Band::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let hi = Band::new(f64::INFINITY, f64::INFINITY);
        RangeSet {
            bands: [
                lo,
                lo,
                lo,
                Band::new(f64::NEG_INFINITY, f64::INFINITY),
                hi,
                hi,
                hi,
            ],
        }
    }

    pub fn band(&self, tier: Tier) -> Band {
        self.bands[tier.index()]
    }

    /// First tier, in ascending order, whose band holds `deviation`.
    ///
    /// `n3` takes everything below its upper bound and `p3` everything at or
    /// above its lower bound.
    pub fn classify(&self, deviation: f64) -> Option<Tier> {
        Tier::ALL.into_iter().find(|&tier| {
            let band = self.band(tier);
            match tier {
                Tier::N3 => deviation < band.upper,
                Tier::P3 => deviation >= band.lower,
                _ => band.contains(deviation),
            }
        })
    }
}

fn write_bound(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    if value.is_infinite() {
        f.write_str(if value > 0.0 { "inf" } else { "-inf" })
    } else {
        write!(f, "{value}")
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, tier) in Tier::ALL.into_iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let band = self.band(tier);
            write!(f, "{tier}:[")?;
            write_bound(f, band.lower)?;
            f.write_str(",")?;
            write_bound(f, band.upper)?;
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl FromStr for RangeSet {
    type Err = SmartDcaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| SmartDcaError::InvalidRanges { reason };
        let mut bands: [Option<Band>; 7] = [None; 7];

        for token in s.split_whitespace() {
            let (label, interval) = token
                .split_once(':')
                .ok_or_else(|| invalid(format!("malformed entry `{token}`")))?;
            let tier: Tier = label.parse().map_err(invalid)?;
            let inner = interval
                .strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(')'))
                .ok_or_else(|| invalid(format!("expected `[lower,upper)` in `{token}`")))?;
            let (lower, upper) = inner
                .split_once(',')
                .ok_or_else(|| invalid(format!("expected two bounds in `{token}`")))?;
            let parse = |v: &str| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|e| invalid(format!("`{token}`: {e}")))
            };
            bands[tier.index()] = Some(Band::new(parse(lower)?, parse(upper)?));
        }

        let mut complete = [Band::new(0.0, 0.0); 7];
        for (slot, band) in complete.iter_mut().zip(bands) {
            *slot = band.ok_or_else(|| invalid(format!("expected 7 tiers in `{s}`")))?;
        }
        RangeSet::new(complete)
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Sample seven contiguous increasing boundaries.
///
/// With `force_negative` the negative tiers stay below zero; otherwise they
/// may reach the common ceiling.
pub fn random<R: Rng + ?Sized>(force_negative: bool, rng: &mut R) -> RangeSet {
    let negative_ceiling = if force_negative {
        0.0
    } else {
        RANDOM_BOUNDARY_CEILING
    };

    let mut bands = [Band::new(0.0, 0.0); 7];
    let mut lower = f64::NEG_INFINITY;

    for tier in Tier::ALL {
        let ceiling = if tier.is_negative() {
            negative_ceiling
        } else {
            RANDOM_BOUNDARY_CEILING
        };
        let floor = if lower.is_finite() {
            lower
        } else {
            -RANDOM_BOUNDARY_CEILING
        };
        let upper = if tier == Tier::P3 {
            f64::INFINITY
        } else {
            round_to_tenth(rng.gen_range(floor..=ceiling)).clamp(floor, ceiling)
        };
        bands[tier.index()] = Band::new(lower, upper);
        lower = upper;
    }

    RangeSet { bands }
}

/// Symmetric bands around zero for scan index `i`.
pub fn incremental(i: f64) -> RangeSet {
    let w = INCREMENTAL_BAND_WIDTH;
    let p1 = Band::new(i, i + w);
    let p2 = Band::new(i + w, i + 2.0 * w);
    let p3 = Band::new(i + 2.0 * w, f64::INFINITY);
    let mirror = |b: Band| Band::new(0.0 - b.upper, 0.0 - b.lower);

    RangeSet {
        bands: [
            mirror(p3),
            mirror(p2),
            mirror(p1),
            Band::new(0.0 - i, i),
            p1,
            p2,
            p3,
        ],
    }
}

/// Scan index for incremental step `step` (0-based).
pub fn incremental_index(step: usize) -> f64 {
    step as f64 * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_set() -> RangeSet {
        RangeSet::new([
            Band::new(f64::NEG_INFINITY, -10.0),
            Band::new(-10.0, -5.0),
            Band::new(-5.0, -1.0),
            Band::new(-1.0, 1.0),
            Band::new(1.0, 5.0),
            Band::new(5.0, 10.0),
            Band::new(10.0, f64::INFINITY),
        ])
        .unwrap()
    }

    #[test]
    fn classify_boundaries_are_lower_inclusive() {
        let set = sample_set();
        assert_eq!(set.classify(-10.0), Some(Tier::N2));
        assert_eq!(set.classify(-10.0001), Some(Tier::N3));
        assert_eq!(set.classify(-1.0), Some(Tier::Neutral));
        assert_eq!(set.classify(1.0), Some(Tier::P1));
        assert_eq!(set.classify(0.999), Some(Tier::Neutral));
        assert_eq!(set.classify(10.0), Some(Tier::P3));
        assert_eq!(set.classify(1e9), Some(Tier::P3));
        assert_eq!(set.classify(-1e9), Some(Tier::N3));
    }

    #[test]
    fn new_rejects_gaps() {
        let mut bands = [
            Band::new(f64::NEG_INFINITY, -10.0),
            Band::new(-10.0, -5.0),
            Band::new(-5.0, -1.0),
            Band::new(-1.0, 1.0),
            Band::new(1.0, 5.0),
            Band::new(5.0, 10.0),
            Band::new(10.0, f64::INFINITY),
        ];
        bands[4].upper = 4.0;
        let err = RangeSet::new(bands).unwrap_err();
        assert!(err.to_string().contains("gap between p1 and p2"));
    }

    #[test]
    fn new_rejects_bounded_outer_tiers() {
        let bands = [
            Band::new(-9999.0, -10.0),
            Band::new(-10.0, -5.0),
            Band::new(-5.0, -1.0),
            Band::new(-1.0, 1.0),
            Band::new(1.0, 5.0),
            Band::new(5.0, 10.0),
            Band::new(10.0, f64::INFINITY),
        ];
        assert!(RangeSet::new(bands).is_err());
    }

    #[test]
    fn incremental_zero_has_empty_neutral_band() {
        let set = incremental(0.0);
        assert_eq!(set.band(Tier::Neutral), Band::new(0.0, 0.0));
        assert_eq!(set.classify(0.0), Some(Tier::P1));
        assert_eq!(set.classify(-0.1), Some(Tier::N1));
    }

    #[test]
    fn incremental_bands_mirror() {
        let set = incremental(2.0);
        assert_eq!(set.band(Tier::Neutral), Band::new(-2.0, 2.0));
        assert_eq!(set.band(Tier::P1), Band::new(2.0, 4.5));
        assert_eq!(set.band(Tier::P2), Band::new(4.5, 7.0));
        assert_eq!(set.band(Tier::P3), Band::new(7.0, f64::INFINITY));
        assert_eq!(set.band(Tier::N1), Band::new(-4.5, -2.0));
        assert_eq!(set.band(Tier::N2), Band::new(-7.0, -4.5));
        assert_eq!(set.band(Tier::N3), Band::new(f64::NEG_INFINITY, -7.0));
        assert!(RangeSet::new(set.bands).is_ok());
    }

    #[test]
    fn incremental_scan_covers_zero_to_ten() {
        assert_eq!(incremental_index(0), 0.0);
        assert_eq!(incremental_index(INCREMENTAL_STEPS - 1), 10.0);
    }

    #[test]
    fn single_tier_catches_everything() {
        let set = RangeSet::single_tier();
        for d in [-1e12, -3.0, 0.0, 42.0, 1e12] {
            assert_eq!(set.classify(d), Some(Tier::Neutral));
        }
    }

    #[test]
    fn display_round_trips() {
        let set = incremental(0.5);
        let text = set.to_string();
        assert_eq!(
            text,
            "n3:[-inf,-5.5) n2:[-5.5,-3) n1:[-3,-0.5) 00:[-0.5,0.5) p1:[0.5,3) p2:[3,5.5) p3:[5.5,inf)"
        );
        assert_eq!(text.parse::<RangeSet>().unwrap(), set);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("n3:[-inf,0)".parse::<RangeSet>().is_err());
        assert!("0".parse::<RangeSet>().is_err());
    }

    #[test]
    fn forced_negative_keeps_negative_tiers_below_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let set = random(true, &mut rng);
            assert!(set.band(Tier::N1).upper <= 0.0);
        }
    }

    proptest! {
        #[test]
        fn random_sets_are_well_formed(seed in any::<u64>(), force in any::<bool>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let set = random(force, &mut rng);
            prop_assert!(RangeSet::new(set.bands).is_ok());
        }

        #[test]
        fn classification_is_total_and_exclusive(
            seed in any::<u64>(),
            deviation in -1.0e6f64..1.0e6,
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let set = random(false, &mut rng);
            let tier = set.classify(deviation);
            prop_assert!(tier.is_some());

            let tier = tier.unwrap();
            let holders = Tier::ALL
                .into_iter()
                .filter(|&t| set.band(t).contains(deviation))
                .count();
            prop_assert_eq!(holders, 1);
            prop_assert!(set.band(tier).contains(deviation));
        }
    }
}
