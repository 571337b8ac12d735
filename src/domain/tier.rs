//! Deviation tiers.
//!
//! Seven ordered bands of price deviation from the running average cost,
//! from most negative (`n3`) to most positive (`p3`).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    N3,
    N2,
    N1,
    Neutral,
    P1,
    P2,
    P3,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 7] = [
        Tier::N3,
        Tier::N2,
        Tier::N1,
        Tier::Neutral,
        Tier::P1,
        Tier::P2,
        Tier::P3,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Tier::N3 => "n3",
            Tier::N2 => "n2",
            Tier::N1 => "n1",
            Tier::Neutral => "00",
            Tier::P1 => "p1",
            Tier::P2 => "p2",
            Tier::P3 => "p3",
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, Tier::N3 | Tier::N2 | Tier::N1)
    }

    /// Distance from the neutral tier: 0 for `00`, 3 for `n3`/`p3`.
    pub fn distance(self) -> usize {
        self.index().abs_diff(Tier::Neutral.index())
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let label = trimmed.strip_prefix("tier_").unwrap_or(trimmed);
        Tier::ALL
            .into_iter()
            .find(|t| t.label() == label)
            .ok_or_else(|| format!("unknown tier: {s}"))
    }
}
