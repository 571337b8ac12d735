//! Trials: one parameter set simulated and measured.

use std::fmt;

use crate::domain::error::SmartDcaError;
use crate::domain::metrics::Metrics;
use crate::domain::multipliers::MultiplierSet;
use crate::domain::price::PriceSeries;
use crate::domain::ranges::RangeSet;
use crate::domain::simulation::{InvestmentRule, Ledger, simulate};

/// Trial identifier; `0` is the DCA baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrialId(pub u32);

impl TrialId {
    pub const BASELINE: TrialId = TrialId(0);

    pub fn is_baseline(self) -> bool {
        self == TrialId::BASELINE
    }
}

impl fmt::Display for TrialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialParams {
    pub multipliers: MultiplierSet,
    pub ranges: RangeSet,
}

impl TrialParams {
    pub fn rule(&self) -> InvestmentRule {
        InvestmentRule::Tiered {
            multipliers: self.multipliers,
            ranges: self.ranges,
        }
    }
}

/// Column names of a persisted ledger.
pub const LEDGER_HEADER: [&str; 7] = [
    "Close",
    "Shares",
    "Value",
    "Inv Monthly",
    "Invested Tot",
    "Avg NAV",
    "Drawdown",
];

/// Column names of the summary store and the best-results report.
pub const SUMMARY_HEADER: [&str; 9] = [
    "Trial",
    "Value",
    "Inv Total",
    "Gain",
    "All-time-high Drawdown",
    "Max Drawdown",
    "Time to Recovery",
    "Ranges",
    "Multipliers",
];

/// Placeholder for the parameter columns of the baseline.
pub const NO_PARAMS: &str = "-";

/// One row of the summary store.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSummary {
    pub trial: TrialId,
    pub final_value: f64,
    pub invested_total: f64,
    pub gain_pct: f64,
    pub ath_drawdown_pct: f64,
    pub max_drawdown_pct: f64,
    pub time_to_recovery: u32,
    /// `None` for the baseline.
    pub params: Option<TrialParams>,
}

impl TrialSummary {
    pub fn from_metrics(trial: TrialId, metrics: &Metrics, params: Option<TrialParams>) -> Self {
        TrialSummary {
            trial,
            final_value: metrics.final_value,
            invested_total: metrics.invested_total,
            gain_pct: metrics.gain_pct,
            ath_drawdown_pct: metrics.ath_drawdown_pct,
            max_drawdown_pct: metrics.max_drawdown_pct,
            time_to_recovery: metrics.time_to_recovery,
            params,
        }
    }

    pub fn rule(&self) -> InvestmentRule {
        self.params
            .map(|p| p.rule())
            .unwrap_or(InvestmentRule::Baseline)
    }

    pub fn ranges_label(&self) -> String {
        self.params
            .map(|p| p.ranges.to_string())
            .unwrap_or_else(|| NO_PARAMS.to_string())
    }

    pub fn multipliers_label(&self) -> String {
        self.params
            .map(|p| p.multipliers.to_string())
            .unwrap_or_else(|| NO_PARAMS.to_string())
    }
}

/// Inverse of the `Ranges`/`Multipliers` columns. Both must be `-` or both
/// must parse.
pub fn parse_params(ranges: &str, multipliers: &str) -> Result<Option<TrialParams>, SmartDcaError> {
    match (ranges.trim(), multipliers.trim()) {
        (NO_PARAMS, NO_PARAMS) => Ok(None),
        (ranges, multipliers) => Ok(Some(TrialParams {
            ranges: ranges.parse::<RangeSet>()?,
            multipliers: multipliers.parse::<MultiplierSet>()?,
        })),
    }
}

/// A finished trial: ledger with drawdown column, metrics and summary.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub ledger: Ledger,
    pub metrics: Metrics,
    pub summary: TrialSummary,
}

/// Simulate, then measure. `params == None` runs the baseline.
pub fn run_trial(
    series: &PriceSeries,
    trial: TrialId,
    params: Option<TrialParams>,
) -> Result<TrialOutcome, SmartDcaError> {
    let rule = params
        .map(|p| p.rule())
        .unwrap_or(InvestmentRule::Baseline);
    let mut ledger = simulate(series, &rule)?;
    let metrics = Metrics::compute(&mut ledger);
    let summary = TrialSummary::from_metrics(trial, &metrics, params);

    Ok(TrialOutcome {
        ledger,
        metrics,
        summary,
    })
}
