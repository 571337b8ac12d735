//! Best-trial selection across the five headline metrics.

use std::fmt;

use tracing::warn;

use crate::domain::error::SmartDcaError;
use crate::domain::trial::TrialSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    FinalValue,
    Gain,
    AthDrawdown,
    MaxDrawdown,
    TimeToRecovery,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::FinalValue,
        Metric::Gain,
        Metric::AthDrawdown,
        Metric::MaxDrawdown,
        Metric::TimeToRecovery,
    ];

    /// Higher is better for value and gain, lower for the risk metrics.
    pub fn maximize(self) -> bool {
        matches!(self, Metric::FinalValue | Metric::Gain)
    }

    pub fn value(self, summary: &TrialSummary) -> f64 {
        match self {
            Metric::FinalValue => summary.final_value,
            Metric::Gain => summary.gain_pct,
            Metric::AthDrawdown => summary.ath_drawdown_pct,
            Metric::MaxDrawdown => summary.max_drawdown_pct,
            Metric::TimeToRecovery => f64::from(summary.time_to_recovery),
        }
    }

    /// Quantity the comparator ranks on. Drawdowns are stored as
    /// non-positive percentages and rank by magnitude, so the least
    /// negative one wins.
    pub fn score(self, summary: &TrialSummary) -> f64 {
        match self {
            Metric::AthDrawdown | Metric::MaxDrawdown => self.value(summary).abs(),
            _ => self.value(summary),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Metric::FinalValue => "Value",
            Metric::Gain => "Gain",
            Metric::AthDrawdown => "All-time-high drawdown",
            Metric::MaxDrawdown => "Max drawdown",
            Metric::TimeToRecovery => "Time to recovery",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Baseline plus the winning trial for each metric.
#[derive(Debug, Clone, PartialEq)]
pub struct BestResults {
    pub baseline: TrialSummary,
    pub final_value: TrialSummary,
    pub gain: TrialSummary,
    pub ath_drawdown: TrialSummary,
    pub max_drawdown: TrialSummary,
    pub time_to_recovery: TrialSummary,
}

impl BestResults {
    pub fn winner(&self, metric: Metric) -> &TrialSummary {
        match metric {
            Metric::FinalValue => &self.final_value,
            Metric::Gain => &self.gain,
            Metric::AthDrawdown => &self.ath_drawdown,
            Metric::MaxDrawdown => &self.max_drawdown,
            Metric::TimeToRecovery => &self.time_to_recovery,
        }
    }

    /// The six report rows: baseline first, then winners in metric order.
    pub fn rows(&self) -> [&TrialSummary; 6] {
        [
            &self.baseline,
            &self.final_value,
            &self.gain,
            &self.ath_drawdown,
            &self.max_drawdown,
            &self.time_to_recovery,
        ]
    }
}

/// Scan every summary in ascending id order; ties keep the later trial.
pub fn aggregate(summaries: &[TrialSummary]) -> Result<BestResults, SmartDcaError> {
    let mut ordered: Vec<&TrialSummary> = summaries.iter().collect();
    ordered.sort_by_key(|s| s.trial);

    let baseline = ordered
        .iter()
        .find(|s| s.trial.is_baseline())
        .copied()
        .ok_or(SmartDcaError::MissingBaseline)?;
    let trials: Vec<&TrialSummary> = ordered
        .into_iter()
        .filter(|s| !s.trial.is_baseline())
        .collect();
    if trials.is_empty() {
        return Err(SmartDcaError::NoTrials);
    }

    let best = |metric: Metric| -> Result<TrialSummary, SmartDcaError> {
        let mut winner: Option<(&TrialSummary, f64)> = None;
        for summary in &trials {
            let value = metric.score(summary);
            if !value.is_finite() {
                warn!(trial = %summary.trial, metric = %metric, value, "skipping non-finite metric");
                continue;
            }
            let keep = match winner {
                None => true,
                Some((_, current)) if metric.maximize() => value >= current,
                Some((_, current)) => value <= current,
            };
            if keep {
                winner = Some((summary, value));
            }
        }
        winner
            .map(|(s, _)| s.clone())
            .ok_or(SmartDcaError::NoTrials)
    };

    Ok(BestResults {
        baseline: baseline.clone(),
        final_value: best(Metric::FinalValue)?,
        gain: best(Metric::Gain)?,
        ath_drawdown: best(Metric::AthDrawdown)?,
        max_drawdown: best(Metric::MaxDrawdown)?,
        time_to_recovery: best(Metric::TimeToRecovery)?,
    })
}
