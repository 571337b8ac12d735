//! Month-by-month accumulation state machine.
//!
//! Each month the deviation of the close from the running average cost is
//! classified into a tier, the tier's multiplier scales the base
//! contribution, and the resulting purchase is appended to the ledger.

use crate::domain::error::SmartDcaError;
use crate::domain::multipliers::MultiplierSet;
use crate::domain::price::PriceSeries;
use crate::domain::ranges::RangeSet;
use crate::domain::tier::Tier;

/// Amount invested in a month whose multiplier is 1.
pub const BASE_CONTRIBUTION: f64 = 100.0;

/// How much to invest each month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvestmentRule {
    /// Plain DCA: the base contribution every month.
    Baseline,
    /// Contrarian tiers: scale the contribution by the tier of the deviation.
    Tiered {
        multipliers: MultiplierSet,
        ranges: RangeSet,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub close: f64,
    pub shares: f64,
    pub value: f64,
    pub invested_month: f64,
    pub invested_total: f64,
    pub avg_cost: f64,
    /// Percent below the running peak; filled by the metrics pass.
    pub drawdown: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    pub rows: Vec<LedgerRow>,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&LedgerRow> {
        self.rows.last()
    }

    pub fn values(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.value).collect()
    }

    pub fn invested_total(&self) -> f64 {
        self.last().map(|r| r.invested_total).unwrap_or(0.0)
    }

    pub fn final_value(&self) -> f64 {
        self.last().map(|r| r.value).unwrap_or(0.0)
    }
}

/// Percentage distance of `close` from the average cost; 0 before the
/// first purchase.
pub fn deviation(close: f64, avg_cost: Option<f64>) -> f64 {
    match avg_cost {
        Some(acb) if acb != 0.0 => (close - acb) * 100.0 / acb,
        _ => 0.0,
    }
}

/// Run one trial over the whole series.
pub fn simulate(series: &PriceSeries, rule: &InvestmentRule) -> Result<Ledger, SmartDcaError> {
    let mut shares = 0.0_f64;
    let mut invested_total = 0.0_f64;
    let mut avg_cost: Option<f64> = None;
    let mut rows = Vec::with_capacity(series.len());

    for close in series.closes() {
        let multiplier = match rule {
            InvestmentRule::Baseline => 1.0,
            InvestmentRule::Tiered {
                multipliers,
                ranges,
            } => {
                let deviation = deviation(close, avg_cost);
                let tier: Tier = ranges
                    .classify(deviation)
                    .ok_or(SmartDcaError::Unclassified { deviation })?;
                multipliers.get(tier)
            }
        };

        let invested_month = BASE_CONTRIBUTION * multiplier;
        invested_total += invested_month;
        shares += invested_month / close;
        let acb = invested_total / shares;
        avg_cost = Some(acb);

        rows.push(LedgerRow {
            close,
            shares,
            value: shares * close,
            invested_month,
            invested_total,
            avg_cost: acb,
            drawdown: None,
        });
    }

    Ok(Ledger { rows })
}
