//! Risk and performance metrics for a completed ledger.

use crate::domain::simulation::Ledger;

/// Arbitrary base of the wealth index used for drawdowns.
const WEALTH_INDEX_BASE: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_value: f64,
    pub invested_total: f64,
    /// Percent gain over the amount invested.
    pub gain_pct: f64,
    /// Worst percent decline after the global peak (≤ 0).
    pub ath_drawdown_pct: f64,
    /// Most negative drawdown of the wealth index, in percent (≤ 0).
    pub max_drawdown_pct: f64,
    /// Months from the max-drawdown event until recovery or end of series.
    pub time_to_recovery: u32,
    /// False when the series ended before recovering.
    pub recovered: bool,
}

impl Metrics {
    /// Compute every metric and write the drawdown column onto the ledger.
    pub fn compute(ledger: &mut Ledger) -> Self {
        let values = ledger.values();
        let drawdowns = drawdown_series(&values);
        for (row, dd) in ledger.rows.iter_mut().zip(&drawdowns) {
            row.drawdown = Some(dd * 100.0);
        }

        let final_value = ledger.final_value();
        let invested_total = ledger.invested_total();
        let (time_to_recovery, recovered) = time_to_recovery(&values, &drawdowns);

        Metrics {
            final_value,
            invested_total,
            gain_pct: gain_pct(final_value, invested_total),
            ath_drawdown_pct: ath_drawdown_pct(&values),
            max_drawdown_pct: max_drawdown(&drawdowns) * 100.0,
            time_to_recovery,
            recovered,
        }
    }
}

pub fn gain_pct(final_value: f64, invested_total: f64) -> f64 {
    if invested_total > 0.0 {
        final_value * 100.0 / invested_total - 100.0
    } else {
        0.0
    }
}

/// `(w_t - peak_t) / peak_t` over a wealth index built from monthly returns.
pub fn drawdown_series(values: &[f64]) -> Vec<f64> {
    let mut drawdowns = Vec::with_capacity(values.len());
    let mut wealth = WEALTH_INDEX_BASE;
    let mut peak = WEALTH_INDEX_BASE;

    for (i, &value) in values.iter().enumerate() {
        if i > 0 {
            let prev = values[i - 1];
            let ret = if prev > 0.0 { value / prev - 1.0 } else { 0.0 };
            wealth *= 1.0 + ret;
        }
        if wealth > peak {
            peak = wealth;
        }
        drawdowns.push((wealth - peak) / peak);
    }

    drawdowns
}

/// Most negative drawdown, 0 for an empty or never-declining series.
pub fn max_drawdown(drawdowns: &[f64]) -> f64 {
    drawdowns.iter().copied().fold(0.0, f64::min)
}

/// `-(100 - min·100/max)` over the suffix starting at the global peak.
pub fn ath_drawdown_pct(values: &[f64]) -> f64 {
    let Some(peak_idx) = first_index_of_max(values) else {
        return 0.0;
    };
    let suffix = &values[peak_idx..];
    let peak = suffix[0];
    if peak <= 0.0 {
        return 0.0;
    }
    let low = suffix.iter().copied().fold(peak, f64::min);
    if low >= peak {
        return 0.0;
    }
    low * 100.0 / peak - 100.0
}

fn first_index_of_max(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Months from the first max-drawdown month until `value` first reaches
/// the value of that month again. Without a drawdown this is 0; if the
/// series never gets back, the count runs to the end of the series.
pub fn time_to_recovery(values: &[f64], drawdowns: &[f64]) -> (u32, bool) {
    let worst = max_drawdown(drawdowns);
    if worst >= 0.0 {
        return (0, true);
    }
    let Some(t0) = drawdowns.iter().position(|&d| d == worst) else {
        return (0, true);
    };

    let reference = values[t0];
    match values[t0 + 1..].iter().position(|&v| v >= reference) {
        Some(offset) => ((offset + 1) as u32, true),
        None => ((values.len() - t0) as u32, false),
    }
}
