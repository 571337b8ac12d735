//! Durable trial records: ledgers, the summary store and the best-results
//! report.

use crate::domain::aggregate::BestResults;
use crate::domain::error::SmartDcaError;
use crate::domain::price::PriceSeries;
use crate::domain::simulation::Ledger;
use crate::domain::trial::{TrialId, TrialSummary};

/// Rows read back from a store, with the count of malformed rows dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub value: T,
    pub skipped: usize,
}

impl<T> Loaded<T> {
    pub fn new(value: T, skipped: usize) -> Self {
        Loaded { value, skipped }
    }
}

/// Shared by every sweep worker, hence `Send + Sync`.
///
/// Summaries are appended by a single writer in trial-id order; ledgers may
/// be saved from any worker, one trial per key.
pub trait TrialStore: Send + Sync {
    /// The monthly series the sweep actually simulated.
    fn save_price_series(&self, series: &PriceSeries) -> Result<(), SmartDcaError>;

    fn save_ledger(&self, trial: TrialId, ledger: &Ledger) -> Result<(), SmartDcaError>;

    fn append_summary(&self, summary: &TrialSummary) -> Result<(), SmartDcaError>;

    fn load_summaries(&self) -> Result<Loaded<Vec<TrialSummary>>, SmartDcaError>;

    fn load_ledger(&self, trial: TrialId) -> Result<Loaded<Ledger>, SmartDcaError>;

    /// Replace any previous report with `best`.
    fn write_best_results(&self, best: &BestResults) -> Result<(), SmartDcaError>;
}
