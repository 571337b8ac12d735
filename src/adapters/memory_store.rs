//! In-memory trial store for tests and small runs.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::domain::aggregate::BestResults;
use crate::domain::error::SmartDcaError;
use crate::domain::price::PriceSeries;
use crate::domain::simulation::Ledger;
use crate::domain::trial::{TrialId, TrialSummary};
use crate::ports::trial_store::{Loaded, TrialStore};

#[derive(Debug, Default)]
struct State {
    series: Option<PriceSeries>,
    ledgers: BTreeMap<TrialId, Ledger>,
    summaries: Vec<TrialSummary>,
    best: Option<BestResults>,
}

#[derive(Debug, Default)]
pub struct MemoryTrialStore {
    state: Mutex<State>,
}

impl MemoryTrialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, SmartDcaError> {
        self.state.lock().map_err(|_| SmartDcaError::Store {
            reason: "memory store lock poisoned".into(),
        })
    }

    /// Ids with a persisted ledger, ascending.
    pub fn ledger_ids(&self) -> Result<Vec<TrialId>, SmartDcaError> {
        Ok(self.state()?.ledgers.keys().copied().collect())
    }

    /// Summaries in append order.
    pub fn summaries(&self) -> Result<Vec<TrialSummary>, SmartDcaError> {
        Ok(self.state()?.summaries.clone())
    }

    pub fn best_results(&self) -> Result<Option<BestResults>, SmartDcaError> {
        Ok(self.state()?.best.clone())
    }

    pub fn price_series(&self) -> Result<Option<PriceSeries>, SmartDcaError> {
        Ok(self.state()?.series.clone())
    }
}

impl TrialStore for MemoryTrialStore {
    fn save_price_series(&self, series: &PriceSeries) -> Result<(), SmartDcaError> {
        self.state()?.series = Some(series.clone());
        Ok(())
    }

    fn save_ledger(&self, trial: TrialId, ledger: &Ledger) -> Result<(), SmartDcaError> {
        self.state()?.ledgers.insert(trial, ledger.clone());
        Ok(())
    }

    fn append_summary(&self, summary: &TrialSummary) -> Result<(), SmartDcaError> {
        self.state()?.summaries.push(summary.clone());
        Ok(())
    }

    fn load_summaries(&self) -> Result<Loaded<Vec<TrialSummary>>, SmartDcaError> {
        Ok(Loaded::new(self.summaries()?, 0))
    }

    fn load_ledger(&self, trial: TrialId) -> Result<Loaded<Ledger>, SmartDcaError> {
        self.state()?
            .ledgers
            .get(&trial)
            .cloned()
            .map(|ledger| Loaded::new(ledger, 0))
            .ok_or(SmartDcaError::TrialNotFound(trial.0))
    }

    fn write_best_results(&self, best: &BestResults) -> Result<(), SmartDcaError> {
        self.state()?.best = Some(best.clone());
        Ok(())
    }
}
