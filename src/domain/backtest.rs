//! Sweep orchestration: baseline, parallel trials, ordered persistence,
//! aggregation.
//!
//! [`BacktestConfig`] is built once from layered configuration and passed
//! explicitly; nothing here reads global state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::mpsc;
use std::thread;

use chrono::{Datelike, NaiveDate};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::domain::aggregate::{BestResults, aggregate};
use crate::domain::error::SmartDcaError;
use crate::domain::generator::{ParamGenerator, RangeMode};
use crate::domain::metrics::Metrics;
use crate::domain::multipliers::MultiplierConfig;
use crate::domain::price::PriceSeries;
use crate::domain::trial::{TrialId, TrialSummary, run_trial};
use crate::ports::trial_store::{Loaded, TrialStore};

/// How far back the price history goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    All,
    /// From January 1st, `n` years before the current year.
    Years(u32),
}

impl Period {
    pub fn start_date(self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::All => None,
            Period::Years(n) => {
                let year = today.year() - i32::try_from(n).unwrap_or(i32::MAX);
                NaiveDate::from_ymd_opt(year, 1, 1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// `<dir>/<asset>.csv`
    Csv { dir: PathBuf },
    /// Table `prices(asset, date, close)`.
    Sqlite { path: PathBuf, pool_size: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Csv,
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(StoreKind::Csv),
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("unknown store `{other}` (expected csv, sqlite or memory)")),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::Csv => "csv",
            StoreKind::Sqlite => "sqlite",
            StoreKind::Memory => "memory",
        })
    }
}

/// Which trial ledgers end up persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerRetention {
    All,
    /// Baseline during the sweep, winners re-simulated afterwards.
    Winners,
}

impl FromStr for LedgerRetention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(LedgerRetention::All),
            "winners" => Ok(LedgerRetention::Winners),
            other => Err(format!("unknown ledger retention `{other}` (expected all or winners)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub asset: String,
    pub period: Period,
    pub data_source: DataSource,
    pub multipliers: MultiplierConfig,
    pub range_mode: RangeMode,
    pub force_negative: bool,
    /// Directory under which `smart-dca-backtest/` is created.
    pub output_root: Option<PathBuf>,
    pub store: StoreKind,
    pub ledgers: LedgerRetention,
    /// Worker threads; 0 means one per CPU.
    pub jobs: usize,
    pub seed: u64,
    pub quiet: bool,
    pub timing: bool,
}

impl BacktestConfig {
    pub fn generator(&self) -> ParamGenerator {
        ParamGenerator::new(
            self.multipliers.clone(),
            self.range_mode,
            self.force_negative,
            self.seed,
        )
    }
}

/// Reorder buffer between the workers and the single summary writer.
///
/// Summaries arrive in completion order and leave in trial-id order.
#[derive(Debug)]
pub struct SummaryFunnel {
    next: u32,
    pending: BTreeMap<u32, TrialSummary>,
}

impl SummaryFunnel {
    pub fn new(first: u32) -> Self {
        SummaryFunnel {
            next: first,
            pending: BTreeMap::new(),
        }
    }

    /// Accept one summary and release every summary now in sequence.
    pub fn push(&mut self, summary: TrialSummary) -> Vec<TrialSummary> {
        self.pending.insert(summary.trial.0, summary);
        let mut ready = Vec::new();
        while let Some(next) = self.pending.remove(&self.next) {
            ready.push(next);
            match self.next.checked_add(1) {
                Some(n) => self.next = n,
                None => break,
            }
        }
        ready
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Run the whole sweep against an already loaded series.
pub fn run_backtest(
    series: &PriceSeries,
    config: &BacktestConfig,
    store: &dyn TrialStore,
) -> Result<BestResults, SmartDcaError> {
    let generator = config.generator();
    store.save_price_series(series)?;

    info!(
        asset = series.asset(),
        months = series.len(),
        start = %series.start_date(),
        "simulating baseline"
    );
    let baseline = run_trial(series, TrialId::BASELINE, None)?;
    store.save_ledger(TrialId::BASELINE, &baseline.ledger)?;
    store.append_summary(&baseline.summary)?;

    let ids: Vec<u32> = generator.trial_ids().collect();
    info!(
        trials = ids.len(),
        jobs = config.jobs,
        seed = config.seed,
        "running sweep"
    );
    let mut summaries = vec![baseline.summary];
    summaries.extend(sweep(series, &generator, &ids, config, store)?);

    let best = aggregate(&summaries)?;
    if config.ledgers == LedgerRetention::Winners {
        persist_winner_ledgers(series, &best, store)?;
    }
    store.write_best_results(&best)?;
    Ok(best)
}

fn sweep(
    series: &PriceSeries,
    generator: &ParamGenerator,
    ids: &[u32],
    config: &BacktestConfig,
    store: &dyn TrialStore,
) -> Result<Vec<TrialSummary>, SmartDcaError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.jobs)
        .build()
        .map_err(|e| SmartDcaError::Store {
            reason: format!("failed to build worker pool: {e}"),
        })?;
    let keep_ledgers = config.ledgers == LedgerRetention::All;

    thread::scope(|scope| -> Result<Vec<TrialSummary>, SmartDcaError> {
        let (tx, rx) = mpsc::channel::<TrialSummary>();

        let writer = scope.spawn(move || -> Result<(Vec<TrialSummary>, usize), SmartDcaError> {
            let mut funnel = SummaryFunnel::new(1);
            let mut written = Vec::new();
            for summary in rx {
                for ready in funnel.push(summary) {
                    store.append_summary(&ready)?;
                    written.push(ready);
                }
            }
            Ok((written, funnel.pending()))
        });

        let workers = pool.install(|| {
            ids.par_iter().try_for_each_with(tx, |tx, &id| {
                let trial = TrialId(id);
                let params = generator.params(trial);
                let outcome = run_trial(series, trial, Some(params))?;
                if keep_ledgers {
                    store.save_ledger(trial, &outcome.ledger)?;
                }
                debug!(
                    trial = id,
                    value = outcome.summary.final_value,
                    gain = outcome.summary.gain_pct,
                    "trial done"
                );
                tx.send(outcome.summary).map_err(|_| SmartDcaError::Store {
                    reason: "summary writer stopped".into(),
                })
            })
        });

        let written = writer.join().map_err(|_| SmartDcaError::Store {
            reason: "summary writer panicked".into(),
        })?;
        // A writer failure also makes every later send fail; report the cause.
        let (written, stranded) = written?;
        workers?;
        if stranded > 0 {
            return Err(SmartDcaError::Store {
                reason: format!("{stranded} summaries left out of sequence"),
            });
        }
        Ok(written)
    })
}

/// Re-simulate each distinct winner and persist its ledger.
pub fn persist_winner_ledgers(
    series: &PriceSeries,
    best: &BestResults,
    store: &dyn TrialStore,
) -> Result<(), SmartDcaError> {
    let mut winners: Vec<&TrialSummary> = best.rows()[1..].to_vec();
    winners.sort_by_key(|s| s.trial);
    winners.dedup_by_key(|s| s.trial);

    for summary in winners {
        let outcome = run_trial(series, summary.trial, summary.params)?;
        store.save_ledger(summary.trial, &outcome.ledger)?;
        debug!(trial = %summary.trial, "winner ledger persisted");
    }
    Ok(())
}

/// Re-aggregate a persisted summary store and rewrite its report.
pub fn resummarize(store: &dyn TrialStore) -> Result<Loaded<BestResults>, SmartDcaError> {
    let loaded = store.load_summaries()?;
    let best = aggregate(&loaded.value)?;
    store.write_best_results(&best)?;
    Ok(Loaded::new(best, loaded.skipped))
}

/// Recompute the metrics of a persisted ledger.
pub fn inspect_trial(store: &dyn TrialStore, trial: TrialId) -> Result<Loaded<Metrics>, SmartDcaError> {
    let loaded = store.load_ledger(trial)?;
    let mut ledger = loaded.value;
    if ledger.is_empty() {
        return Err(SmartDcaError::TrialNotFound(trial.0));
    }
    Ok(Loaded::new(Metrics::compute(&mut ledger), loaded.skipped))
}
