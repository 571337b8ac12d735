//! CSV price source and CSV-directory trial store.

use crate::domain::aggregate::BestResults;
use crate::domain::error::SmartDcaError;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::domain::simulation::{Ledger, LedgerRow};
use crate::domain::trial::{LEDGER_HEADER, SUMMARY_HEADER, TrialId, TrialSummary, parse_params};
use crate::ports::data_port::PriceDataPort;
use crate::ports::trial_store::{Loaded, TrialStore};
use chrono::NaiveDate;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Reads `<base_path>/<asset>.csv` exports with `Date` and `Close` columns.
pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", asset))
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse_export_date(field: &str) -> Option<NaiveDate> {
    let field = field.trim();
    let day = field.get(..10).unwrap_or(field);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

impl PriceDataPort for CsvPriceAdapter {
    fn fetch_closes(
        &self,
        asset: &str,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, SmartDcaError> {
        let path = self.csv_path(asset);
        let content = fs::read_to_string(&path).map_err(|e| SmartDcaError::PriceData {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr.headers().map_err(|e| SmartDcaError::PriceData {
            reason: format!("CSV header error in {}: {}", path.display(), e),
        })?;
        let (date_col, close_col) = match (column_index(headers, "date"), column_index(headers, "close")) {
            (Some(d), Some(c)) => (d, c),
            _ => {
                return Err(SmartDcaError::PriceData {
                    reason: format!("{} needs Date and Close columns", path.display()),
                });
            }
        };

        let mut points = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            let row = i + 2;
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    warn!(file = %path.display(), row, error = %e, "skipping unreadable price row");
                    continue;
                }
            };

            let date = record.get(date_col).and_then(parse_export_date);
            let close = record
                .get(close_col)
                .and_then(|c| c.trim().parse::<f64>().ok())
                .filter(|c| c.is_finite() && *c > 0.0);
            let (date, close) = match (date, close) {
                (Some(d), Some(c)) => (d, c),
                _ => {
                    warn!(file = %path.display(), row, "skipping price row without a valid date and close");
                    continue;
                }
            };

            if start.is_some_and(|s| date < s) || date > end {
                continue;
            }
            points.push(PricePoint::new(date, close));
        }

        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

const LEDGER_DIR: &str = "trials";
const BASELINE_FILE: &str = "dca.csv";
const SUMMARY_FILE: &str = "mapper.csv";
const BEST_FILE: &str = "best_results.csv";
const HISTORICAL_FILE: &str = "historical.csv";

/// One output directory per run:
///
/// ```text
/// dca.csv  trials/trial_<id>.csv  mapper.csv  best_results.csv  historical.csv
/// ```
pub struct CsvTrialStore {
    dir: PathBuf,
    summaries: Mutex<Option<csv::Writer<File>>>,
}

impl CsvTrialStore {
    /// Create the directory layout for a new run.
    pub fn create(dir: PathBuf) -> Result<Self, SmartDcaError> {
        fs::create_dir_all(dir.join(LEDGER_DIR))?;
        Ok(Self {
            dir,
            summaries: Mutex::new(None),
        })
    }

    /// Open an existing run directory for re-aggregation or inspection.
    pub fn open(dir: PathBuf) -> Result<Self, SmartDcaError> {
        if !dir.join(SUMMARY_FILE).is_file() {
            return Err(SmartDcaError::Store {
                reason: format!("{} has no {}", dir.display(), SUMMARY_FILE),
            });
        }
        Ok(Self {
            dir,
            summaries: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ledger_path(&self, trial: TrialId) -> PathBuf {
        if trial.is_baseline() {
            self.dir.join(BASELINE_FILE)
        } else {
            self.dir.join(LEDGER_DIR).join(format!("trial_{}.csv", trial))
        }
    }

    fn lock_poisoned() -> SmartDcaError {
        SmartDcaError::Store {
            reason: "summary writer lock poisoned".into(),
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn summary_record(s: &TrialSummary) -> [String; 9] {
    [
        s.trial.to_string(),
        s.final_value.to_string(),
        s.invested_total.to_string(),
        s.gain_pct.to_string(),
        s.ath_drawdown_pct.to_string(),
        s.max_drawdown_pct.to_string(),
        s.time_to_recovery.to_string(),
        s.ranges_label(),
        s.multipliers_label(),
    ]
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .ok_or_else(|| format!("missing {name}"))
}

fn number(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = field(record, idx, name)?;
    raw.parse::<f64>()
        .map_err(|_| format!("{name} `{raw}` is not a number"))
}

fn parse_summary(record: &csv::StringRecord) -> Result<TrialSummary, String> {
    let trial = field(record, 0, "trial")?;
    let trial = trial
        .parse::<u32>()
        .map_err(|_| format!("trial `{trial}` is not an id"))?;
    let ttr = field(record, 6, "time to recovery")?;
    let time_to_recovery = ttr
        .parse::<u32>()
        .map_err(|_| format!("time to recovery `{ttr}` is not a month count"))?;
    let params = parse_params(field(record, 7, "ranges")?, field(record, 8, "multipliers")?)
        .map_err(|e| e.to_string())?;

    Ok(TrialSummary {
        trial: TrialId(trial),
        final_value: number(record, 1, "value")?,
        invested_total: number(record, 2, "invested total")?,
        gain_pct: number(record, 3, "gain")?,
        ath_drawdown_pct: number(record, 4, "all-time-high drawdown")?,
        max_drawdown_pct: number(record, 5, "max drawdown")?,
        time_to_recovery,
        params,
    })
}

fn parse_ledger_row(record: &csv::StringRecord) -> Result<LedgerRow, String> {
    let drawdown = match record.get(6).map(str::trim) {
        None | Some("") => None,
        Some(_) => Some(number(record, 6, "drawdown")?),
    };
    Ok(LedgerRow {
        close: number(record, 0, "close")?,
        shares: number(record, 1, "shares")?,
        value: number(record, 2, "value")?,
        invested_month: number(record, 3, "monthly investment")?,
        invested_total: number(record, 4, "invested total")?,
        avg_cost: number(record, 5, "average cost")?,
        drawdown,
    })
}

/// Parse every data row, skipping and logging the malformed ones.
fn read_lenient<T>(
    path: &Path,
    parse: impl Fn(&csv::StringRecord) -> Result<T, String>,
) -> Result<Loaded<Vec<T>>, SmartDcaError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    let mut skipped = 0;

    for (i, result) in rdr.records().enumerate() {
        let row = i + 2;
        let parsed = result
            .map_err(|e| e.to_string())
            .and_then(|record| parse(&record));
        match parsed {
            Ok(value) => rows.push(value),
            Err(reason) => {
                warn!(file = %path.display(), row, %reason, "skipping malformed row");
                skipped += 1;
            }
        }
    }

    Ok(Loaded::new(rows, skipped))
}

impl TrialStore for CsvTrialStore {
    fn save_price_series(&self, series: &PriceSeries) -> Result<(), SmartDcaError> {
        let mut wtr = csv::Writer::from_path(self.dir.join(HISTORICAL_FILE))?;
        wtr.write_record(["Date", "Close"])?;
        for p in series.points() {
            wtr.write_record([p.date.format("%Y-%m-%d").to_string(), p.close.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn save_ledger(&self, trial: TrialId, ledger: &Ledger) -> Result<(), SmartDcaError> {
        let mut wtr = csv::Writer::from_path(self.ledger_path(trial))?;
        wtr.write_record(LEDGER_HEADER)?;
        for r in &ledger.rows {
            wtr.write_record([
                r.close.to_string(),
                r.shares.to_string(),
                r.value.to_string(),
                r.invested_month.to_string(),
                r.invested_total.to_string(),
                r.avg_cost.to_string(),
                fmt_opt(r.drawdown),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn append_summary(&self, summary: &TrialSummary) -> Result<(), SmartDcaError> {
        let mut guard = self.summaries.lock().map_err(|_| Self::lock_poisoned())?;
        if guard.is_none() {
            let path = self.dir.join(SUMMARY_FILE);
            let fresh = !path.exists();
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let mut wtr = csv::Writer::from_writer(file);
            if fresh {
                wtr.write_record(SUMMARY_HEADER)?;
            }
            *guard = Some(wtr);
        }
        if let Some(wtr) = guard.as_mut() {
            wtr.write_record(summary_record(summary))?;
            wtr.flush()?;
        }
        Ok(())
    }

    fn load_summaries(&self) -> Result<Loaded<Vec<TrialSummary>>, SmartDcaError> {
        read_lenient(&self.dir.join(SUMMARY_FILE), parse_summary)
    }

    fn load_ledger(&self, trial: TrialId) -> Result<Loaded<Ledger>, SmartDcaError> {
        let path = self.ledger_path(trial);
        if !path.is_file() {
            return Err(SmartDcaError::TrialNotFound(trial.0));
        }
        let loaded = read_lenient(&path, parse_ledger_row)?;
        Ok(Loaded::new(Ledger { rows: loaded.value }, loaded.skipped))
    }

    fn write_best_results(&self, best: &BestResults) -> Result<(), SmartDcaError> {
        let mut wtr = csv::Writer::from_path(self.dir.join(BEST_FILE))?;
        wtr.write_record(SUMMARY_HEADER)?;
        for row in best.rows() {
            wtr.write_record(summary_record(row))?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregate::aggregate;
    use crate::domain::multipliers::{self, MultiplierConfig};
    use crate::domain::ranges;
    use crate::domain::trial::{TrialParams, run_trial};
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn setup_prices() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "Date,Open,High,Low,Close,Adj Close,Volume\n\
            2024-01-02 00:00:00+01:00,99.0,101.0,98.0,100.0,100.0,1000\n\
            2024-01-03 00:00:00+01:00,100.0,103.0,99.0,102.0,102.0,1000\n\
            2024-02-01 00:00:00+01:00,101.0,106.0,100.0,105.0,105.0,1000\n\
            2024-02-02 00:00:00+01:00,null,null,null,null,null,null\n\
            2024-03-01 00:00:00+01:00,95.0,97.0,94.0,96.0,96.0,1000\n";
        fs::write(path.join("SWDA.MI.csv"), csv_content).unwrap();
        fs::write(path.join("NOCLOSE.csv"), "Date,Open\n2024-01-02,1.0\n").unwrap();

        (dir, path)
    }

    fn series() -> PriceSeries {
        let points = [100.0, 110.0, 90.0, 120.0]
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint::new(d(2021, 1 + i as u32, 1), c))
            .collect();
        PriceSeries::new("TEST", points).unwrap()
    }

    #[test]
    fn fetch_closes_reads_yahoo_export() {
        let (_dir, path) = setup_prices();
        let adapter = CsvPriceAdapter::new(path);

        let closes = adapter.fetch_closes("SWDA.MI", None, d(2024, 12, 31)).unwrap();
        assert_eq!(closes.len(), 4);
        assert_eq!(closes[0], PricePoint::new(d(2024, 1, 2), 100.0));

        let series = adapter
            .fetch_price_series("SWDA.MI", None, d(2024, 12, 31))
            .unwrap();
        let monthly: Vec<f64> = series.closes().collect();
        assert_eq!(monthly, vec![100.0, 105.0, 96.0]);
    }

    #[test]
    fn fetch_closes_filters_by_date() {
        let (_dir, path) = setup_prices();
        let adapter = CsvPriceAdapter::new(path);

        let closes = adapter
            .fetch_closes("SWDA.MI", Some(d(2024, 2, 1)), d(2024, 2, 29))
            .unwrap();
        assert_eq!(closes, vec![PricePoint::new(d(2024, 2, 1), 105.0)]);
    }

    #[test]
    fn missing_file_or_column_is_price_error() {
        let (_dir, path) = setup_prices();
        let adapter = CsvPriceAdapter::new(path);

        let err = adapter.fetch_closes("XYZ", None, d(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, SmartDcaError::PriceData { .. }));
        let err = adapter.fetch_closes("NOCLOSE", None, d(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, SmartDcaError::PriceData { .. }));
    }

    #[test]
    fn no_rows_in_range_is_no_data() {
        let (_dir, path) = setup_prices();
        let adapter = CsvPriceAdapter::new(path);
        let err = adapter
            .fetch_price_series("SWDA.MI", Some(d(2030, 1, 1)), d(2030, 12, 31))
            .unwrap_err();
        assert!(matches!(err, SmartDcaError::NoData { .. }));
    }

    #[test]
    fn store_writes_run_layout() {
        let dir = TempDir::new().unwrap();
        let store = CsvTrialStore::create(dir.path().join("run")).unwrap();
        let s = series();

        let baseline = run_trial(&s, TrialId::BASELINE, None).unwrap();
        let params = TrialParams {
            multipliers: multipliers::deterministic(&MultiplierConfig::default()),
            ranges: ranges::incremental(0.0),
        };
        let trial = run_trial(&s, TrialId(1), Some(params)).unwrap();

        store.save_price_series(&s).unwrap();
        store.save_ledger(TrialId::BASELINE, &baseline.ledger).unwrap();
        store.save_ledger(TrialId(1), &trial.ledger).unwrap();
        store.append_summary(&baseline.summary).unwrap();
        store.append_summary(&trial.summary).unwrap();

        let run = store.dir();
        assert!(run.join("dca.csv").is_file());
        assert!(run.join("trials").join("trial_1.csv").is_file());
        let historical = fs::read_to_string(run.join("historical.csv")).unwrap();
        assert!(historical.starts_with("Date,Close\n2021-01-01,100\n"));

        let mapper = fs::read_to_string(run.join("mapper.csv")).unwrap();
        let mut lines = mapper.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Trial,Value,Inv Total,Gain,All-time-high Drawdown,Max Drawdown,Time to Recovery,Ranges,Multipliers"
        );
        assert!(lines.next().unwrap().ends_with(",-,-"));

        let loaded = store.load_summaries().unwrap();
        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.value, vec![baseline.summary.clone(), trial.summary.clone()]);

        let ledger = store.load_ledger(TrialId(1)).unwrap();
        assert_eq!(ledger.value, trial.ledger);

        let best = aggregate(&loaded.value).unwrap();
        store.write_best_results(&best).unwrap();
        let report = fs::read_to_string(run.join("best_results.csv")).unwrap();
        assert_eq!(report.lines().count(), 7);
    }

    #[test]
    fn malformed_summary_rows_are_skipped() {
        let dir = TempDir::new().unwrap();
        let run = dir.path().to_path_buf();
        fs::write(
            run.join("mapper.csv"),
            "Trial,Value,Inv Total,Gain,All-time-high Drawdown,Max Drawdown,Time to Recovery,Ranges,Multipliers\n\
             0,110,100,10,-5,-5,2,-,-\n\
             x,1,1,1,1,1,1,-,-\n\
             1,abc,100,10,-5,-5,2,-,-\n\
             2,120,100,20,-3,-3,1,-,-\n",
        )
        .unwrap();

        let store = CsvTrialStore::open(run).unwrap();
        let loaded = store.load_summaries().unwrap();
        assert_eq!(loaded.skipped, 2);
        let ids: Vec<u32> = loaded.value.iter().map(|s| s.trial.0).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn open_requires_summary_store() {
        let dir = TempDir::new().unwrap();
        assert!(CsvTrialStore::open(dir.path().to_path_buf()).is_err());
    }

    #[test]
    fn missing_ledger_is_trial_not_found() {
        let dir = TempDir::new().unwrap();
        let store = CsvTrialStore::create(dir.path().to_path_buf()).unwrap();
        assert!(matches!(
            store.load_ledger(TrialId(9)),
            Err(SmartDcaError::TrialNotFound(9))
        ));
    }
}
