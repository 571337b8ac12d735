//! SQLite price source and trial store.

use crate::domain::aggregate::BestResults;
use crate::domain::error::SmartDcaError;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::domain::simulation::{Ledger, LedgerRow};
use crate::domain::trial::{TrialId, TrialSummary, parse_params};
use crate::ports::data_port::PriceDataPort;
use crate::ports::trial_store::{Loaded, TrialStore};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS prices (
        asset TEXT NOT NULL,
        date TEXT NOT NULL,
        close REAL NOT NULL,
        PRIMARY KEY (asset, date)
    );
    CREATE TABLE IF NOT EXISTS historical (
        date TEXT PRIMARY KEY,
        close REAL NOT NULL
    );
    CREATE TABLE IF NOT EXISTS trial_ledgers (
        trial INTEGER NOT NULL,
        month INTEGER NOT NULL,
        close REAL NOT NULL,
        shares REAL NOT NULL,
        value REAL NOT NULL,
        invested_month REAL NOT NULL,
        invested_total REAL NOT NULL,
        avg_cost REAL NOT NULL,
        drawdown REAL,
        PRIMARY KEY (trial, month)
    );
    CREATE TABLE IF NOT EXISTS trial_summaries (
        trial INTEGER PRIMARY KEY,
        final_value REAL,
        invested_total REAL,
        gain REAL,
        ath_drawdown REAL,
        max_drawdown REAL,
        time_to_recovery INTEGER,
        ranges TEXT NOT NULL,
        multipliers TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS best_results (
        position INTEGER PRIMARY KEY,
        trial INTEGER NOT NULL,
        final_value REAL,
        invested_total REAL,
        gain REAL,
        ath_drawdown REAL,
        max_drawdown REAL,
        time_to_recovery INTEGER,
        ranges TEXT NOT NULL,
        multipliers TEXT NOT NULL
    );";

const SUMMARY_COLUMNS: &str = "trial, final_value, invested_total, gain, ath_drawdown, \
                               max_drawdown, time_to_recovery, ranges, multipliers";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn store_err(e: impl std::fmt::Display) -> SmartDcaError {
    SmartDcaError::Store {
        reason: e.to_string(),
    }
}

fn price_err(e: impl std::fmt::Display) -> SmartDcaError {
    SmartDcaError::PriceData {
        reason: e.to_string(),
    }
}

impl SqliteAdapter {
    /// Open (or create) a database file and make sure the schema exists.
    pub fn open(path: &Path, pool_size: u32) -> Result<Self, SmartDcaError> {
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(30)));
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e: r2d2::Error| store_err(e))?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    /// Single-connection in-memory database.
    pub fn in_memory() -> Result<Self, SmartDcaError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| store_err(e))?;

        let adapter = Self { pool };
        adapter.initialize_schema()?;
        Ok(adapter)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, SmartDcaError> {
        self.pool.get().map_err(|e: r2d2::Error| store_err(e))
    }

    pub fn initialize_schema(&self) -> Result<(), SmartDcaError> {
        self.conn()?
            .execute_batch(SCHEMA)
            .map_err(|e: rusqlite::Error| store_err(e))
    }

    pub fn insert_prices(&self, asset: &str, points: &[PricePoint]) -> Result<(), SmartDcaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e: rusqlite::Error| store_err(e))?;
        for p in points {
            tx.execute(
                "INSERT OR REPLACE INTO prices (asset, date, close) VALUES (?1, ?2, ?3)",
                params![asset, p.date.format("%Y-%m-%d").to_string(), p.close],
            )
            .map_err(|e: rusqlite::Error| store_err(e))?;
        }
        tx.commit().map_err(|e: rusqlite::Error| store_err(e))
    }

    fn insert_summary(tx: &rusqlite::Transaction<'_>, s: &TrialSummary) -> Result<(), SmartDcaError> {
        tx.execute(
            &format!(
                "INSERT INTO trial_summaries ({SUMMARY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                s.trial.0,
                s.final_value,
                s.invested_total,
                s.gain_pct,
                s.ath_drawdown_pct,
                s.max_drawdown_pct,
                s.time_to_recovery,
                s.ranges_label(),
                s.multipliers_label(),
            ],
        )
        .map(|_| ())
        .map_err(|e: rusqlite::Error| store_err(e))
    }

    fn insert_best(
        tx: &rusqlite::Transaction<'_>,
        position: usize,
        s: &TrialSummary,
    ) -> Result<(), SmartDcaError> {
        tx.execute(
            &format!(
                "INSERT INTO best_results (position, {SUMMARY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
            ),
            params![
                position as i64,
                s.trial.0,
                s.final_value,
                s.invested_total,
                s.gain_pct,
                s.ath_drawdown_pct,
                s.max_drawdown_pct,
                s.time_to_recovery,
                s.ranges_label(),
                s.multipliers_label(),
            ],
        )
        .map(|_| ())
        .map_err(|e: rusqlite::Error| store_err(e))
    }
}

type RawSummary = (
    i64,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<i64>,
    String,
    String,
);

fn summary_from_raw(raw: RawSummary) -> Result<TrialSummary, String> {
    let (trial, value, invested, gain, ath, max_dd, ttr, ranges, multipliers) = raw;
    let metric = |v: Option<f64>, name: &str| v.ok_or_else(|| format!("{name} is null"));
    let trial = u32::try_from(trial).map_err(|_| format!("trial id {trial} out of range"))?;
    let ttr = ttr.ok_or_else(|| "time to recovery is null".to_string())?;
    let time_to_recovery =
        u32::try_from(ttr).map_err(|_| format!("time to recovery {ttr} out of range"))?;

    Ok(TrialSummary {
        trial: TrialId(trial),
        final_value: metric(value, "value")?,
        invested_total: metric(invested, "invested total")?,
        gain_pct: metric(gain, "gain")?,
        ath_drawdown_pct: metric(ath, "all-time-high drawdown")?,
        max_drawdown_pct: metric(max_dd, "max drawdown")?,
        time_to_recovery,
        params: parse_params(&ranges, &multipliers).map_err(|e| e.to_string())?,
    })
}

impl PriceDataPort for SqliteAdapter {
    fn fetch_closes(
        &self,
        asset: &str,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, SmartDcaError> {
        let conn = self.pool.get().map_err(|e: r2d2::Error| price_err(e))?;

        let start_str = start
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let end_str = end.format("%Y-%m-%d").to_string();

        let mut stmt = conn
            .prepare(
                "SELECT date, close FROM prices
                 WHERE asset = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(|e: rusqlite::Error| price_err(e))?;

        let rows = stmt
            .query_map(params![asset, start_str, end_str], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(|e: rusqlite::Error| price_err(e))?;

        let mut points = Vec::new();
        for row in rows {
            let (date_str, close) = row.map_err(|e: rusqlite::Error| price_err(e))?;
            match NaiveDate::parse_from_str(&date_str, "%Y-%m-%d") {
                Ok(date) if close.is_finite() && close > 0.0 => {
                    points.push(PricePoint::new(date, close))
                }
                _ => warn!(asset, date = %date_str, close, "skipping invalid price row"),
            }
        }

        Ok(points)
    }
}

impl TrialStore for SqliteAdapter {
    fn save_price_series(&self, series: &PriceSeries) -> Result<(), SmartDcaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e: rusqlite::Error| store_err(e))?;
        tx.execute("DELETE FROM historical", [])
            .map_err(|e: rusqlite::Error| store_err(e))?;
        for p in series.points() {
            tx.execute(
                "INSERT INTO historical (date, close) VALUES (?1, ?2)",
                params![p.date.format("%Y-%m-%d").to_string(), p.close],
            )
            .map_err(|e: rusqlite::Error| store_err(e))?;
        }
        tx.commit().map_err(|e: rusqlite::Error| store_err(e))
    }

    fn save_ledger(&self, trial: TrialId, ledger: &Ledger) -> Result<(), SmartDcaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e: rusqlite::Error| store_err(e))?;
        for (month, r) in ledger.rows.iter().enumerate() {
            tx.execute(
                "INSERT OR REPLACE INTO trial_ledgers
                 (trial, month, close, shares, value, invested_month, invested_total, avg_cost, drawdown)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    trial.0,
                    month as i64,
                    r.close,
                    r.shares,
                    r.value,
                    r.invested_month,
                    r.invested_total,
                    r.avg_cost,
                    r.drawdown
                ],
            )
            .map_err(|e: rusqlite::Error| store_err(e))?;
        }
        tx.commit().map_err(|e: rusqlite::Error| store_err(e))
    }

    fn append_summary(&self, summary: &TrialSummary) -> Result<(), SmartDcaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e: rusqlite::Error| store_err(e))?;
        Self::insert_summary(&tx, summary)?;
        tx.commit().map_err(|e: rusqlite::Error| store_err(e))
    }

    fn load_summaries(&self) -> Result<Loaded<Vec<TrialSummary>>, SmartDcaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {SUMMARY_COLUMNS} FROM trial_summaries ORDER BY trial ASC"
            ))
            .map_err(|e: rusqlite::Error| store_err(e))?;

        let rows = stmt
            .query_map([], |row| -> rusqlite::Result<RawSummary> {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                    row.get(8)?,
                ))
            })
            .map_err(|e: rusqlite::Error| store_err(e))?;

        let mut summaries = Vec::new();
        let mut skipped = 0;
        for (i, row) in rows.enumerate() {
            let parsed = row
                .map_err(|e| e.to_string())
                .and_then(|raw: RawSummary| summary_from_raw(raw));
            match parsed {
                Ok(s) => summaries.push(s),
                Err(reason) => {
                    warn!(table = "trial_summaries", row = i + 1, %reason, "skipping malformed row");
                    skipped += 1;
                }
            }
        }

        Ok(Loaded::new(summaries, skipped))
    }

    fn load_ledger(&self, trial: TrialId) -> Result<Loaded<Ledger>, SmartDcaError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT close, shares, value, invested_month, invested_total, avg_cost, drawdown
                 FROM trial_ledgers WHERE trial = ?1 ORDER BY month ASC",
            )
            .map_err(|e: rusqlite::Error| store_err(e))?;

        let rows = stmt
            .query_map(params![trial.0], |row| {
                Ok(LedgerRow {
                    close: row.get(0)?,
                    shares: row.get(1)?,
                    value: row.get(2)?,
                    invested_month: row.get(3)?,
                    invested_total: row.get(4)?,
                    avg_cost: row.get(5)?,
                    drawdown: row.get(6)?,
                })
            })
            .map_err(|e: rusqlite::Error| store_err(e))?;

        let mut ledger = Ledger::default();
        let mut skipped = 0;
        for (i, row) in rows.enumerate() {
            match row {
                Ok(r) => ledger.rows.push(r),
                Err(e) => {
                    warn!(table = "trial_ledgers", trial = %trial, row = i + 1, error = %e, "skipping malformed row");
                    skipped += 1;
                }
            }
        }

        if ledger.is_empty() && skipped == 0 {
            return Err(SmartDcaError::TrialNotFound(trial.0));
        }
        Ok(Loaded::new(ledger, skipped))
    }

    fn write_best_results(&self, best: &BestResults) -> Result<(), SmartDcaError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(|e: rusqlite::Error| store_err(e))?;
        tx.execute("DELETE FROM best_results", [])
            .map_err(|e: rusqlite::Error| store_err(e))?;
        for (position, row) in best.rows().into_iter().enumerate() {
            Self::insert_best(&tx, position, row)?;
        }
        tx.commit().map_err(|e: rusqlite::Error| store_err(e))
    }
}
