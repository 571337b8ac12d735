#![allow(dead_code)]

use chrono::{Months, NaiveDate};
use smartdca::domain::backtest::{BacktestConfig, DataSource, LedgerRetention, Period, StoreKind};
use smartdca::domain::error::SmartDcaError;
use smartdca::domain::generator::RangeMode;
use smartdca::domain::multipliers::MultiplierConfig;
use smartdca::domain::price::{PricePoint, PriceSeries};
use smartdca::ports::data_port::PriceDataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub struct MockPriceDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_points(mut self, asset: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(asset.to_string(), points);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockPriceDataPort {
    fn fetch_closes(
        &self,
        asset: &str,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, SmartDcaError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(SmartDcaError::PriceData {
                reason: reason.clone(),
            });
        }
        let points: Vec<PricePoint> = self
            .data
            .get(asset)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| start.is_none_or(|s| p.date >= s) && p.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        if points.is_empty() {
            return Err(SmartDcaError::NoData {
                asset: asset.to_string(),
            });
        }
        Ok(points)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One close on the first of every month starting January 2010.
pub fn monthly_points(closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| PricePoint::new(date(2010, 1, 1) + Months::new(i as u32), c))
        .collect()
}

pub fn monthly_series(closes: &[f64]) -> PriceSeries {
    PriceSeries::new("TEST", monthly_points(closes)).unwrap()
}

/// A bumpy market: rallies, a crash and a recovery.
pub fn sample_closes() -> Vec<f64> {
    let mut closes = Vec::new();
    for i in 0..24 {
        closes.push(100.0 + 2.0 * i as f64);
    }
    for i in 0..12 {
        closes.push(146.0 - 6.0 * i as f64);
    }
    for i in 0..24 {
        closes.push(80.0 + 4.0 * i as f64 + if i % 3 == 0 { -5.0 } else { 0.0 });
    }
    closes
}

pub fn sample_config(trials: u32) -> BacktestConfig {
    BacktestConfig {
        asset: "TEST".to_string(),
        period: Period::All,
        data_source: DataSource::Csv {
            dir: "data".into(),
        },
        multipliers: MultiplierConfig {
            randomize: true,
            ..MultiplierConfig::default()
        },
        range_mode: RangeMode::Random { trials },
        force_negative: false,
        output_root: None,
        store: StoreKind::Memory,
        ledgers: LedgerRetention::All,
        jobs: 2,
        seed: 7,
        quiet: true,
        timing: false,
    }
}

/// Write a Yahoo-style daily export with several sessions per month.
pub fn write_price_csv(dir: &Path, asset: &str, closes: &[f64]) {
    let mut file = std::fs::File::create(dir.join(format!("{asset}.csv"))).unwrap();
    writeln!(file, "Date,Open,High,Low,Close,Adj Close,Volume").unwrap();
    for (i, close) in closes.iter().enumerate() {
        let first = date(2010, 1, 4) + Months::new(i as u32);
        for day in 0..3u64 {
            let d = first + chrono::Days::new(day);
            let c = close + day as f64;
            writeln!(file, "{d} 00:00:00+00:00,{c},{c},{c},{c},{c},1000").unwrap();
        }
    }
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
