//! Monthly closing-price series.

use chrono::{Datelike, NaiveDate};

use crate::domain::error::SmartDcaError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        PricePoint { date, close }
    }
}

/// Chronological closes, one per calendar month. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    asset: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Validate an already-monthly series: non-empty, strictly increasing
    /// dates, finite positive closes.
    pub fn new(asset: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, SmartDcaError> {
        let asset = asset.into();
        if points.is_empty() {
            return Err(SmartDcaError::NoData { asset });
        }
        if let Some(p) = points.iter().find(|p| !p.close.is_finite() || p.close <= 0.0) {
            return Err(SmartDcaError::InvalidSeries {
                reason: format!("close {} on {} is not a positive price", p.close, p.date),
            });
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(SmartDcaError::InvalidSeries {
                reason: format!("dates not increasing: {} then {}", pair[0].date, pair[1].date),
            });
        }
        Ok(PriceSeries { asset, points })
    }

    /// Keep the first available close of every calendar month.
    ///
    /// Input may be unsorted; duplicate dates keep their first occurrence.
    pub fn monthly(
        asset: impl Into<String>,
        mut raw: Vec<PricePoint>,
    ) -> Result<Self, SmartDcaError> {
        raw.sort_by_key(|p| p.date);

        let mut points: Vec<PricePoint> = Vec::new();
        for point in raw {
            let same_month = points
                .last()
                .is_some_and(|last| (last.date.year(), last.date.month()) == (point.date.year(), point.date.month()));
            if !same_month {
                points.push(point);
            }
        }

        PriceSeries::new(asset, points)
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.close)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start_date(&self) -> NaiveDate {
        self.points[0].date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.points[self.points.len() - 1].date
    }
}
