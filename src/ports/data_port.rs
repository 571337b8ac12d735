//! Historical price access port trait.

use crate::domain::error::SmartDcaError;
use crate::domain::price::{PricePoint, PriceSeries};
use chrono::NaiveDate;

pub trait PriceDataPort {
    /// Raw closes for `asset` between `start` (or the first available date
    /// when `None`) and `end`, both inclusive. Order is not guaranteed.
    fn fetch_closes(
        &self,
        asset: &str,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, SmartDcaError>;

    /// Fetch and resample to the first close of each calendar month.
    fn fetch_price_series(
        &self,
        asset: &str,
        start: Option<NaiveDate>,
        end: NaiveDate,
    ) -> Result<PriceSeries, SmartDcaError> {
        let raw = self.fetch_closes(asset, start, end)?;
        PriceSeries::monthly(asset, raw)
    }
}
