//! Core domain types and logic.

pub mod aggregate;
pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod generator;
pub mod metrics;
pub mod multipliers;
pub mod price;
pub mod ranges;
pub mod simulation;
pub mod tier;
pub mod trial;
