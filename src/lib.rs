//! smartdca: smart dollar-cost averaging backtester.
//!
//! Simulates a fixed monthly contribution (the baseline) against thousands
//! of tiered variants that scale each month's contribution by how far the
//! price sits from the average cost, then reports the best variant per
//! metric.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], argument handling in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
