//! Configuration validation.
//!
//! Validates all config fields before a backtest runs. Values are read as
//! strings so that a malformed number is reported instead of silently
//! falling back to its default.

use std::fmt::Display;
use std::str::FromStr;

use crate::domain::backtest::{LedgerRetention, StoreKind};
use crate::domain::error::SmartDcaError;
use crate::ports::config_port::ConfigPort;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SmartDcaError {
    SmartDcaError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Parse `[section] key` if present. Empty values count as absent.
pub fn parse_value<T>(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<T>, SmartDcaError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("`{}`: {e}", raw.trim()))),
        _ => Ok(None),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    validate_asset(config)?;
    validate_period(config)?;
    validate_data_source(config)?;
    validate_multipliers(config)?;
    validate_ranges(config)?;
    validate_output(config)?;
    validate_run(config)?;
    Ok(())
}

fn validate_asset(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    match config.get_string("backtest", "asset") {
        Some(s) if s.trim().is_empty() => Err(invalid("backtest", "asset", "asset must not be empty")),
        Some(s) if s.contains(['/', '\\']) => Err(invalid(
            "backtest",
            "asset",
            "asset must not contain path separators",
        )),
        _ => Ok(()),
    }
}

fn validate_period(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    if let Some(period) = parse_value::<i64>(config, "backtest", "period")? {
        if period < 1 {
            return Err(invalid("backtest", "period", "period must be at least 1 year"));
        }
    }
    Ok(())
}

fn validate_data_source(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    match source.trim().to_ascii_lowercase().as_str() {
        "csv" => Ok(()),
        "sqlite" => {
            match config.get_string("sqlite", "path") {
                Some(s) if !s.trim().is_empty() => {}
                _ => {
                    return Err(SmartDcaError::ConfigMissing {
                        section: "sqlite".to_string(),
                        key: "path".to_string(),
                    });
                }
            }
            if let Some(size) = parse_value::<i64>(config, "sqlite", "pool_size")? {
                if size < 1 {
                    return Err(invalid("sqlite", "pool_size", "pool_size must be at least 1"));
                }
            }
            Ok(())
        }
        other => Err(invalid(
            "data",
            "source",
            format!("unknown source `{other}` (expected csv or sqlite)"),
        )),
    }
}

fn validate_multipliers(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    if let Some(max) = parse_value::<f64>(config, "multipliers", "max")? {
        if !max.is_finite() || max < 1.0 {
            return Err(invalid("multipliers", "max", "max must be at least 1"));
        }
    }
    if let Some(min) = parse_value::<f64>(config, "multipliers", "min")? {
        if !(min > 0.0 && min <= 1.0) {
            return Err(invalid("multipliers", "min", "min must be in (0, 1]"));
        }
    }
    if let Some(increment) = parse_value::<f64>(config, "multipliers", "increment")? {
        if !increment.is_finite() || increment <= 0.0 {
            return Err(invalid("multipliers", "increment", "increment must be positive"));
        }
    }
    for flag in ["force_max", "force_min", "randomize"] {
        validate_bool(config, "multipliers", flag)?;
    }
    Ok(())
}

fn validate_ranges(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    if let Some(mode) = config.get_string("ranges", "mode") {
        let mode = mode.trim().to_ascii_lowercase();
        if mode != "random" && mode != "incremental" {
            return Err(invalid(
                "ranges",
                "mode",
                format!("unknown mode `{mode}` (expected random or incremental)"),
            ));
        }
    }
    if let Some(trials) = parse_value::<i64>(config, "ranges", "trials")? {
        if trials < 1 || trials > i64::from(u32::MAX) {
            return Err(invalid(
                "ranges",
                "trials",
                format!("trials must be between 1 and {}", u32::MAX),
            ));
        }
    }
    validate_bool(config, "ranges", "force_negative")
}

fn validate_output(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    parse_value::<StoreKind>(config, "output", "store")?;
    parse_value::<LedgerRetention>(config, "output", "ledgers")?;
    Ok(())
}

fn validate_run(config: &dyn ConfigPort) -> Result<(), SmartDcaError> {
    if let Some(jobs) = parse_value::<i64>(config, "run", "jobs")? {
        if jobs < 0 {
            return Err(invalid("run", "jobs", "jobs must be non-negative (0 = one per CPU)"));
        }
    }
    parse_value::<u64>(config, "run", "seed")?;
    Ok(())
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), SmartDcaError> {
    // A value that is neither true nor false reads back as both defaults.
    if config.get_string(section, key).is_some()
        && config.get_bool(section, key, true) != config.get_bool(section, key, false)
    {
        return Err(invalid(section, key, "expected true or false"));
    }
    Ok(())
}
