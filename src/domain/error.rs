//! Domain error types.

/// Top-level error type for smartdca.
#[derive(Debug, thiserror::Error)]
pub enum SmartDcaError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("price data error: {reason}")]
    PriceData { reason: String },

    #[error("no price data for {asset}")]
    NoData { asset: String },

    #[error("invalid price series: {reason}")]
    InvalidSeries { reason: String },

    #[error("invalid range set: {reason}")]
    InvalidRanges { reason: String },

    #[error("invalid multiplier set: {reason}")]
    InvalidMultipliers { reason: String },

    #[error("deviation {deviation}% matched no tier")]
    Unclassified { deviation: f64 },

    #[error("trial store error: {reason}")]
    Store { reason: String },

    #[error("no baseline (trial 0) in summary store")]
    MissingBaseline,

    #[error("no trials besides the baseline to rank")]
    NoTrials,

    #[error("trial {0} not found")]
    TrialNotFound(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for SmartDcaError {
    fn from(err: csv::Error) -> Self {
        SmartDcaError::Store {
            reason: err.to_string(),
        }
    }
}

impl SmartDcaError {
    /// Process exit status for this error family.
    pub fn exit_status(&self) -> u8 {
        match self {
            SmartDcaError::Io(_) | SmartDcaError::Store { .. } => 1,
            SmartDcaError::ConfigParse { .. }
            | SmartDcaError::ConfigMissing { .. }
            | SmartDcaError::ConfigInvalid { .. } => 2,
            SmartDcaError::PriceData { .. }
            | SmartDcaError::NoData { .. }
            | SmartDcaError::InvalidSeries { .. } => 3,
            SmartDcaError::InvalidRanges { .. }
            | SmartDcaError::InvalidMultipliers { .. }
            | SmartDcaError::Unclassified { .. } => 4,
            SmartDcaError::MissingBaseline
            | SmartDcaError::NoTrials
            | SmartDcaError::TrialNotFound(_) => 5,
        }
    }
}

impl From<&SmartDcaError> for std::process::ExitCode {
    fn from(err: &SmartDcaError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
