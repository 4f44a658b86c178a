//! Error taxonomy for a single evaluation
//!
//! Every variant is fatal to the evaluation that raised it and to nothing
//! else: the batch driver logs it and moves on to the next parameter pair.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    /// Non-positive period/multiplier/capital or a negative fee rate
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Series too short to produce any trend transition
    #[error("insufficient data: need at least {required} bars, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// A non-finite value reached a comparison inside the evaluated region
    #[error("computation error at bar {index}: {reason}")]
    ComputationError { index: usize, reason: String },

    /// Bar failed validation or timestamps are not strictly increasing
    #[error("invalid series at bar {index}: {reason}")]
    InvalidSeries { index: usize, reason: String },
}

impl BacktestError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn computation(index: usize, reason: impl Into<String>) -> Self {
        Self::ComputationError {
            index,
            reason: reason.into(),
        }
    }
}

pub type EvalResult<T> = Result<T, BacktestError>;
