//! Error taxonomy for the vintage pipeline.
//!
//! Every per-item failure (one vintage, one row, one candidate model) has its own
//! recoverable type so callers can accumulate them next to the successful results.
//! Only `FatalConfigError` and `PipelineError` stop a stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::VintageId;

/// Failure to retrieve one vintage. Recoverable: the vintage is skipped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("server answered with status {0}")]
    Status(u16),

    #[error("request timed out")]
    Timeout,

    #[error("vintage not present in cache")]
    NotCached,
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

/// Failure to turn one row (or one file header) into observations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error("no release date found in the metadata of vintage {0}")]
    MissingReleaseDate(VintageId),

    #[error("unrecognised reference period '{0}'")]
    BadPeriod(String),

    #[error("non-numeric value '{0}'")]
    BadValue(String),

    #[error("malformed CSV record: {0}")]
    Csv(String),
}

/// Failure to fit one candidate order. Recoverable: the engine moves on to the
/// next candidate.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum FitError {
    #[error("needs at least {needed} observations, only {available} available")]
    InsufficientData { needed: usize, available: usize },

    #[error("optimiser did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("parameter covariance matrix is singular")]
    SingularCovariance,

    #[error("innovation variance collapsed to zero")]
    DegenerateVariance,

    #[error("likelihood is not finite at the optimum")]
    NonFinite,
}

/// Invalid request or unusable input for the forecasting step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FatalConfigError {
    #[error("forecast horizon must be at least 1 (got {0})")]
    InvalidHorizon(usize),

    #[error("confidence level must lie strictly between 0 and 1 (got {0})")]
    InvalidConfidenceLevel(f64),

    #[error("current series is empty: no usable observations")]
    EmptySeries,

    #[error("no candidate order could be fitted ({attempted} attempted)")]
    NoFittableModel { attempted: usize },
}

/// Run-level failure: nothing was retrieved, so there is nothing to reconcile.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("no vintages retrieved ({attempted} attempted)")]
    NoVintages { attempted: usize },
}
