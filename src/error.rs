//! Error types for the CLTV pipeline

use std::path::PathBuf;

use thiserror::Error;

/// A maximum-likelihood fit that did not terminate within tolerance, or
/// terminated on parameters the model cannot use.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{model} fit did not converge after {iterations} iterations: {reason}")]
pub struct ConvergenceError {
    pub model: &'static str,
    pub iterations: usize,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CltvError {
    #[error("required column `{0}` is missing from the input")]
    MissingColumn(String),
    #[error("column `{column}` row {row}: cannot parse `{value}` as a date")]
    InvalidDate {
        column: String,
        row: usize,
        value: String,
    },
    #[error("column `{column}` row {row}: {reason}")]
    InvalidValue {
        column: String,
        row: usize,
        reason: String,
    },
    #[error("customer `{customer_id}` is not a valid model observation: {reason}")]
    InvalidObservation { customer_id: String, reason: String },
    #[error("customer `{customer_id}` last purchased on {last_order}, after the analysis date {analysis_date}")]
    PurchaseAfterAnalysisDate {
        customer_id: String,
        last_order: chrono::NaiveDate,
        analysis_date: chrono::NaiveDate,
    },
    #[error("no customers left after {0}")]
    EmptyFrame(&'static str),
    #[error("cannot split {rows} customers into {segments} segments")]
    InvalidSegmentCount { segments: usize, rows: usize },
    #[error(transparent)]
    Convergence(#[from] ConvergenceError),
    #[error("could not read `{path}`: {source}")]
    Read {
        path: PathBuf,
        source: polars::error::PolarsError,
    },
    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CltvError {
    pub(crate) fn observation(customer_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidObservation {
            customer_id: customer_id.to_string(),
            reason: reason.into(),
        }
    }
}
