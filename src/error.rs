// Error types for the carbon audit engine
//
// Validation failures are caller errors and are never retried. Store errors
// are wrapped transparently so the caller sees the underlying rusqlite failure.

use thiserror::Error;

use crate::models::TransactionStatus;

pub type Result<T> = std::result::Result<T, CarbonError>;

#[derive(Error, Debug)]
pub enum CarbonError {
    /// Credit quantity was zero, negative, or not a finite number.
    #[error("invalid credit quantity {0}: must be greater than zero")]
    InvalidQuantity(f64),

    /// Price per credit was negative or not a finite number.
    #[error("invalid price per credit {0}: must be zero or greater")]
    InvalidPrice(f64),

    /// Emission amount was negative or not a finite number.
    #[error("invalid emission amount {0}: must be zero or greater")]
    InvalidAmount(f64),

    /// A score, weight, or grade threshold fell outside its allowed range.
    #[error("{field} out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    /// Attempted to move a credit transaction out of a terminal state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("unknown pollutant kind: {0}")]
    UnknownPollutant(String),

    #[error("unknown mass unit: {0}")]
    UnknownUnit(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An emission with the same idempotency hash is already stored.
    #[error("duplicate record: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CarbonError {
    pub fn out_of_range(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CarbonError::OutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CarbonError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for failures caused by bad caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CarbonError::InvalidQuantity(_)
                | CarbonError::InvalidPrice(_)
                | CarbonError::InvalidAmount(_)
                | CarbonError::OutOfRange { .. }
                | CarbonError::UnknownPollutant(_)
                | CarbonError::UnknownUnit(_)
                | CarbonError::InvalidDateRange { .. }
        )
    }
}
