use thiserror::Error;

/// Custom error type for currency conversion.
#[derive(Debug, Error)]
pub enum FxError {
    #[error("Exchange rate not found: {0}")]
    RateNotFound(String),
    #[error("Invalid exchange rate: {0}")]
    InvalidRate(String),
    #[error("Currency conversion error: {0}")]
    ConversionError(String),
}
