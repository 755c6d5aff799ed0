use thiserror::Error;

use crate::assets::AssetError;
use crate::events::EventError;
use crate::fifo::LedgerError;
use crate::fx::FxError;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the calculation engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Asset resolution failed: {0}")]
    Asset(#[from] AssetError),

    #[error("Event construction failed: {0}")]
    Event(#[from] EventError),

    #[error("Currency operation failed: {0}")]
    Fx(#[from] FxError),

    #[error("FIFO ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Input validation failed: {0}")]
    Validation(String),

    #[error("Event ordering failed: {0}")]
    Sorting(String),

    #[error("Calculation failed: {0}")]
    Calculation(String),
}

impl From<rust_decimal::Error> for Error {
    fn from(err: rust_decimal::Error) -> Self {
        Error::Validation(format!("Failed to parse decimal number: {}", err))
    }
}
