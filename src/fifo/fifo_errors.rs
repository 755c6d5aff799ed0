use thiserror::Error;

/// Custom error type for FIFO ledger operations. Underflows are fatal and
/// carry the full offending-event context plus a ledger state snapshot.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(
        "Insufficient lots for {event}: required {required}, available {available}. Ledger: {ledger_state}"
    )]
    ConsumptionUnderflow {
        event: String,
        required: String,
        available: String,
        ledger_state: String,
    },
    #[error("Long/short position conflict for {0}")]
    PositionConflict(String),
    #[error("Invalid ledger operation: {0}")]
    InvalidOperation(String),
    #[error("Missing enriched value on {0}")]
    MissingEnrichedValue(String),
}
