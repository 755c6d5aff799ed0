use thiserror::Error;

/// Custom error type for event construction.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Unparseable event date '{date}' on record {record}")]
    UnparseableDate { date: String, record: String },
    #[error("Ambiguous trade direction on record {0}")]
    AmbiguousTradeDirection(String),
    #[error("Record {0} lacks a broker transaction id")]
    MissingTransactionId(String),
}
