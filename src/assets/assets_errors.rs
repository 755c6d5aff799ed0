use thiserror::Error;

/// Custom error type for asset resolution and classification.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Alias conflict: {0}")]
    AliasConflict(String),
}
