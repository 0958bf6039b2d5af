use connectors::error::{ExtractionError, SwapError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("staging I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet write failed: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow conversion failed: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

/// Everything that can fail one table's run cycle.
///
/// Contract violations never appear here: they are absorbed chunk-by-chunk
/// at the transform boundary (chunk dropped, dead letter written) and the
/// table keeps going — which is also how "never retry a contract failure"
/// is honored. What does bubble up is connectivity/I-O-class and therefore
/// classified transient, except an explicit cancellation.
#[derive(Debug, Error)]
pub enum TableRunError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error(transparent)]
    Swap(#[from] SwapError),

    #[error("run cancelled")]
    Cancelled,
}

impl TableRunError {
    /// Whether the retry policy should attempt the table cycle again.
    pub fn is_transient(&self) -> bool {
        match self {
            TableRunError::Extraction(_) => true,
            TableRunError::Staging(_) => true,
            TableRunError::Swap(_) => true,
            TableRunError::Cancelled => false,
        }
    }
}
