use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while extracting chunks from the source database.
/// All of these are connectivity/query-class failures and are classified
/// as transient by the orchestrator's retry policy.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("source I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to connect to source database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error("source query failed for table '{table}': {source}")]
    Query {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("watermark '{watermark}' for table '{table}' is not a timestamp")]
    InvalidWatermark { table: String, watermark: String },
}

/// Errors raised while bulk-loading or promoting staged data in the
/// analytical store. Promotion failures always leave the live table as it
/// was before the run.
#[derive(Debug, Error)]
pub enum SwapError {
    #[error("failed to open analytical store at '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: duckdb::Error,
    },

    #[error("bulk load into staging table '{table}' failed: {source}")]
    BulkLoad {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("promotion of table '{table}' failed and was rolled back: {source}")]
    Promotion {
        table: String,
        #[source]
        source: duckdb::Error,
    },

    #[error("analytical store statement failed: {0}")]
    Statement(#[from] duckdb::Error),

    #[error("analytical store task aborted: {0}")]
    Task(String),
}
