use connectors::error::SwapError;
use etl_config::error::ConfigError;
use thiserror::Error;

/// Unrecoverable bootstrap errors. Per-table run failures are not errors
/// at this level — they end up in the run summary and the process still
/// exits cleanly.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("analytical store error: {0}")]
    Store(#[from] SwapError),
}
