use model::core::identifier::IdentifierError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("table '{table}': {message}")]
    InvalidTableSpec { table: String, message: String },

    #[error("table '{table}': {source}")]
    UnsafeIdentifier {
        table: String,
        #[source]
        source: IdentifierError,
    },

    #[error("{0}")]
    Invalid(String),
}
