use crate::{error::ConfigError, offsets::TimeOffsets, table_spec::TableSpec};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the source connection string.
pub const ENV_SOURCE_DSN: &str = "STOREFLOW_SOURCE_DSN";
/// Environment variable overriding the internal API token.
pub const ENV_API_TOKEN: &str = "STOREFLOW_API_TOKEN";

const SETTINGS_FILE: &str = "etl.yaml";
const TABLES_FILE: &str = "tables.yaml";
const OFFSETS_FILE: &str = "time_offsets.yaml";

/// Top-level runtime configuration, assembled from the config directory
/// (`etl.yaml` + `tables.yaml` + `time_offsets.yaml`) with environment
/// overrides for secrets. All table specs are validated fail-fast at load.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection string for the operational source database.
    pub source_dsn: Option<String>,
    /// Root of the staging/state/dead-letter file layout.
    pub data_dir: PathBuf,
    /// Rows per extracted chunk, shared process-wide.
    pub chunk_size: usize,
    /// Watermark assumed for tables never loaded before.
    pub default_watermark: String,
    /// Delete a full-reload staging area after its swap commits.
    pub cleanup_full_staging: bool,
    /// Default worker-pool width for table pipelines.
    pub workers: usize,
    /// Serving-layer base URL for cache invalidation.
    pub api_url: String,
    /// Shared-secret token for the cache invalidation endpoint.
    pub internal_api_token: Option<String>,
    /// Counter value above which the derived view treats a reading as an
    /// outlier.
    pub outlier_threshold: i64,
    /// Scale applied to outlier counters in the derived view; 0 collapses
    /// them to 1.
    pub outlier_scale_ratio: f64,
    /// Hour the business day starts; the derived view shifts time by it.
    pub working_hour_start: i64,
    pub tables: BTreeMap<String, TableSpec>,
    pub time_offsets: TimeOffsets,
}

/// On-disk shape of `etl.yaml`. Everything is optional; defaults mirror
/// the values the pipeline has always run with.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    source_dsn: Option<String>,
    data_dir: Option<PathBuf>,
    chunk_size: Option<usize>,
    default_watermark: Option<String>,
    cleanup_full_staging: Option<bool>,
    workers: Option<usize>,
    api_url: Option<String>,
    internal_api_token: Option<String>,
    outlier_threshold: Option<i64>,
    outlier_scale_ratio: Option<f64>,
    working_hour_start: Option<i64>,
}

impl Settings {
    /// Load and validate the full configuration from `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let raw: RawSettings = match read_yaml(&config_dir.join(SETTINGS_FILE)) {
            Ok(raw) => raw,
            Err(ConfigError::MissingFile(path)) => {
                debug!("no {} found, using defaults", path.display());
                RawSettings::default()
            }
            Err(err) => return Err(err),
        };

        let tables: BTreeMap<String, TableSpec> = read_yaml(&config_dir.join(TABLES_FILE))?;
        if tables.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "'{TABLES_FILE}' defines no tables"
            )));
        }
        for spec in tables.values() {
            spec.validate()?;
        }

        let time_offsets: TimeOffsets = read_yaml(&config_dir.join(OFFSETS_FILE))?;

        let source_dsn = std::env::var(ENV_SOURCE_DSN).ok().or(raw.source_dsn);
        let internal_api_token = std::env::var(ENV_API_TOKEN)
            .ok()
            .or(raw.internal_api_token);

        Ok(Self {
            source_dsn,
            data_dir: raw.data_dir.unwrap_or_else(|| PathBuf::from("data")),
            chunk_size: raw.chunk_size.unwrap_or(100_000),
            default_watermark: raw
                .default_watermark
                .unwrap_or_else(|| "1900-01-01 00:00:00".to_string()),
            cleanup_full_staging: raw.cleanup_full_staging.unwrap_or(true),
            workers: raw.workers.unwrap_or(4),
            api_url: raw
                .api_url
                .unwrap_or_else(|| "http://127.0.0.1:8000".to_string()),
            internal_api_token,
            outlier_threshold: raw.outlier_threshold.unwrap_or(100),
            outlier_scale_ratio: raw.outlier_scale_ratio.unwrap_or(0.00001),
            working_hour_start: raw.working_hour_start.unwrap_or(9),
            tables,
            time_offsets,
        })
    }

    pub fn require_source_dsn(&self) -> Result<&str, ConfigError> {
        self.source_dsn.as_deref().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "no source DSN configured (set 'source_dsn' in {SETTINGS_FILE} or {ENV_SOURCE_DSN})"
            ))
        })
    }

    pub fn duckdb_path(&self) -> PathBuf {
        self.data_dir.join("analytics.duckdb")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("etl_state.json")
    }

    pub fn rejected_dir(&self) -> PathBuf {
        self.data_dir.join("rejected")
    }

    /// Staging directory for one destination table.
    pub fn staging_dir(&self, dest_table: &str) -> PathBuf {
        self.data_dir.join(dest_table)
    }

    /// Table specs in processing order (order, then destination name, so a
    /// run always schedules deterministically).
    pub fn ordered_tables(&self) -> Vec<&TableSpec> {
        let mut specs: Vec<&TableSpec> = self.tables.values().collect();
        specs.sort_by(|a, b| {
            a.processing_order
                .cmp(&b.processing_order)
                .then_with(|| a.dest_table.cmp(&b.dest_table))
        });
        specs
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}
