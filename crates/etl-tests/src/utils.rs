use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use connectors::error::ExtractionError;
use connectors::sql::query::source_columns;
use connectors::sql::source::{ChunkSource, ChunkStream};
use etl_config::offsets::TimeOffsets;
use etl_config::settings::Settings;
use etl_config::table_spec::TableSpec;
use model::core::value::{parse_timestamp, Value};
use model::records::chunk::DataChunk;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

/// In-memory stand-in for the source database: per-table row sets with
/// watermark filtering, plus scriptable transient failures.
#[derive(Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, MemoryTable>>,
    /// source_table → number of `open` calls left that should fail.
    /// `usize::MAX` means fail forever.
    failures: Mutex<HashMap<String, usize>>,
    attempts: Mutex<HashMap<String, usize>>,
}

#[derive(Clone)]
pub struct MemoryTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_table(&self, source_table: &str, columns: Vec<&str>, rows: Vec<Vec<Value>>) {
        self.tables.lock().unwrap().insert(
            source_table.to_string(),
            MemoryTable {
                columns: columns.into_iter().map(String::from).collect(),
                rows,
            },
        );
    }

    pub fn push_row(&self, source_table: &str, row: Vec<Value>) {
        if let Some(table) = self.tables.lock().unwrap().get_mut(source_table) {
            table.rows.push(row);
        }
    }

    /// Make the next `count` opens of this table fail with an I/O error.
    pub fn fail_next_opens(&self, source_table: &str, count: usize) {
        self.failures
            .lock()
            .unwrap()
            .insert(source_table.to_string(), count);
    }

    pub fn open_attempts(&self, source_table: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(source_table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    async fn open(
        &self,
        spec: &TableSpec,
        watermark: &str,
        chunk_size: usize,
    ) -> Result<Box<dyn ChunkStream>, ExtractionError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(spec.source_table.clone())
            .or_insert(0) += 1;

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&spec.source_table) {
                if *remaining > 0 {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    return Err(ExtractionError::Io(std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "source unavailable",
                    )));
                }
            }
        }

        let table = self
            .tables
            .lock()
            .unwrap()
            .get(&spec.source_table)
            .cloned()
            .unwrap_or(MemoryTable {
                columns: vec![],
                rows: vec![],
            });

        // Column selection mirrors the production extractor: rename-map
        // keys plus the timestamp column.
        let selected = {
            let cols = source_columns(spec);
            if cols.is_empty() {
                table.columns.clone()
            } else {
                cols
            }
        };
        let indices: Vec<Option<usize>> = selected
            .iter()
            .map(|c| table.columns.iter().position(|tc| tc == c))
            .collect();

        let mut rows: Vec<Vec<Value>> = table
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|idx| idx.map(|i| row[i].clone()).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        if spec.incremental {
            if let Some(ts_col) = spec.timestamp_column.as_deref() {
                let ts_idx = selected.iter().position(|c| c == ts_col);
                if let (Some(ts_idx), Some(mark)) = (ts_idx, parse_timestamp(watermark)) {
                    rows.retain(|row| {
                        row[ts_idx]
                            .as_timestamp()
                            .map(|ts| ts > mark)
                            .unwrap_or(false)
                    });
                    rows.sort_by_key(|row| row[ts_idx].as_timestamp());
                }
            }
        }

        let chunks: VecDeque<DataChunk> = rows
            .chunks(chunk_size.max(1))
            .map(|batch| DataChunk::new(spec.dest_table.clone(), selected.clone(), batch.to_vec()))
            .collect();

        Ok(Box::new(MemoryStream { chunks }))
    }
}

struct MemoryStream {
    chunks: VecDeque<DataChunk>,
}

#[async_trait]
impl ChunkStream for MemoryStream {
    async fn next_chunk(&mut self) -> Result<Option<DataChunk>, ExtractionError> {
        Ok(self.chunks.pop_front())
    }
}

/// Spec for the store dimension: full reload, no partitions.
pub fn stores_spec() -> TableSpec {
    TableSpec {
        source_table: "src_stores".into(),
        dest_table: "dim_stores".into(),
        incremental: false,
        description: None,
        processing_order: 1,
        rename_map: BTreeMap::from([
            ("id".to_string(), "store_id".to_string()),
            ("name".to_string(), "store_name".to_string()),
        ]),
        partition_columns: vec![],
        cleaning_rules: vec![],
        timestamp_column: None,
    }
}

/// Spec for the traffic fact: incremental, hive-partitioned by year/month.
pub fn traffic_spec() -> TableSpec {
    TableSpec {
        source_table: "traffic_log".into(),
        dest_table: "fact_traffic".into(),
        incremental: true,
        description: None,
        processing_order: 2,
        rename_map: BTreeMap::from([
            ("record_time".to_string(), "recorded_at".to_string()),
            ("in_num".to_string(), "visitors_in".to_string()),
            ("out_num".to_string(), "visitors_out".to_string()),
            ("pos".to_string(), "device_position".to_string()),
            ("storeid".to_string(), "store_id".to_string()),
        ]),
        partition_columns: vec!["year".into(), "month".into()],
        cleaning_rules: vec![],
        timestamp_column: Some("record_time".into()),
    }
}

pub const TRAFFIC_COLUMNS: [&str; 5] = ["record_time", "in_num", "out_num", "pos", "storeid"];

/// One source traffic row in `TRAFFIC_COLUMNS` order.
pub fn traffic_row(ts: NaiveDateTime, v_in: i64, v_out: i64, store: i64) -> Vec<Value> {
    vec![
        Value::Timestamp(ts),
        Value::Int(v_in),
        Value::Int(v_out),
        Value::String("door".into()),
        Value::Int(store),
    ]
}

pub fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
}

/// Settings rooted in a temp dir, with the given table specs.
pub fn test_settings(data_dir: &Path, specs: Vec<TableSpec>) -> Settings {
    let tables: BTreeMap<String, TableSpec> = specs
        .into_iter()
        .map(|spec| (spec.dest_table.clone(), spec))
        .collect();
    Settings {
        source_dsn: None,
        data_dir: data_dir.to_path_buf(),
        chunk_size: 2,
        default_watermark: "1900-01-01 00:00:00".into(),
        cleanup_full_staging: true,
        workers: 4,
        api_url: "http://127.0.0.1:8000".into(),
        internal_api_token: None,
        outlier_threshold: 100,
        outlier_scale_ratio: 0.00001,
        working_hour_start: 9,
        tables,
        time_offsets: TimeOffsets::default(),
    }
}
