use crate::error::StagingError;
use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int64Builder, StringBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType as ArrowType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use etl_config::table_spec::TableSpec;
use model::core::data_type::DataType;
use model::core::value::Value;
use model::records::chunk::DataChunk;
use parquet::arrow::ArrowWriter;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Days from 0001-01-01 (chrono's common era) to the Unix epoch.
const UNIX_EPOCH_DAYS: i32 = 719_163;

/// Buffers transformed chunks into the staging area as Parquet.
///
/// Partitioned tables get hive-style directories
/// (`year=2024/month=5/part-<uuid>.parquet`, partition columns encoded in
/// the path, not the file); unpartitioned tables get a single
/// `data.parquet` whose writer is opened lazily on the first row and held
/// across chunks. `finish` (with Drop as a backstop) releases the file
/// handle on every exit path, including a run that never wrote anything.
pub struct StagingWriter {
    dest_dir: PathBuf,
    partition_columns: Vec<String>,
    single_writer: Option<ArrowWriter<File>>,
    single_schema: Option<Arc<Schema>>,
    type_hints: HashMap<String, DataType>,
    has_written: bool,
}

impl StagingWriter {
    /// Open the writer for one table-run and prepare the staging area:
    /// full runs clear the whole directory, incremental runs delete only
    /// a leftover single-file dataset.
    pub fn open(
        dest_dir: impl Into<PathBuf>,
        spec: &TableSpec,
        type_hints: HashMap<String, DataType>,
    ) -> Result<Self, StagingError> {
        let dest_dir = dest_dir.into();

        if !spec.incremental && dest_dir.exists() {
            info!(
                "full load: clearing previous staging area '{}'",
                dest_dir.display()
            );
            std::fs::remove_dir_all(&dest_dir)?;
        }
        std::fs::create_dir_all(&dest_dir)?;

        if spec.incremental {
            let single_file = dest_dir.join("data.parquet");
            if single_file.exists() {
                std::fs::remove_file(&single_file)?;
            }
        }

        Ok(Self {
            dest_dir,
            partition_columns: spec.partition_columns.clone(),
            single_writer: None,
            single_schema: None,
            type_hints,
            has_written: false,
        })
    }

    pub fn has_written_data(&self) -> bool {
        self.has_written
    }

    pub fn write_chunk(&mut self, chunk: &DataChunk) -> Result<(), StagingError> {
        if chunk.is_empty() {
            return Ok(());
        }
        if self.partition_columns.is_empty() {
            self.write_single(chunk)?;
        } else {
            self.write_partitioned(chunk)?;
        }
        self.has_written = true;
        Ok(())
    }

    /// Close the underlying writer. Must be called on the success path so
    /// a close failure surfaces as an error instead of a Drop warning.
    pub fn finish(&mut self) -> Result<bool, StagingError> {
        if let Some(writer) = self.single_writer.take() {
            writer.close()?;
        }
        Ok(self.has_written)
    }

    fn write_single(&mut self, chunk: &DataChunk) -> Result<(), StagingError> {
        if self.single_writer.is_none() {
            // Schema is fixed by the first chunk; later chunks of the same
            // run share it by the transformer's output contract.
            let schema = Arc::new(self.infer_schema(chunk, &[]));
            let file = File::create(self.dest_dir.join("data.parquet"))?;
            self.single_writer = Some(ArrowWriter::try_new(file, schema.clone(), None)?);
            self.single_schema = Some(schema);
        }

        let (Some(writer), Some(schema)) =
            (self.single_writer.as_mut(), self.single_schema.as_ref())
        else {
            return Ok(());
        };
        let batch = build_batch(chunk, None, schema)?;
        writer.write(&batch)?;
        Ok(())
    }

    fn write_partitioned(&mut self, chunk: &DataChunk) -> Result<(), StagingError> {
        let mut groups: BTreeMap<Vec<String>, Vec<usize>> = BTreeMap::new();
        let partition_indices: Vec<Option<usize>> = self
            .partition_columns
            .iter()
            .map(|c| chunk.column_index(c))
            .collect();

        for (row_index, row) in chunk.rows().iter().enumerate() {
            let key: Vec<String> = self
                .partition_columns
                .iter()
                .zip(&partition_indices)
                .map(|(column, idx)| {
                    let value = idx.map(|i| partition_value(&row[i])).unwrap_or_default();
                    format!("{column}={value}")
                })
                .collect();
            groups.entry(key).or_default().push(row_index);
        }

        let schema = Arc::new(self.infer_schema(chunk, &self.partition_columns));
        for (segments, row_indices) in groups {
            let mut dir = self.dest_dir.clone();
            for segment in &segments {
                dir.push(segment);
            }
            std::fs::create_dir_all(&dir)?;

            let path = dir.join(format!("part-{}.parquet", uuid::Uuid::new_v4()));
            let batch = build_batch(chunk, Some(&row_indices), &schema)?;
            let file = File::create(&path)?;
            let mut writer = ArrowWriter::try_new(file, schema.clone(), None)?;
            writer.write(&batch)?;
            writer.close()?;
        }
        Ok(())
    }

    /// Arrow schema for a chunk, minus excluded (partition) columns.
    /// Declared contract types win; otherwise the first non-null cell
    /// decides, and an all-null column degrades to strings.
    fn infer_schema(&self, chunk: &DataChunk, exclude: &[String]) -> Schema {
        let fields: Vec<Field> = chunk
            .columns()
            .iter()
            .filter(|c| !exclude.contains(c))
            .map(|column| {
                let data_type = self
                    .type_hints
                    .get(column)
                    .copied()
                    .or_else(|| first_non_null_type(chunk, column))
                    .unwrap_or(DataType::String);
                Field::new(column, arrow_type(data_type), true)
            })
            .collect();
        Schema::new(fields)
    }
}

impl Drop for StagingWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.single_writer.take() {
            if let Err(err) = writer.close() {
                warn!(
                    "staging writer for '{}' failed to close: {err}",
                    self.dest_dir.display()
                );
            }
        }
    }
}

fn first_non_null_type(chunk: &DataChunk, column: &str) -> Option<DataType> {
    let idx = chunk.column_index(column)?;
    chunk
        .rows()
        .iter()
        .map(|row| &row[idx])
        .find(|v| !v.is_null())
        .map(Value::data_type)
}

fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Int => ArrowType::Int64,
        DataType::Float => ArrowType::Float64,
        DataType::Boolean => ArrowType::Boolean,
        DataType::Date => ArrowType::Date32,
        DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
        DataType::String | DataType::Null => ArrowType::Utf8,
    }
}

/// Hive path rendition of a partition cell.
fn partition_value(value: &Value) -> String {
    value.as_string().unwrap_or_else(|| "__null__".to_string())
}

/// Build one record batch from a chunk, optionally restricted to a row
/// subset, shaped by the given schema. Cells that do not fit their
/// field's type become nulls.
fn build_batch(
    chunk: &DataChunk,
    row_indices: Option<&[usize]>,
    schema: &Arc<Schema>,
) -> Result<RecordBatch, StagingError> {
    let rows: Vec<&Vec<Value>> = match row_indices {
        Some(indices) => indices.iter().map(|&i| &chunk.rows()[i]).collect(),
        None => chunk.rows().iter().collect(),
    };

    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let idx = chunk.column_index(field.name());
        let cells = rows.iter().map(|row| idx.map(|i| &row[i]));
        arrays.push(build_array(field.data_type(), cells, rows.len()));
    }

    Ok(RecordBatch::try_new(schema.clone(), arrays)?)
}

fn build_array<'a>(
    arrow_type: &ArrowType,
    cells: impl Iterator<Item = Option<&'a Value>>,
    capacity: usize,
) -> ArrayRef {
    match arrow_type {
        ArrowType::Int64 => {
            let mut builder = Int64Builder::with_capacity(capacity);
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_i64()));
            }
            Arc::new(builder.finish())
        }
        ArrowType::Float64 => {
            let mut builder = Float64Builder::with_capacity(capacity);
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_f64()));
            }
            Arc::new(builder.finish())
        }
        ArrowType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(capacity);
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_bool()));
            }
            Arc::new(builder.finish())
        }
        ArrowType::Date32 => {
            let mut builder = Date32Builder::with_capacity(capacity);
            for cell in cells {
                let days = cell.and_then(|v| match v {
                    Value::Date(d) => Some(d.num_days_from_ce() - UNIX_EPOCH_DAYS),
                    Value::Timestamp(ts) => Some(ts.date().num_days_from_ce() - UNIX_EPOCH_DAYS),
                    _ => None,
                });
                builder.append_option(days);
            }
            Arc::new(builder.finish())
        }
        ArrowType::Timestamp(_, _) => {
            let mut builder = TimestampMicrosecondBuilder::with_capacity(capacity);
            for cell in cells {
                let micros = cell
                    .and_then(|v| v.as_timestamp())
                    .map(|ts| ts.and_utc().timestamp_micros());
                builder.append_option(micros);
            }
            Arc::new(builder.finish())
        }
        _ => {
            let mut builder = StringBuilder::new();
            for cell in cells {
                builder.append_option(cell.and_then(|v| v.as_string()));
            }
            Arc::new(builder.finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::BTreeMap as Map;

    fn ts(day: u32) -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        )
    }

    fn partitioned_spec() -> TableSpec {
        TableSpec {
            source_table: "dbo.traffic_log".into(),
            dest_table: "fact_traffic".into(),
            incremental: true,
            description: None,
            processing_order: 1,
            rename_map: Map::new(),
            partition_columns: vec!["year".into(), "month".into()],
            cleaning_rules: vec![],
            timestamp_column: Some("record_time".into()),
        }
    }

    fn flat_spec(incremental: bool) -> TableSpec {
        TableSpec {
            source_table: "dbo.stores".into(),
            dest_table: "dim_stores".into(),
            incremental,
            description: None,
            processing_order: 1,
            rename_map: Map::new(),
            partition_columns: vec![],
            cleaning_rules: vec![],
            timestamp_column: if incremental {
                Some("updated_at".into())
            } else {
                None
            },
        }
    }

    fn traffic_chunk() -> DataChunk {
        DataChunk::new(
            "fact_traffic",
            vec![
                "recorded_at".into(),
                "visitors_in".into(),
                "year".into(),
                "month".into(),
            ],
            vec![
                vec![ts(1), Value::Int(5), Value::Int(2024), Value::Int(5)],
                vec![ts(2), Value::Int(7), Value::Int(2024), Value::Int(5)],
            ],
        )
    }

    #[test]
    fn partitioned_chunks_land_in_hive_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("fact_traffic");
        let mut writer =
            StagingWriter::open(&staging, &partitioned_spec(), HashMap::new()).unwrap();

        writer.write_chunk(&traffic_chunk()).unwrap();
        assert!(writer.finish().unwrap());

        let partition_dir = staging.join("year=2024").join("month=5");
        assert!(partition_dir.is_dir());
        let files: Vec<_> = std::fs::read_dir(&partition_dir).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn partition_columns_are_stripped_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("fact_traffic");
        let mut writer =
            StagingWriter::open(&staging, &partitioned_spec(), HashMap::new()).unwrap();
        let schema = writer.infer_schema(&traffic_chunk(), &writer.partition_columns.clone());
        assert_eq!(schema.fields().len(), 2);
        assert!(schema.field_with_name("year").is_err());
        writer.finish().unwrap();
    }

    #[test]
    fn single_file_mode_appends_across_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("dim_stores");
        let mut writer = StagingWriter::open(&staging, &flat_spec(false), HashMap::new()).unwrap();

        let chunk = DataChunk::new(
            "dim_stores",
            vec!["store_id".into(), "store_name".into()],
            vec![vec![Value::Int(1), Value::String("A".into())]],
        );
        writer.write_chunk(&chunk).unwrap();
        writer.write_chunk(&chunk).unwrap();
        assert!(writer.finish().unwrap());

        assert!(staging.join("data.parquet").is_file());
    }

    #[test]
    fn empty_run_writes_nothing_and_still_closes() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("dim_stores");
        let mut writer = StagingWriter::open(&staging, &flat_spec(false), HashMap::new()).unwrap();
        assert!(!writer.finish().unwrap());
        assert!(!staging.join("data.parquet").exists());
    }

    #[test]
    fn full_run_clears_previous_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("dim_stores");
        std::fs::create_dir_all(staging.join("year=2023")).unwrap();
        std::fs::write(staging.join("stale.parquet"), b"old").unwrap();

        let mut writer = StagingWriter::open(&staging, &flat_spec(false), HashMap::new()).unwrap();
        assert!(!staging.join("stale.parquet").exists());
        assert!(!staging.join("year=2023").exists());
        writer.finish().unwrap();
    }

    #[test]
    fn incremental_run_deletes_only_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("fact_traffic");
        std::fs::create_dir_all(staging.join("year=2023")).unwrap();
        std::fs::write(staging.join("data.parquet"), b"old").unwrap();

        let mut writer =
            StagingWriter::open(&staging, &partitioned_spec(), HashMap::new()).unwrap();
        assert!(!staging.join("data.parquet").exists());
        // Existing partitions survive incremental runs.
        assert!(staging.join("year=2023").is_dir());
        writer.finish().unwrap();
    }

    #[test]
    fn type_hints_override_inference() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("fact_errors");
        let hints = HashMap::from([("device_code".to_string(), DataType::Int)]);
        let writer = StagingWriter::open(&staging, &flat_spec(false), hints).unwrap();

        // Column is all-null; without the hint it would degrade to Utf8.
        let chunk = DataChunk::new(
            "fact_errors",
            vec!["device_code".into()],
            vec![vec![Value::Null]],
        );
        let schema = writer.infer_schema(&chunk, &[]);
        assert_eq!(*schema.field(0).data_type(), ArrowType::Int64);
    }
}
