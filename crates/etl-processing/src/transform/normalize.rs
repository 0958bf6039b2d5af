use crate::error::TransformError;
use crate::transform::pipeline::ChunkTransform;
use crate::transform::COUNTER_COLUMNS;
use chrono::Datelike;
use etl_config::table_spec::TableSpec;
use model::core::value::Value;
use model::records::chunk::DataChunk;

/// Type normalization and partition derivation.
///
/// Counter columns clamp to non-negative integers — missing, invalid and
/// negative readings all become 0, the sensor-noise floor the downstream
/// aggregates were calibrated against. The timestamp column is coerced to
/// a real timestamp and rows that fail coercion are dropped; `year` and
/// `month` partition columns are derived from it when declared.
pub struct TypeNormalization {
    counter_columns: Vec<String>,
    timestamp_column: Option<String>,
    partition_columns: Vec<String>,
}

impl TypeNormalization {
    pub fn for_table(spec: &TableSpec) -> Self {
        // Only counters that the table actually renames take part, under
        // their destination names.
        let counter_columns = COUNTER_COLUMNS
            .iter()
            .filter_map(|source| spec.rename_map.get(*source).cloned())
            .collect();
        Self {
            counter_columns,
            timestamp_column: spec.final_timestamp_column().map(str::to_string),
            partition_columns: spec.partition_columns.clone(),
        }
    }
}

impl ChunkTransform for TypeNormalization {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn apply(&self, mut chunk: DataChunk) -> Result<DataChunk, TransformError> {
        for column in &self.counter_columns {
            chunk.map_column(column, |value| {
                let clamped = value
                    .as_f64()
                    .map(|f| f.trunc() as i64)
                    .unwrap_or(0)
                    .max(0);
                *value = Value::Int(clamped);
            });
        }

        let Some(ts_column) = self.timestamp_column.as_deref() else {
            return Ok(chunk);
        };
        if !chunk.has_column(ts_column) {
            return Ok(chunk);
        }

        chunk.map_column(ts_column, |value| {
            *value = match value.as_timestamp() {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Null,
            };
        });
        let ts_index = chunk.column_index(ts_column).unwrap_or_default();
        chunk.retain_rows(|row| matches!(row[ts_index], Value::Timestamp(_)));

        if chunk.is_empty() {
            return Ok(chunk);
        }

        for partition in ["year", "month"] {
            if !self.partition_columns.iter().any(|p| p == partition) {
                continue;
            }
            let values: Vec<Value> = chunk
                .rows()
                .iter()
                .map(|row| match &row[ts_index] {
                    Value::Timestamp(ts) if partition == "year" => Value::Int(ts.year() as i64),
                    Value::Timestamp(ts) => Value::Int(ts.month() as i64),
                    _ => Value::Null,
                })
                .collect();
            chunk.add_column(partition, values);
        }

        Ok(chunk)
    }
}
