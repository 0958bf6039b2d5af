use crate::error::TransformError;
use crate::transform::pipeline::ChunkTransform;
use crate::transform::STORE_ID_COLUMN;
use chrono::Duration;
use etl_config::{offsets::TimeOffsets, table_spec::TableSpec};
use model::core::value::Value;
use model::records::chunk::DataChunk;
use std::collections::HashMap;
use tracing::warn;

/// Corrects per-store sensor clock skew by subtracting a configured
/// minute offset from the timestamp column, keyed on the store id of each
/// row. Runs before renaming, so both columns carry their source names.
///
/// A store without an entry gets offset 0; timestamps that fail to parse
/// become Null here and are dropped by the type-normalization stage.
pub struct TimeOffsetCorrection {
    timestamp_column: String,
    offsets: HashMap<i64, i64>,
}

impl TimeOffsetCorrection {
    /// Build the stage for one table, or `None` when the table has no
    /// timestamp column or no offset entries (nothing to correct).
    pub fn for_table(spec: &TableSpec, offsets: &TimeOffsets) -> Option<Self> {
        let timestamp_column = spec.timestamp_column.clone()?;
        let offsets = offsets.for_table(spec.offset_key())?.clone();
        Some(Self {
            timestamp_column,
            offsets,
        })
    }
}

impl ChunkTransform for TimeOffsetCorrection {
    fn name(&self) -> &'static str {
        "time_offset"
    }

    fn apply(&self, mut chunk: DataChunk) -> Result<DataChunk, TransformError> {
        if !chunk.has_column(STORE_ID_COLUMN) || !chunk.has_column(&self.timestamp_column) {
            warn!(
                "skipping time offset correction for '{}': missing column",
                chunk.table()
            );
            return Ok(chunk);
        }

        chunk.map_column_keyed(&self.timestamp_column, STORE_ID_COLUMN, |store, current| {
            let minutes = store
                .as_i64()
                .map(|id| self.offsets.get(&id).copied().unwrap_or(0))
                .unwrap_or(0);
            match current.as_timestamp() {
                Some(ts) => Value::Timestamp(ts - Duration::minutes(minutes)),
                None => Value::Null,
            }
        });
        Ok(chunk)
    }
}
