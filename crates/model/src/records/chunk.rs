use crate::core::value::Value;
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// A bounded batch of rows with a stable column schema.
///
/// One chunk is created by the extractor, exclusively owned by the
/// transformer, staged, and discarded — memory use stays proportional to
/// the configured chunk size regardless of table size. Rows are stored
/// row-major but every mutation helper operates on whole columns, which is
/// what the transform stages want.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChunk {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl DataChunk {
    /// Build a chunk. Every row must have exactly one value per column.
    pub fn new(table: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let chunk = Self {
            table: table.into(),
            columns,
            rows,
        };
        debug_assert!(
            chunk.rows.iter().all(|r| r.len() == chunk.columns.len()),
            "row width must match column count"
        );
        chunk
    }

    pub fn empty(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self::new(table, columns, Vec::new())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Immutable view of one column's cells, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Rewrite one column in place. Returns false when the column is
    /// missing, so callers can skip-and-warn instead of failing.
    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> bool
    where
        F: FnMut(&mut Value),
    {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        for row in &mut self.rows {
            f(&mut row[idx]);
        }
        true
    }

    /// Rewrite one column keyed by another column of the same row (e.g.
    /// the time offset correction keys on the store id). Returns false if
    /// either column is missing.
    pub fn map_column_keyed<F>(&mut self, name: &str, key: &str, mut f: F) -> bool
    where
        F: FnMut(&Value, Value) -> Value,
    {
        let (Some(idx), Some(key_idx)) = (self.column_index(name), self.column_index(key)) else {
            return false;
        };
        for row in &mut self.rows {
            let key_value = row[key_idx].clone();
            let current = std::mem::replace(&mut row[idx], Value::Null);
            row[idx] = f(&key_value, current);
        }
        true
    }

    pub fn retain_rows<F>(&mut self, mut f: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| f(row));
    }

    /// Append a derived column. The value list must be one per row.
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len());
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }

    pub fn rename_columns(&mut self, rename: &HashMap<String, String>) {
        for column in &mut self.columns {
            if let Some(new_name) = rename.get(column) {
                *column = new_name.clone();
            }
        }
    }

    /// Keep only `keep` (in that order), dropping everything else. Columns
    /// in `keep` that the chunk does not carry are skipped, not invented.
    pub fn select_columns(&mut self, keep: &[String]) {
        let indices: Vec<usize> = keep
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();
        self.columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = indices.iter().map(|&i| row[i].clone()).collect();
        }
    }

    /// Maximum timestamp observed in a column, ignoring non-timestamp
    /// cells. Feeds the incremental high-water mark.
    pub fn max_timestamp(&self, name: &str) -> Option<NaiveDateTime> {
        let idx = self.column_index(name)?;
        self.rows
            .iter()
            .filter_map(|row| match &row[idx] {
                Value::Timestamp(ts) => Some(*ts),
                _ => None,
            })
            .max()
    }

    /// One row as a name → value map, for dead-letter records.
    pub fn row_map(&self, index: usize) -> HashMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[index].iter().cloned())
            .collect()
    }
}
