use model::execution::rejected_row::RejectedRow;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("failed to write dead-letter file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize rejected row: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only sink for rows that failed contract validation.
///
/// Each rejection event produces one JSONL file under
/// `<dir>/<dest_table>/rejected_<timestamp>.jsonl` — one JSON object per
/// rejected row. The pipeline never reads these back; they exist for
/// offline inspection. Callers treat write failures as log-only.
pub struct DeadLetterWriter {
    dir: PathBuf,
}

impl DeadLetterWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write one rejection event. Returns the file written.
    pub fn write_batch(
        &self,
        dest_table: &str,
        rows: &[RejectedRow],
    ) -> Result<PathBuf, DeadLetterError> {
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let path = self
            .dir
            .join(dest_table)
            .join(format!("rejected_{stamp}.jsonl"));
        self.write_to(&path, rows)?;
        info!(
            "wrote {} rejected row(s) for '{dest_table}' to {}",
            rows.len(),
            path.display()
        );
        Ok(path)
    }

    fn write_to(&self, path: &Path, rows: &[RejectedRow]) -> Result<(), DeadLetterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        for row in rows {
            let json = serde_json::to_string(row)?;
            writeln!(file, "{json}")?;
        }
        debug!("appended {} row(s) to {}", rows.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::value::Value;
    use model::execution::rejected_row::ProcessingStage;
    use std::collections::HashMap;

    fn rejected(table: &str) -> RejectedRow {
        let mut data = HashMap::new();
        data.insert("store_id".to_string(), Value::Int(1));
        RejectedRow::new(
            table,
            ProcessingStage::Validation,
            "not_null",
            "column 'store_name' contains null values",
            data,
            "run-1",
        )
    }

    #[test]
    fn writes_one_jsonl_line_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DeadLetterWriter::new(dir.path());

        let path = writer
            .write_batch("dim_stores", &[rejected("dim_stores"), rejected("dim_stores")])
            .unwrap();

        assert!(path.starts_with(dir.path().join("dim_stores")));
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("not_null"));
    }

    #[test]
    fn creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let writer = DeadLetterWriter::new(dir.path().join("deep").join("rejected"));
        let path = writer.write_batch("fact_traffic", &[rejected("fact_traffic")]).unwrap();
        assert!(path.exists());
    }
}
