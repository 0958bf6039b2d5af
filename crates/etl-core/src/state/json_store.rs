use crate::state::{StateStoreError, WatermarkStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Watermark store backed by a single JSON file.
///
/// The file is a flat `dest_table → "YYYY-MM-DD HH:MM:SS"` object and is
/// rewritten in full on every update; the mutex serializes the
/// read-modify-persist cycle across concurrent table workers. A missing or
/// unreadable file degrades to an empty map, which makes the next run a
/// safe full reload rather than a crash.
pub struct JsonStateStore {
    path: PathBuf,
    state: Mutex<BTreeMap<String, String>>,
}

impl JsonStateStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(err) => {
                    warn!(
                        "watermark file '{}' is not valid JSON ({err}), starting over",
                        path.display()
                    );
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "no watermark file at '{}', assuming first run (full load)",
                    path.display()
                );
                BTreeMap::new()
            }
            Err(err) => {
                warn!(
                    "could not read watermark file '{}' ({err}), starting over",
                    path.display()
                );
                BTreeMap::new()
            }
        };

        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Snapshot of the current map, for reporting.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl WatermarkStore for JsonStateStore {
    async fn get(&self, dest_table: &str) -> Option<String> {
        self.state.lock().await.get(dest_table).cloned()
    }

    async fn update(&self, dest_table: &str, watermark: String) -> Result<(), StateStoreError> {
        let mut state = self.state.lock().await;
        state.insert(dest_table.to_string(), watermark.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StateStoreError::Persist)?;
        }
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(&self.path, json).map_err(StateStoreError::Persist)?;

        debug!("watermark for '{dest_table}' advanced to {watermark}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_means_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStateStore::open(dir.path().join("etl_state.json"));
        assert_eq!(store.get("fact_traffic").await, None);
    }

    #[tokio::test]
    async fn update_persists_whole_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl_state.json");

        let store = JsonStateStore::open(&path);
        store
            .update("fact_traffic", "2024-05-17 08:30:00".to_string())
            .await
            .unwrap();
        store
            .update("fact_errors", "2024-05-17 09:00:00".to_string())
            .await
            .unwrap();

        // A fresh store sees both entries from disk.
        let reopened = JsonStateStore::open(&path);
        assert_eq!(
            reopened.get("fact_traffic").await.as_deref(),
            Some("2024-05-17 08:30:00")
        );
        assert_eq!(
            reopened.get("fact_errors").await.as_deref(),
            Some("2024-05-17 09:00:00")
        );
    }

    #[tokio::test]
    async fn corrupt_file_starts_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl_state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonStateStore::open(&path);
        assert_eq!(store.get("fact_traffic").await, None);
    }

    #[tokio::test]
    async fn concurrent_updates_keep_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl_state.json");
        let store = std::sync::Arc::new(JsonStateStore::open(&path));

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update(&format!("table_{i}"), format!("2024-01-0{} 00:00:00", i + 1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), 8);
    }
}
