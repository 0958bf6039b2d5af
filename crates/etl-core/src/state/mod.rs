pub mod json_store;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("failed to persist watermark state: {0}")]
    Persist(#[source] std::io::Error),

    #[error("failed to encode watermark state: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable cursor store: one watermark string per destination table.
///
/// Read once at pipeline start, advanced only after a table's swap has
/// fully committed. Implementations must make `update` safe to call from
/// concurrent table workers.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Watermark for one table, if it has ever committed a run.
    async fn get(&self, dest_table: &str) -> Option<String>;

    /// Atomically set the table's watermark and persist the whole map.
    async fn update(&self, dest_table: &str, watermark: String) -> Result<(), StateStoreError>;
}
