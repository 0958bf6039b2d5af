use crate::error::SwapError;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Handle to the embedded analytical store.
///
/// One connection is shared by every table worker; the mutex serializes
/// access, and concurrent tables stay independent because each uses its
/// own staging/backup table names. All calls run on the blocking thread
/// pool — the driver is synchronous.
#[derive(Clone)]
pub struct AnalyticsStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl AnalyticsStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SwapError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(&path).map_err(|source| SwapError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a closure against the shared connection on the blocking pool.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, SwapError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SwapError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|err| SwapError::Task(err.to_string()))?
    }

    /// Convenience for tests and bootstrap: run a statement batch.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SwapError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    /// Scalar `i64` query, used for row counts in checks and tests.
    pub async fn query_i64(&self, sql: &str) -> Result<i64, SwapError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let value = conn.query_row(&sql, [], |row| row.get::<_, i64>(0))?;
            Ok(value)
        })
        .await
    }

    /// Whether a table with this exact name exists in the store.
    pub async fn table_exists(&self, table: &str) -> Result<bool, SwapError> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let count = conn.query_row(
                "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
                duckdb::params![table],
                |row| row.get::<_, i64>(0),
            )?;
            Ok(count > 0)
        })
        .await
    }
}
