use crate::duck::store::AnalyticsStore;
use crate::error::SwapError;
use std::path::Path;
use tracing::{info, warn};

/// Promote one table's staging area into the analytical store.
///
/// Protocol (the live table is never observably half-written):
/// 1. bulk-load every staged Parquet file into `<dest>_staging`;
/// 2. inside one transaction, drop a leftover `<dest>_old`, rename the
///    live table (if any) to `<dest>_old`, rename `<dest>_staging` to the
///    live name, commit;
/// 3. outside the transaction, drop the backup, optionally delete the
///    staging files (full reloads), and refresh table statistics.
///
/// Any failure through step 2 rolls the transaction back and returns
/// `SwapError`, leaving the live table exactly as it was pre-run. Step 3
/// failures are logged only.
pub async fn promote_staged(
    store: &AnalyticsStore,
    dest_table: &str,
    staging_dir: &Path,
    delete_staging_after: bool,
) -> Result<(), SwapError> {
    let staging_table = format!("{dest_table}_staging");
    let backup_table = format!("{dest_table}_old");
    let parquet_glob = parquet_glob(staging_dir);

    info!("loading staged files into '{staging_table}'");
    {
        let staging_table = staging_table.clone();
        let dest = dest_table.to_string();
        store
            .with_conn(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE OR REPLACE TABLE {staging_table} AS \
                     SELECT * FROM read_parquet('{parquet_glob}', hive_partitioning=true);"
                ))
                .map_err(|source| SwapError::BulkLoad {
                    table: dest.clone(),
                    source,
                })?;
                Ok(())
            })
            .await?;
    }

    info!("promoting '{staging_table}' to '{dest_table}'");
    {
        let staging_table = staging_table.clone();
        let backup_table = backup_table.clone();
        let dest = dest_table.to_string();
        store
            .with_conn(move |conn| {
                let swap = format!(
                    "BEGIN TRANSACTION;\n\
                     DROP TABLE IF EXISTS {backup_table};\n\
                     ALTER TABLE IF EXISTS {dest} RENAME TO {backup_table};\n\
                     ALTER TABLE {staging_table} RENAME TO {dest};\n\
                     COMMIT;"
                );
                if let Err(source) = conn.execute_batch(&swap) {
                    if let Err(rollback_err) = conn.execute_batch("ROLLBACK;") {
                        warn!("rollback after failed promotion also failed: {rollback_err}");
                    }
                    return Err(SwapError::Promotion {
                        table: dest.clone(),
                        source,
                    });
                }
                Ok(())
            })
            .await?;
    }

    // Non-critical cleanup: the swap is already committed.
    if let Err(err) = store
        .execute_batch(&format!("DROP TABLE IF EXISTS {backup_table};"))
        .await
    {
        warn!("could not drop backup table '{backup_table}': {err}");
    }

    if delete_staging_after {
        if let Err(err) = std::fs::remove_dir_all(staging_dir) {
            warn!(
                "could not delete staging area '{}': {err}",
                staging_dir.display()
            );
        } else {
            info!("deleted staging area '{}'", staging_dir.display());
        }
    }

    if let Err(err) = store.execute_batch(&format!("ANALYZE {dest_table};")).await {
        warn!("statistics refresh for '{dest_table}' failed: {err}");
    } else {
        info!("statistics for '{dest_table}' refreshed");
    }

    Ok(())
}

/// Glob matching every staged file under the table's staging directory,
/// partitioned or not. Single quotes in the path are doubled for the SQL
/// string literal.
fn parquet_glob(staging_dir: &Path) -> String {
    let dir = staging_dir.to_string_lossy().replace('\'', "''");
    format!("{dir}/**")
}
