use crate::error::TableRunError;
use crate::staging::StagingWriter;
use chrono::NaiveDateTime;
use connectors::duck::store::AnalyticsStore;
use connectors::duck::swap::promote_staged;
use connectors::sql::source::ChunkSource;
use etl_config::settings::Settings;
use etl_config::table_spec::TableSpec;
use etl_core::state::WatermarkStore;
use etl_processing::contract::registry::contract_for;
use etl_processing::service::ChunkProcessor;
use model::core::data_type::DataType;
use model::execution::outcome::ChunkOutcome;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Per-table pipeline stage, for progress logging. `Succeeded` and
/// `Failed` are the only terminal states; a run that moved nothing is a
/// `Succeeded` no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    Pending,
    Extracting,
    TransformingStaging,
    Loading,
    Succeeded,
    Failed,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::Pending => "pending",
            RunStage::Extracting => "extracting",
            RunStage::TransformingStaging => "transforming/staging",
            RunStage::Loading => "loading",
            RunStage::Succeeded => "succeeded",
            RunStage::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// What one successful table cycle did.
#[derive(Debug, Clone)]
pub struct TableRunReport {
    pub dest_table: String,
    pub rows_written: usize,
    pub chunks_rejected: usize,
    pub chunks_failed: usize,
    /// New watermark persisted for this table, if any.
    pub watermark: Option<String>,
    /// True when no chunk wrote data and the destination was untouched.
    pub skipped: bool,
}

/// Everything one table cycle needs. Cheap to clone per retry attempt.
#[derive(Clone)]
pub struct TableRunContext {
    pub settings: Arc<Settings>,
    pub source: Arc<dyn ChunkSource>,
    pub store: AnalyticsStore,
    pub state: Arc<dyn WatermarkStore>,
    pub run_id: String,
    pub cancel: CancellationToken,
}

/// Run the full Extract → Transform/Stage → Load cycle for one table.
///
/// The watermark is read first and persisted last, and only when the swap
/// has fully committed — a crash in between means the next run safely
/// reprocesses an already-loaded window instead of skipping data.
pub async fn run_table(
    ctx: &TableRunContext,
    spec: &TableSpec,
) -> Result<TableRunReport, TableRunError> {
    let dest_table = spec.dest_table.as_str();
    let mut stage = RunStage::Pending;
    info!(
        "processing '{}' -> '{dest_table}' (incremental: {})",
        spec.source_table, spec.incremental
    );

    let watermark = match ctx.state.get(dest_table).await {
        Some(mark) => mark,
        None => ctx.settings.default_watermark.clone(),
    };

    let staging_dir = ctx.settings.staging_dir(dest_table);
    let mut writer = StagingWriter::open(&staging_dir, spec, contract_types(dest_table))?;

    stage = advance(dest_table, stage, RunStage::Extracting);
    let mut stream = ctx
        .source
        .open(spec, &watermark, ctx.settings.chunk_size)
        .await?;

    let processor = ChunkProcessor::for_table(
        spec,
        &ctx.settings.time_offsets,
        ctx.settings.rejected_dir(),
        ctx.run_id.clone(),
    );
    let final_ts_column = spec.final_timestamp_column().map(str::to_string);

    stage = advance(dest_table, stage, RunStage::TransformingStaging);
    let mut rows_written = 0usize;
    let mut chunks_rejected = 0usize;
    let mut chunks_failed = 0usize;
    let mut max_timestamp: Option<NaiveDateTime> = None;

    while let Some(chunk) = stream.next_chunk().await? {
        if ctx.cancel.is_cancelled() {
            return Err(TableRunError::Cancelled);
        }

        match processor.process(chunk) {
            ChunkOutcome::Clean(clean) => {
                if clean.is_empty() {
                    continue;
                }
                writer.write_chunk(&clean)?;
                rows_written += clean.len();

                if let Some(ts_column) = final_ts_column.as_deref() {
                    let chunk_max = clean.max_timestamp(ts_column);
                    max_timestamp = match (max_timestamp, chunk_max) {
                        (Some(current), Some(new)) => Some(current.max(new)),
                        (current, new) => current.or(new),
                    };
                }
            }
            ChunkOutcome::Rejected { rows, .. } => {
                chunks_rejected += 1;
                info!("'{dest_table}': rejected chunk of {rows} row(s)");
            }
            ChunkOutcome::Failed { message } => {
                chunks_failed += 1;
                error!("'{dest_table}': discarded chunk after internal error: {message}");
            }
        }
    }

    let has_written = writer.finish()?;

    if !has_written {
        info!("no new data for '{dest_table}', destination left untouched");
        advance(dest_table, stage, RunStage::Succeeded);
        return Ok(TableRunReport {
            dest_table: dest_table.to_string(),
            rows_written: 0,
            chunks_rejected,
            chunks_failed,
            watermark: None,
            skipped: true,
        });
    }

    stage = advance(dest_table, stage, RunStage::Loading);
    info!("processed {rows_written} row(s) for '{dest_table}', loading into analytical store");
    let delete_staging_after = !spec.incremental && ctx.settings.cleanup_full_staging;
    promote_staged(&ctx.store, dest_table, &staging_dir, delete_staging_after).await?;

    let mut persisted_watermark = None;
    if spec.incremental {
        if let Some(max_ts) = max_timestamp {
            let mark = max_ts.format("%Y-%m-%d %H:%M:%S").to_string();
            // The swap is already committed: a state write failure only
            // risks reprocessing this window next run, so it must not
            // fail the table.
            match ctx.state.update(dest_table, mark.clone()).await {
                Ok(()) => persisted_watermark = Some(mark),
                Err(err) => error!("failed to persist watermark for '{dest_table}': {err}"),
            }
        }
    }

    advance(dest_table, stage, RunStage::Succeeded);
    Ok(TableRunReport {
        dest_table: dest_table.to_string(),
        rows_written,
        chunks_rejected,
        chunks_failed,
        watermark: persisted_watermark,
        skipped: false,
    })
}

fn advance(dest_table: &str, from: RunStage, to: RunStage) -> RunStage {
    info!("'{dest_table}': {from} -> {to}");
    to
}

/// Declared column types for the staging writer, so all-null columns keep
/// their contract type in the Parquet schema.
fn contract_types(dest_table: &str) -> HashMap<String, DataType> {
    contract_for(dest_table)
        .map(|contract| {
            contract
                .columns
                .iter()
                .map(|c| (c.name.to_string(), c.data_type))
                .collect()
        })
        .unwrap_or_default()
}
