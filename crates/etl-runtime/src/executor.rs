use crate::error::TableRunError;
use crate::notify::CacheInvalidator;
use crate::summary::{RunSummary, TableOutcome};
use crate::table_run::{run_table, TableRunContext};
use connectors::duck::store::AnalyticsStore;
use connectors::sql::source::ChunkSource;
use etl_config::settings::Settings;
use etl_config::table_spec::TableSpec;
use etl_core::retry::{RetryDisposition, RetryError, RetryPolicy};
use etl_core::state::WatermarkStore;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Options for one batch invocation, on top of the static settings.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Worker-pool width; `None` uses the configured default.
    pub workers: Option<usize>,
    /// Fire the cache-invalidation signal when the batch loaded data.
    pub invalidate_cache: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            workers: None,
            invalidate_cache: true,
        }
    }
}

/// Drives a whole batch: every configured table through its own cycle,
/// concurrently up to the worker-pool width, each cycle wrapped in the
/// bounded retry policy. One table failing (even after retries) never
/// cancels or blocks the others.
pub struct EtlExecutor {
    settings: Arc<Settings>,
    source: Arc<dyn ChunkSource>,
    store: AnalyticsStore,
    state: Arc<dyn WatermarkStore>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl EtlExecutor {
    pub fn new(
        settings: Arc<Settings>,
        source: Arc<dyn ChunkSource>,
        store: AnalyticsStore,
        state: Arc<dyn WatermarkStore>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            source,
            store,
            state,
            retry: RetryPolicy::for_table_cycle(),
            cancel,
        }
    }

    /// Override the retry pacing (tests use millisecond delays).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn run(&self, options: ExecutorOptions) -> RunSummary {
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        let workers = options.workers.unwrap_or(self.settings.workers).max(1);
        let specs: Vec<TableSpec> = self
            .settings
            .ordered_tables()
            .into_iter()
            .cloned()
            .collect();

        info!(
            "starting ETL batch {run_id}: {} table(s), {workers} worker(s)",
            specs.len()
        );

        let mut summary = RunSummary::new(run_id.clone());
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<(String, TableOutcome)> = JoinSet::new();

        for spec in specs {
            let ctx = TableRunContext {
                settings: self.settings.clone(),
                source: self.source.clone(),
                store: self.store.clone(),
                state: self.state.clone(),
                run_id: run_id.clone(),
                cancel: self.cancel.clone(),
            };
            let retry = self.retry.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let dest_table = spec.dest_table.clone();
                let Ok(_permit) = semaphore.acquire().await else {
                    return (
                        dest_table,
                        TableOutcome::Failed {
                            error: "worker pool closed".into(),
                        },
                    );
                };

                if ctx.cancel.is_cancelled() {
                    return (
                        dest_table,
                        TableOutcome::Failed {
                            error: "cancelled before start".into(),
                        },
                    );
                }

                let outcome = process_table(&ctx, &spec, &retry).await;
                (dest_table, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((dest_table, outcome)) => {
                    match &outcome {
                        TableOutcome::Succeeded { rows, .. } => {
                            info!("table '{dest_table}' succeeded ({rows} rows)")
                        }
                        TableOutcome::Skipped => info!("table '{dest_table}' had no new data"),
                        TableOutcome::Failed { error } => {
                            error!("table '{dest_table}' failed: {error}")
                        }
                    }
                    summary.record(dest_table, outcome);
                }
                Err(err) => error!("table worker panicked: {err}"),
            }
        }

        info!("{summary}");

        if options.invalidate_cache && summary.any_loaded() {
            if let Some(invalidator) = CacheInvalidator::new(
                &self.settings.api_url,
                self.settings.internal_api_token.as_deref(),
            ) {
                if let Err(err) = invalidator.invalidate().await {
                    // Stale dashboards are annoying, not fatal.
                    warn!("cache invalidation failed: {err}");
                }
            }
        }

        summary
    }
}

/// One table through the retry-wrapped cycle.
async fn process_table(
    ctx: &TableRunContext,
    spec: &TableSpec,
    retry: &RetryPolicy,
) -> TableOutcome {
    let result = retry
        .run(
            || run_table(ctx, spec),
            |err: &TableRunError| {
                if err.is_transient() {
                    RetryDisposition::Retry
                } else {
                    RetryDisposition::Stop
                }
            },
        )
        .await;

    match result {
        Ok(report) if report.skipped => TableOutcome::Skipped,
        Ok(report) => TableOutcome::Succeeded {
            rows: report.rows_written,
            watermark: report.watermark,
        },
        Err(RetryError::AttemptsExceeded(err)) => TableOutcome::Failed {
            error: format!("retries exhausted: {err}"),
        },
        Err(RetryError::Fatal(err)) => TableOutcome::Failed {
            error: err.to_string(),
        },
    }
}
