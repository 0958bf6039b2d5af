#[cfg(test)]
mod tests {
    use crate::utils::{
        stores_spec, test_settings, traffic_row, traffic_spec, ts, MemorySource, TRAFFIC_COLUMNS,
    };
    use connectors::duck::store::AnalyticsStore;
    use connectors::duck::swap::promote_staged;
    use etl_config::settings::Settings;
    use etl_core::retry::RetryPolicy;
    use etl_core::state::json_store::JsonStateStore;
    use etl_core::state::WatermarkStore;
    use etl_runtime::executor::{EtlExecutor, ExecutorOptions};
    use etl_runtime::staging::StagingWriter;
    use etl_runtime::summary::{RunSummary, TableOutcome};
    use model::core::value::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Harness {
        settings: Arc<Settings>,
        source: Arc<MemorySource>,
        store: AnalyticsStore,
        state: Arc<JsonStateStore>,
        _data_dir: tempfile::TempDir,
    }

    impl Harness {
        fn new(specs: Vec<etl_config::table_spec::TableSpec>) -> Self {
            let data_dir = tempfile::tempdir().unwrap();
            let settings = Arc::new(test_settings(data_dir.path(), specs));
            let store = AnalyticsStore::open(settings.duckdb_path()).unwrap();
            let state = Arc::new(JsonStateStore::open(settings.state_file()));
            Self {
                settings,
                source: Arc::new(MemorySource::new()),
                store,
                state,
                _data_dir: data_dir,
            }
        }

        async fn run(&self) -> RunSummary {
            let executor = EtlExecutor::new(
                self.settings.clone(),
                self.source.clone(),
                self.store.clone(),
                self.state.clone(),
                CancellationToken::new(),
            )
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1)));
            executor
                .run(ExecutorOptions {
                    workers: None,
                    invalidate_cache: false,
                })
                .await
        }

        async fn count(&self, sql: &str) -> i64 {
            self.store.query_i64(sql).await.unwrap()
        }

        fn seed_stores(&self) {
            self.source.insert_table(
                "src_stores",
                vec!["id", "name"],
                vec![
                    vec![Value::Int(1), Value::String("Downtown".into())],
                    vec![Value::Int(2), Value::String("Airport".into())],
                    vec![Value::Int(3), Value::String("Mall".into())],
                ],
            );
        }
    }

    fn expect_succeeded(summary: &RunSummary, table: &str) {
        match summary.outcomes.get(table) {
            Some(TableOutcome::Succeeded { .. }) => {}
            other => panic!("expected '{table}' to succeed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_reload_is_idempotent() {
        let harness = Harness::new(vec![stores_spec()]);
        harness.seed_stores();

        let first = harness.run().await;
        expect_succeeded(&first, "dim_stores");
        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 3);

        let second = harness.run().await;
        expect_succeeded(&second, "dim_stores");
        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 3);
        assert_eq!(
            harness
                .count("SELECT count(*) FROM dim_stores WHERE store_name = 'Downtown'")
                .await,
            1
        );
    }

    #[tokio::test]
    async fn incremental_runs_union_to_a_full_run() {
        // Split ingestion: two rows now, two rows later.
        let split = Harness::new(vec![traffic_spec()]);
        split.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![
                traffic_row(ts(1, 9), 5, 4, 1),
                traffic_row(ts(2, 9), 6, 5, 1),
            ],
        );
        split.run().await;
        split.source.push_row("traffic_log", traffic_row(ts(3, 9), 7, 6, 2));
        split.source.push_row("traffic_log", traffic_row(ts(4, 9), 8, 7, 2));
        split.run().await;

        // Single full ingestion over the same data.
        let whole = Harness::new(vec![traffic_spec()]);
        whole.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![
                traffic_row(ts(1, 9), 5, 4, 1),
                traffic_row(ts(2, 9), 6, 5, 1),
                traffic_row(ts(3, 9), 7, 6, 2),
                traffic_row(ts(4, 9), 8, 7, 2),
            ],
        );
        whole.run().await;

        for harness in [&split, &whole] {
            assert_eq!(harness.count("SELECT count(*) FROM fact_traffic").await, 4);
            assert_eq!(
                harness
                    .count("SELECT sum(visitors_in) FROM fact_traffic")
                    .await,
                26
            );
        }
    }

    #[tokio::test]
    async fn watermark_tracks_the_maximum_timestamp() {
        let harness = Harness::new(vec![traffic_spec()]);
        harness.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![
                traffic_row(ts(1, 9), 1, 1, 1),
                traffic_row(ts(2, 9), 2, 2, 1),
                traffic_row(ts(3, 9), 3, 3, 1),
            ],
        );

        let first = harness.run().await;
        expect_succeeded(&first, "fact_traffic");
        assert_eq!(harness.count("SELECT count(*) FROM fact_traffic").await, 3);
        assert_eq!(
            harness.state.get("fact_traffic").await.as_deref(),
            Some("2024-05-03 09:00:00")
        );

        // A new reading arrives; the next run must only move that row.
        harness
            .source
            .push_row("traffic_log", traffic_row(ts(4, 9), 4, 4, 1));
        let second = harness.run().await;
        expect_succeeded(&second, "fact_traffic");

        // Re-extracting the old window would duplicate rows in the
        // accumulated staging area; four rows proves only T4 moved.
        assert_eq!(harness.count("SELECT count(*) FROM fact_traffic").await, 4);
        assert_eq!(
            harness.state.get("fact_traffic").await.as_deref(),
            Some("2024-05-04 09:00:00")
        );

        // The watermark survives a restart via the state file.
        let reopened = JsonStateStore::open(harness.settings.state_file());
        assert_eq!(
            reopened.get("fact_traffic").await.as_deref(),
            Some("2024-05-04 09:00:00")
        );
    }

    #[tokio::test]
    async fn empty_incremental_run_is_a_no_op() {
        let harness = Harness::new(vec![traffic_spec()]);
        harness.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![traffic_row(ts(1, 9), 1, 1, 1)],
        );
        harness.run().await;
        let watermark = harness.state.get("fact_traffic").await;

        // No new rows: the destination and the watermark stay put.
        let summary = harness.run().await;
        assert!(matches!(
            summary.outcomes.get("fact_traffic"),
            Some(TableOutcome::Skipped)
        ));
        assert_eq!(harness.count("SELECT count(*) FROM fact_traffic").await, 1);
        assert_eq!(harness.state.get("fact_traffic").await, watermark);
    }

    #[tokio::test]
    async fn violating_chunk_contributes_nothing_and_lands_in_dead_letter() {
        let harness = Harness::new(vec![stores_spec()]);
        // chunk_size is 2: the first chunk is clean, the second carries a
        // duplicate store_id and must be rejected as a unit.
        harness.source.insert_table(
            "src_stores",
            vec!["id", "name"],
            vec![
                vec![Value::Int(1), Value::String("A".into())],
                vec![Value::Int(2), Value::String("B".into())],
                vec![Value::Int(3), Value::String("C".into())],
                vec![Value::Int(3), Value::String("D".into())],
            ],
        );

        let summary = harness.run().await;
        expect_succeeded(&summary, "dim_stores");

        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 2);
        assert_eq!(
            harness
                .count("SELECT count(*) FROM dim_stores WHERE store_id = 3")
                .await,
            0
        );

        let rejected_dir = harness.settings.rejected_dir().join("dim_stores");
        let files: Vec<_> = std::fs::read_dir(&rejected_dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let contents = std::fs::read_to_string(&files[0]).unwrap();
        // Exactly the duplicated row is attributed; it references id 3.
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("unique"));
        assert!(contents.contains("\"Int\":3"));
    }

    #[tokio::test]
    async fn failed_promotion_leaves_live_table_untouched_and_rerun_recovers() {
        let harness = Harness::new(vec![stores_spec()]);
        harness
            .store
            .execute_batch(
                "CREATE TABLE dim_stores AS SELECT 1 AS store_id, 'Old' AS store_name;",
            )
            .await
            .unwrap();
        // Leftovers from a previously interrupted run.
        harness
            .store
            .execute_batch(
                "CREATE TABLE dim_stores_staging AS SELECT 99 AS store_id, 'X' AS store_name;\n\
                 CREATE TABLE dim_stores_old AS SELECT 98 AS store_id, 'Y' AS store_name;",
            )
            .await
            .unwrap();

        // Bulk load fails (nothing staged on disk): the live table must
        // come through unchanged.
        let missing = harness.settings.staging_dir("dim_stores");
        let result = promote_staged(&harness.store, "dim_stores", &missing, false).await;
        assert!(result.is_err());
        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 1);
        assert_eq!(
            harness
                .count("SELECT count(*) FROM dim_stores WHERE store_name = 'Old'")
                .await,
            1
        );

        // The next run stages real data and promotes without any manual
        // cleanup of the leftover tables.
        let mut writer = StagingWriter::open(
            harness.settings.staging_dir("dim_stores"),
            &stores_spec(),
            HashMap::new(),
        )
        .unwrap();
        let chunk = model::records::chunk::DataChunk::new(
            "dim_stores",
            vec!["store_id".into(), "store_name".into()],
            vec![
                vec![Value::Int(10), Value::String("New A".into())],
                vec![Value::Int(11), Value::String("New B".into())],
            ],
        );
        writer.write_chunk(&chunk).unwrap();
        writer.finish().unwrap();

        promote_staged(
            &harness.store,
            "dim_stores",
            &harness.settings.staging_dir("dim_stores"),
            false,
        )
        .await
        .unwrap();

        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 2);
        assert!(!harness.store.table_exists("dim_stores_old").await.unwrap());
        assert!(!harness
            .store
            .table_exists("dim_stores_staging")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn negative_and_invalid_counters_clamp_to_zero() {
        let harness = Harness::new(vec![traffic_spec()]);
        harness.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![
                vec![
                    Value::Timestamp(ts(1, 9)),
                    Value::Int(-50),
                    Value::String("junk".into()),
                    Value::String("door".into()),
                    Value::Int(1),
                ],
                vec![
                    Value::Timestamp(ts(1, 10)),
                    Value::Null,
                    Value::Int(7),
                    Value::String("door".into()),
                    Value::Int(1),
                ],
            ],
        );

        let summary = harness.run().await;
        expect_succeeded(&summary, "fact_traffic");
        assert_eq!(harness.count("SELECT count(*) FROM fact_traffic").await, 2);
        assert_eq!(
            harness
                .count("SELECT min(visitors_in) FROM fact_traffic")
                .await,
            0
        );
        assert_eq!(
            harness
                .count("SELECT count(*) FROM fact_traffic WHERE visitors_in < 0 OR visitors_out < 0")
                .await,
            0
        );
    }

    #[tokio::test]
    async fn failing_table_is_isolated_from_the_rest_of_the_batch() {
        let harness = Harness::new(vec![stores_spec(), traffic_spec()]);
        harness.seed_stores();
        harness.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![traffic_row(ts(1, 9), 1, 1, 1)],
        );
        // Every extraction attempt for the traffic table fails.
        harness.source.fail_next_opens("traffic_log", usize::MAX);

        let summary = harness.run().await;

        expect_succeeded(&summary, "dim_stores");
        assert!(matches!(
            summary.outcomes.get("fact_traffic"),
            Some(TableOutcome::Failed { .. })
        ));
        assert_eq!(summary.failed_tables(), vec!["fact_traffic"]);

        // Three attempts, then the table is marked failed.
        assert_eq!(harness.source.open_attempts("traffic_log"), 3);

        // The healthy table still committed its run.
        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 3);
        assert!(!harness.store.table_exists("fact_traffic").await.unwrap());
        assert_eq!(harness.state.get("fact_traffic").await, None);
    }

    #[tokio::test]
    async fn transient_failure_recovers_within_retry_budget() {
        let harness = Harness::new(vec![stores_spec()]);
        harness.seed_stores();
        // Two failures, then the source comes back.
        harness.source.fail_next_opens("src_stores", 2);

        let summary = harness.run().await;
        expect_succeeded(&summary, "dim_stores");
        assert_eq!(harness.source.open_attempts("src_stores"), 3);
        assert_eq!(harness.count("SELECT count(*) FROM dim_stores").await, 3);
    }

    #[tokio::test]
    async fn partitioned_staging_uses_hive_layout() {
        let harness = Harness::new(vec![traffic_spec()]);
        harness.source.insert_table(
            "traffic_log",
            TRAFFIC_COLUMNS.to_vec(),
            vec![
                traffic_row(ts(1, 9), 1, 1, 1),
                // June reading lands in its own partition.
                vec![
                    Value::Timestamp(
                        chrono::NaiveDate::from_ymd_opt(2024, 6, 1)
                            .unwrap()
                            .and_hms_opt(9, 0, 0)
                            .unwrap(),
                    ),
                    Value::Int(2),
                    Value::Int(2),
                    Value::String("door".into()),
                    Value::Int(1),
                ],
            ],
        );

        harness.run().await;

        let staging = harness.settings.staging_dir("fact_traffic");
        assert!(staging.join("year=2024").join("month=5").is_dir());
        assert!(staging.join("year=2024").join("month=6").is_dir());
        assert_eq!(
            harness
                .count("SELECT count(DISTINCT month) FROM fact_traffic")
                .await,
            2
        );
    }
}
