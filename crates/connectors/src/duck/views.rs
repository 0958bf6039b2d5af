use crate::duck::store::AnalyticsStore;
use crate::error::SwapError;
use tracing::info;

/// Parameters for the normalized traffic view: outlier readings above the
/// threshold are either scaled down or collapsed to 1, and the business
/// day is shifted so it starts at 00:00.
#[derive(Debug, Clone, Copy)]
pub struct TrafficViewParams {
    pub outlier_threshold: i64,
    pub outlier_scale_ratio: f64,
    pub working_hour_start: i64,
}

/// (Re)create the `v_traffic_normalized` derived view used by the
/// serving layer.
pub async fn create_traffic_view(
    store: &AnalyticsStore,
    params: TrafficViewParams,
) -> Result<(), SwapError> {
    let scaled_in = scaled_counter("a.visitors_in", params.outlier_scale_ratio);
    let scaled_out = scaled_counter("a.visitors_out", params.outlier_scale_ratio);

    let sql = format!(
        "CREATE OR REPLACE VIEW v_traffic_normalized AS\n\
         SELECT\n\
             CAST(a.recorded_at AS TIMESTAMP) AS record_time,\n\
             b.store_name,\n\
             CASE\n\
                 WHEN a.visitors_in > {threshold} THEN {scaled_in}\n\
                 ELSE a.visitors_in\n\
             END AS in_count,\n\
             CASE\n\
                 WHEN a.visitors_out > {threshold} THEN {scaled_out}\n\
                 ELSE a.visitors_out\n\
             END AS out_count,\n\
             (record_time - INTERVAL '{shift} hours') AS adjusted_time\n\
         FROM fact_traffic AS a\n\
         LEFT JOIN dim_stores AS b ON a.store_id = b.store_id;",
        threshold = params.outlier_threshold,
        shift = params.working_hour_start,
    );

    store.execute_batch(&sql).await?;
    info!("view 'v_traffic_normalized' created/updated");
    Ok(())
}

/// Replacement expression for an outlier counter: scale and round when a
/// ratio is configured, otherwise collapse to 1.
fn scaled_counter(column: &str, scale_ratio: f64) -> String {
    if scale_ratio > 0.0 {
        format!("CAST(ROUND({column} * {scale_ratio}, 0) AS INTEGER)")
    } else {
        "1".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_scale_collapses_outliers_to_one() {
        assert_eq!(scaled_counter("a.visitors_in", 0.0), "1");
        assert_eq!(
            scaled_counter("a.visitors_in", 0.00001),
            "CAST(ROUND(a.visitors_in * 0.00001, 0) AS INTEGER)"
        );
    }
}
