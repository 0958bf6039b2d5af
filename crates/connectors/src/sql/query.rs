use etl_config::table_spec::TableSpec;
use tracing::warn;

/// A rendered extraction query. `incremental` tells the caller whether
/// the statement expects the watermark as parameter `$1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub sql: String,
    pub incremental: bool,
}

/// Source columns to extract: the rename-map keys plus the timestamp
/// column when it is not already among them. An empty rename map falls
/// back to every column.
pub fn source_columns(spec: &TableSpec) -> Vec<String> {
    let mut columns: Vec<String> = spec.rename_map.keys().cloned().collect();
    if let Some(ts) = spec.timestamp_column.as_deref() {
        if !columns.iter().any(|c| c == ts) {
            columns.push(ts.to_string());
        }
    }
    columns
}

/// Render the extraction SELECT for one table.
///
/// Every identifier in the statement comes from the table spec, which was
/// validated against the identifier allow-list at configuration load; the
/// watermark itself is always a bound parameter, never spliced in.
pub fn build_select(spec: &TableSpec) -> SelectQuery {
    let columns = source_columns(spec);
    let selection = if columns.is_empty() {
        warn!(
            "table '{}': rename_map is empty, selecting all columns",
            spec.source_table
        );
        "*".to_string()
    } else {
        columns.join(", ")
    };

    let mut sql = format!("SELECT {selection} FROM {}", spec.source_table);

    let incremental = spec.incremental && spec.timestamp_column.is_some();
    if incremental {
        let ts = spec.timestamp_column.as_deref().unwrap_or_default();
        sql.push_str(&format!(" WHERE {ts} > $1 ORDER BY {ts}"));
    }

    SelectQuery { sql, incremental }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec(incremental: bool) -> TableSpec {
        TableSpec {
            source_table: "dbo.traffic_log".into(),
            dest_table: "fact_traffic".into(),
            incremental,
            description: None,
            processing_order: 1,
            rename_map: BTreeMap::from([
                ("in_num".to_string(), "visitors_in".to_string()),
                ("record_time".to_string(), "recorded_at".to_string()),
                ("storeid".to_string(), "store_id".to_string()),
            ]),
            partition_columns: vec![],
            cleaning_rules: vec![],
            timestamp_column: if incremental {
                Some("record_time".into())
            } else {
                None
            },
        }
    }

    #[test]
    fn incremental_select_filters_and_orders() {
        let query = build_select(&spec(true));
        assert!(query.incremental);
        assert_eq!(
            query.sql,
            "SELECT in_num, record_time, storeid FROM dbo.traffic_log \
             WHERE record_time > $1 ORDER BY record_time"
        );
    }

    #[test]
    fn full_select_has_no_filter() {
        let query = build_select(&spec(false));
        assert!(!query.incremental);
        assert_eq!(
            query.sql,
            "SELECT in_num, record_time, storeid FROM dbo.traffic_log"
        );
    }

    #[test]
    fn timestamp_column_is_added_once() {
        let mut with_ts_in_map = spec(true);
        with_ts_in_map
            .rename_map
            .insert("record_time".to_string(), "recorded_at".to_string());
        let columns = source_columns(&with_ts_in_map);
        assert_eq!(
            columns.iter().filter(|c| c.as_str() == "record_time").count(),
            1
        );
    }

    #[test]
    fn empty_rename_map_selects_star() {
        let mut bare = spec(false);
        bare.rename_map.clear();
        let query = build_select(&bare);
        assert_eq!(query.sql, "SELECT * FROM dbo.traffic_log");
    }
}
