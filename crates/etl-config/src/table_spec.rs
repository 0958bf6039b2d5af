use crate::error::ConfigError;
use model::core::identifier::ensure_identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable per-table ETL configuration.
///
/// One spec describes the full journey of one table: where it is read
/// from, how its columns are renamed and cleaned, how it is partitioned in
/// the staging area, and whether extraction is incremental.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub source_table: String,
    pub dest_table: String,
    #[serde(default = "default_incremental")]
    pub incremental: bool,
    #[serde(default)]
    pub description: Option<String>,
    /// Lower runs first. Display/determinism only, not a dependency graph.
    #[serde(default = "default_processing_order")]
    pub processing_order: u32,
    /// source column name → destination column name. Also acts as the
    /// extraction column allow-list when non-empty.
    #[serde(default)]
    pub rename_map: BTreeMap<String, String>,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub cleaning_rules: Vec<CleaningRule>,
    pub timestamp_column: Option<String>,
}

fn default_incremental() -> bool {
    true
}

fn default_processing_order() -> u32 {
    99
}

/// A cleaning rule applied during the rename/clean transform stage.
/// `column` refers to the source column name (pre-rename).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningRule {
    pub column: String,
    pub action: CleaningAction,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CleaningAction {
    /// Trim leading/trailing whitespace on string-typed columns.
    Strip,
}

impl TableSpec {
    /// Fail-fast validation, run once at configuration load.
    ///
    /// Rejects incremental specs without a timestamp column and any
    /// configured name that would not survive the identifier allow-list —
    /// query generation downstream relies on both.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.incremental
            && self
                .timestamp_column
                .as_deref()
                .is_none_or(|c| c.is_empty())
        {
            return Err(ConfigError::InvalidTableSpec {
                table: self.source_table.clone(),
                message: "'timestamp_column' is required when 'incremental' is enabled".into(),
            });
        }

        let mut names: Vec<&str> = vec![&self.source_table, &self.dest_table];
        if let Some(ts) = self.timestamp_column.as_deref() {
            names.push(ts);
        }
        names.extend(self.rename_map.keys().map(String::as_str));
        names.extend(self.rename_map.values().map(String::as_str));
        names.extend(self.partition_columns.iter().map(String::as_str));
        names.extend(self.cleaning_rules.iter().map(|r| r.column.as_str()));

        for name in names {
            ensure_identifier(name).map_err(|source| ConfigError::UnsafeIdentifier {
                table: self.source_table.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// The timestamp column as it is named after the rename stage.
    pub fn final_timestamp_column(&self) -> Option<&str> {
        let ts = self.timestamp_column.as_deref()?;
        Some(self.rename_map.get(ts).map(String::as_str).unwrap_or(ts))
    }

    /// The source-table key used to look up time offsets: the last dotted
    /// segment, so `dbo.traffic_log` and `traffic_log` share one entry.
    pub fn offset_key(&self) -> &str {
        self.source_table
            .rsplit('.')
            .next()
            .unwrap_or(&self.source_table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TableSpec {
        TableSpec {
            source_table: "dbo.traffic_log".into(),
            dest_table: "fact_traffic".into(),
            incremental: true,
            description: None,
            processing_order: 1,
            rename_map: BTreeMap::from([
                ("record_time".to_string(), "recorded_at".to_string()),
                ("in_num".to_string(), "visitors_in".to_string()),
            ]),
            partition_columns: vec!["year".into(), "month".into()],
            cleaning_rules: vec![CleaningRule {
                column: "position".into(),
                action: CleaningAction::Strip,
            }],
            timestamp_column: Some("record_time".into()),
        }
    }

    #[test]
    fn incremental_requires_timestamp_column() {
        let mut bad = spec();
        bad.timestamp_column = None;
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::InvalidTableSpec { .. })
        ));

        bad.incremental = false;
        assert!(bad.validate().is_ok());
    }

    #[test]
    fn unsafe_identifiers_are_rejected() {
        let mut bad = spec();
        bad.rename_map
            .insert("x; DROP TABLE y".into(), "x".into());
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::UnsafeIdentifier { .. })
        ));
    }

    #[test]
    fn final_timestamp_column_follows_rename() {
        assert_eq!(spec().final_timestamp_column(), Some("recorded_at"));

        let mut unrenamed = spec();
        unrenamed.rename_map.remove("record_time");
        assert_eq!(unrenamed.final_timestamp_column(), Some("record_time"));
    }

    #[test]
    fn offset_key_strips_schema() {
        assert_eq!(spec().offset_key(), "traffic_log");
    }

    #[test]
    fn yaml_defaults_apply() {
        let yaml = r#"
source_table: dbo.stores
dest_table: dim_stores
incremental: false
rename_map:
  id: store_id
  name: store_name
"#;
        let spec: TableSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(!spec.incremental);
        assert_eq!(spec.processing_order, 99);
        assert!(spec.partition_columns.is_empty());
        assert!(spec.validate().is_ok());
    }
}
