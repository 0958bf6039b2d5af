use crate::error::TransformError;
use crate::transform::pipeline::ChunkTransform;
use etl_config::table_spec::{CleaningAction, CleaningRule, TableSpec};
use model::core::value::Value;
use model::records::chunk::DataChunk;
use std::collections::HashMap;

/// Applies the configured column renames, then the cleaning rules.
/// Cleaning rules name source columns; the lookup goes through the rename
/// map so the rule still lands after renaming. `strip` only touches
/// string-typed cells — numeric columns are left alone even if targeted.
pub struct RenameClean {
    rename_map: HashMap<String, String>,
    rules: Vec<CleaningRule>,
}

impl RenameClean {
    pub fn for_table(spec: &TableSpec) -> Self {
        Self {
            rename_map: spec
                .rename_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            rules: spec.cleaning_rules.clone(),
        }
    }
}

impl ChunkTransform for RenameClean {
    fn name(&self) -> &'static str {
        "rename_clean"
    }

    fn apply(&self, mut chunk: DataChunk) -> Result<DataChunk, TransformError> {
        chunk.rename_columns(&self.rename_map);

        for rule in &self.rules {
            let column = self
                .rename_map
                .get(&rule.column)
                .map(String::as_str)
                .unwrap_or(&rule.column);

            match rule.action {
                CleaningAction::Strip => {
                    chunk.map_column(column, |value| {
                        if let Value::String(s) = value {
                            let trimmed = s.trim().to_string();
                            if trimmed.len() != s.len() {
                                *s = trimmed;
                            }
                        }
                    });
                }
            }
        }
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn spec() -> TableSpec {
        TableSpec {
            source_table: "dbo.stores".into(),
            dest_table: "dim_stores".into(),
            incremental: false,
            description: None,
            processing_order: 1,
            rename_map: BTreeMap::from([
                ("id".to_string(), "store_id".to_string()),
                ("name".to_string(), "store_name".to_string()),
            ]),
            partition_columns: vec![],
            cleaning_rules: vec![CleaningRule {
                column: "name".into(),
                action: CleaningAction::Strip,
            }],
            timestamp_column: None,
        }
    }

    #[test]
    fn renames_then_strips_through_the_map() {
        let stage = RenameClean::for_table(&spec());
        let chunk = DataChunk::new(
            "dim_stores",
            vec!["id".into(), "name".into()],
            vec![vec![Value::Int(1), Value::String("  Downtown  ".into())]],
        );

        let out = stage.apply(chunk).unwrap();
        assert_eq!(out.columns(), &["store_id".to_string(), "store_name".to_string()]);
        assert_eq!(out.rows()[0][1], Value::String("Downtown".into()));
    }

    #[test]
    fn strip_ignores_non_string_cells() {
        let mut spec = spec();
        spec.cleaning_rules = vec![CleaningRule {
            column: "id".into(),
            action: CleaningAction::Strip,
        }];
        let stage = RenameClean::for_table(&spec);
        let chunk = DataChunk::new(
            "dim_stores",
            vec!["id".into(), "name".into()],
            vec![vec![Value::Int(1), Value::String(" x ".into())]],
        );

        let out = stage.apply(chunk).unwrap();
        assert_eq!(out.rows()[0][0], Value::Int(1));
        // Only the targeted column is cleaned.
        assert_eq!(out.rows()[0][1], Value::String(" x ".into()));
    }
}
