use crate::contract::TableContract;
use crate::error::{ContractViolation, FailureCase};
use model::core::value::Value;
use model::records::chunk::DataChunk;
use std::collections::HashMap;

/// Validate one chunk against a table contract.
///
/// The chunk is first narrowed to the contract's column set (unexpected
/// extras are dropped), then every constraint is checked and every
/// failure collected — not just the first — so the rejection record tells
/// the whole story. On success the returned chunk carries the contract's
/// columns in contract order with every cell coerced to its declared
/// type; on failure the chunk is rejected as a unit.
pub fn validate_chunk(
    contract: &TableContract,
    chunk: &DataChunk,
) -> Result<DataChunk, ContractViolation> {
    let mut validated = chunk.clone();
    validated.select_columns(&contract.column_names());

    let mut cases: Vec<FailureCase> = Vec::new();

    for column in &contract.columns {
        if !validated.has_column(column.name) {
            cases.push(FailureCase {
                rule: "column_present".into(),
                column: column.name.into(),
                message: format!("required column '{}' is missing", column.name),
                row_index: None,
            });
        }
    }

    for column in &contract.columns {
        let Some(idx) = validated.column_index(column.name) else {
            continue;
        };

        // Coerce convertible cells in place; record the rest.
        let mut coerced_rows: Vec<(usize, Value)> = Vec::new();
        for (row_index, row) in validated.rows().iter().enumerate() {
            match row[idx].coerce_to(column.data_type) {
                Some(value) => coerced_rows.push((row_index, value)),
                None => cases.push(FailureCase {
                    rule: "coercible".into(),
                    column: column.name.into(),
                    message: format!(
                        "value {:?} is not convertible to {}",
                        row[idx], column.data_type
                    ),
                    row_index: Some(row_index),
                }),
            }
        }
        apply_coercions(&mut validated, column.name, coerced_rows);

        if !column.nullable {
            for (row_index, row) in validated.rows().iter().enumerate() {
                if row[idx].is_null() {
                    cases.push(FailureCase {
                        rule: "not_null".into(),
                        column: column.name.into(),
                        message: format!("column '{}' contains null values", column.name),
                        row_index: Some(row_index),
                    });
                }
            }
        }

        if column.non_negative {
            for (row_index, row) in validated.rows().iter().enumerate() {
                if row[idx].as_f64().is_some_and(|v| v < 0.0) {
                    cases.push(FailureCase {
                        rule: "ge_0".into(),
                        column: column.name.into(),
                        message: format!("column '{}' contains negative values", column.name),
                        row_index: Some(row_index),
                    });
                }
            }
        }

        if column.unique {
            let mut seen: HashMap<Value, usize> = HashMap::new();
            for (row_index, row) in validated.rows().iter().enumerate() {
                if row[idx].is_null() {
                    continue;
                }
                if let Some(first) = seen.insert(row[idx].clone(), row_index) {
                    cases.push(FailureCase {
                        rule: "unique".into(),
                        column: column.name.into(),
                        message: format!(
                            "column '{}' repeats value {:?} (first seen at row {first})",
                            column.name, row[idx]
                        ),
                        row_index: Some(row_index),
                    });
                }
            }
        }
    }

    if cases.is_empty() {
        Ok(validated)
    } else {
        Err(ContractViolation {
            table: contract.table.to_string(),
            cases,
        })
    }
}

fn apply_coercions(chunk: &mut DataChunk, column: &str, coerced: Vec<(usize, Value)>) {
    let mut by_row: HashMap<usize, Value> = coerced.into_iter().collect();
    let mut row_index = 0;
    chunk.map_column(column, |value| {
        if let Some(new_value) = by_row.remove(&row_index) {
            *value = new_value;
        }
        row_index += 1;
    });
}
