use crate::contract::{ColumnContract, TableContract};
use lazy_static::lazy_static;
use model::core::data_type::DataType;
use std::collections::HashMap;

lazy_static! {
    static ref CONTRACTS: HashMap<&'static str, TableContract> = build_contracts();
}

/// Contract for a destination table, if one is declared. Tables without a
/// contract skip validation (logged by the caller).
pub fn contract_for(dest_table: &str) -> Option<&'static TableContract> {
    CONTRACTS.get(dest_table)
}

fn build_contracts() -> HashMap<&'static str, TableContract> {
    let mut contracts = HashMap::new();

    contracts.insert(
        "dim_stores",
        TableContract {
            table: "dim_stores",
            columns: vec![
                ColumnContract::new("store_id", DataType::Int).unique(),
                ColumnContract::new("store_name", DataType::String),
            ],
        },
    );

    contracts.insert(
        "fact_traffic",
        TableContract {
            table: "fact_traffic",
            columns: vec![
                ColumnContract::new("recorded_at", DataType::Timestamp),
                ColumnContract::new("visitors_in", DataType::Int).non_negative(),
                ColumnContract::new("visitors_out", DataType::Int).non_negative(),
                ColumnContract::new("device_position", DataType::String).nullable(),
                ColumnContract::new("store_id", DataType::Int),
                ColumnContract::new("year", DataType::Int),
                ColumnContract::new("month", DataType::Int),
            ],
        },
    );

    contracts.insert(
        "fact_errors",
        TableContract {
            table: "fact_errors",
            columns: vec![
                ColumnContract::new("log_id", DataType::Int).unique(),
                ColumnContract::new("store_id", DataType::Int),
                ColumnContract::new("device_code", DataType::Int).nullable(),
                ColumnContract::new("logged_at", DataType::Timestamp),
                ColumnContract::new("error_code", DataType::Int).nullable(),
                ColumnContract::new("error_message", DataType::String).nullable(),
                ColumnContract::new("year", DataType::Int),
                ColumnContract::new("month", DataType::Int),
            ],
        },
    );

    contracts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tables_have_contracts() {
        assert!(contract_for("dim_stores").is_some());
        assert!(contract_for("fact_traffic").is_some());
        assert!(contract_for("fact_errors").is_some());
        assert!(contract_for("fact_unknown").is_none());
    }

    #[test]
    fn traffic_counters_are_non_negative() {
        let contract = contract_for("fact_traffic").unwrap();
        let visitors_in = contract
            .columns
            .iter()
            .find(|c| c.name == "visitors_in")
            .unwrap();
        assert!(visitors_in.non_negative);
        assert!(!visitors_in.nullable);
    }
}
