use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transformation failed: {0}")]
    Transformation(String),
}

/// A chunk-level data-contract failure. Carries every failure case found
/// in the chunk, not just the first, so the dead-letter record explains
/// the rejection fully.
#[derive(Debug, Error)]
#[error("contract validation for '{table}' failed with {} case(s)", .cases.len())]
pub struct ContractViolation {
    pub table: String,
    pub cases: Vec<FailureCase>,
}

/// One violated constraint, optionally pinned to a row.
#[derive(Debug, Clone)]
pub struct FailureCase {
    pub rule: String,
    pub column: String,
    pub message: String,
    pub row_index: Option<usize>,
}

impl ContractViolation {
    /// Distinct violating row indices, ascending. Structural failures
    /// (e.g. a missing column) have no row attribution.
    pub fn violating_rows(&self) -> Vec<usize> {
        let mut rows: Vec<usize> = self.cases.iter().filter_map(|c| c.row_index).collect();
        rows.sort_unstable();
        rows.dedup();
        rows
    }

    /// Distinct rule/column summaries, for logging and run reports.
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .cases
            .iter()
            .map(|c| format!("{}({})", c.rule, c.column))
            .collect();
        reasons.sort();
        reasons.dedup();
        reasons
    }

    /// Cases attributed to one row.
    pub fn cases_for_row(&self, row_index: usize) -> Vec<&FailureCase> {
        self.cases
            .iter()
            .filter(|c| c.row_index == Some(row_index))
            .collect()
    }
}
