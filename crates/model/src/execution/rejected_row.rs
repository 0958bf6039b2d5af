use crate::core::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A row that failed data-contract validation, persisted to the
/// dead-letter sink for offline inspection. Never read back by the
/// pipeline itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedRow {
    pub id: String,
    pub table: String,
    pub stage: ProcessingStage,
    pub rule: String,
    pub message: String,
    pub original_data: HashMap<String, Value>,
    pub run_id: String,
    pub rejected_at: DateTime<Utc>,
}

/// The pipeline stage where the rejection occurred.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStage {
    Extract,
    Transform,
    Validation,
    Load,
}

impl RejectedRow {
    pub fn new(
        table: impl Into<String>,
        stage: ProcessingStage,
        rule: impl Into<String>,
        message: impl Into<String>,
        original_data: HashMap<String, Value>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            table: table.into(),
            stage,
            rule: rule.into(),
            message: message.into(),
            original_data,
            run_id: run_id.into(),
            rejected_at: Utc::now(),
        }
    }
}

impl fmt::Display for ProcessingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessingStage::Extract => write!(f, "extract"),
            ProcessingStage::Transform => write!(f, "transform"),
            ProcessingStage::Validation => write!(f, "validation"),
            ProcessingStage::Load => write!(f, "load"),
        }
    }
}
