use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column types moved through the pipeline.
///
/// The source database exposes a much richer type zoo; everything is
/// narrowed to this set at decode time so the transform stages and the
/// data contracts only ever reason about one vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DataType {
    Int,
    Float,
    String,
    Boolean,
    Date,
    Timestamp,
    Null,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Date => "date",
            DataType::Timestamp => "timestamp",
            DataType::Null => "null",
        };
        write!(f, "{name}")
    }
}
