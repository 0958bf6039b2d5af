pub mod registry;
pub mod validator;

use model::core::data_type::DataType;

/// Declared constraints for one destination column.
#[derive(Debug, Clone)]
pub struct ColumnContract {
    pub name: &'static str,
    pub data_type: DataType,
    pub nullable: bool,
    pub unique: bool,
    pub non_negative: bool,
}

impl ColumnContract {
    pub const fn new(name: &'static str, data_type: DataType) -> Self {
        Self {
            name,
            data_type,
            nullable: false,
            unique: false,
            non_negative: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn non_negative(mut self) -> Self {
        self.non_negative = true;
        self
    }
}

/// The data contract one destination table's rows must satisfy: the
/// exact column set with types, nullability, uniqueness and range
/// constraints. Chunks that pass come out matching the contract exactly;
/// chunks that fail are rejected as a unit.
#[derive(Debug, Clone)]
pub struct TableContract {
    pub table: &'static str,
    pub columns: Vec<ColumnContract>,
}

impl TableContract {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.to_string()).collect()
    }
}
