pub mod error;
pub mod offsets;
pub mod settings;
pub mod table_spec;
