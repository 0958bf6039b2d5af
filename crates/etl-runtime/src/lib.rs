pub mod error;
pub mod executor;
pub mod notify;
pub mod staging;
pub mod summary;
pub mod table_run;
