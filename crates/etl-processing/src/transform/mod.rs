pub mod normalize;
pub mod pipeline;
pub mod rename_clean;
pub mod time_offset;

/// Source column carrying the store identifier, used to key the
/// per-store time offsets before any renaming happens.
pub const STORE_ID_COLUMN: &str = "storeid";

/// Source column names of the visitor counters subject to the
/// non-negative clamp.
pub const COUNTER_COLUMNS: [&str; 2] = ["in_num", "out_num"];
