pub mod outcome;
pub mod rejected_row;
