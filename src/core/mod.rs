pub mod errors;
pub mod lock_stats;
pub mod name;
pub mod value;
