pub mod availability;
pub mod log_entry;
pub mod models;
pub mod time_classifier;
