pub mod analytics;
pub mod batches;
pub mod core;
pub mod exchange;
pub mod setup;
pub mod students;
pub mod subjects;
