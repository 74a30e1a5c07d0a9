pub mod config;
pub mod database;
pub mod error_report;
pub mod file_stage;
pub mod metrics;
pub mod pause_signal;
pub mod record_processor;
pub mod telemetry;
pub mod validation_rules;
pub mod worker_pool;
