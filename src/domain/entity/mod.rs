pub mod audit;
pub mod file_type;
pub mod migration_error;
pub mod migration_job;
pub mod record_error;
