pub mod migration_job_repository;

pub use migration_job_repository::{
    page_window, ErrorRecordListParams, MigrationJobListParams, MigrationJobRepository,
    DEFAULT_PAGE_SIZE,
};
