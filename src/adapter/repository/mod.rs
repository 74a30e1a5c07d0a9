pub mod migration_job_in_memory;
pub mod migration_job_postgres;

pub use migration_job_in_memory::InMemoryMigrationJobRepository;
pub use migration_job_postgres::MigrationJobPostgresRepository;
