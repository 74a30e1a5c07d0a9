pub mod execute_migration;
pub mod get_migration;
pub mod list_migration_errors;
pub mod list_migrations;
pub mod pause_migration;
pub mod recover_migrations;
pub mod resolve_migration_error;
pub mod restart_migration;
pub mod rollback_migration;
pub mod start_migration;
pub mod submit_migration;

pub use execute_migration::ExecuteMigrationUseCase;
pub use get_migration::GetMigrationUseCase;
pub use list_migration_errors::ListMigrationErrorsUseCase;
pub use list_migrations::ListMigrationsUseCase;
pub use pause_migration::{PauseMigrationError, PauseMigrationUseCase};
pub use recover_migrations::{RecoverMigrationsUseCase, RecoveryReport};
pub use resolve_migration_error::{ResolveMigrationErrorError, ResolveMigrationErrorUseCase};
pub use restart_migration::{RestartMigrationError, RestartMigrationUseCase};
pub use rollback_migration::{RollbackMigrationError, RollbackMigrationUseCase};
pub use start_migration::{StartMigrationError, StartMigrationUseCase};
pub use submit_migration::{SubmitMigrationError, SubmitMigrationInput, SubmitMigrationUseCase};
