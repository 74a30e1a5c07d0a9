//! PostgreSQLリポジトリ統合テスト
//! 実行には PostgreSQL が必要:
//!   DATABASE_URL="postgres://..." cargo test -- --ignored
//!
//! テスト対象: MigrationJobPostgresRepository の CRUD 操作、チェックポイント保存の原子性、claim の排他性。
//! data_migration スキーマは migrations/ のマイグレーションで作成する。

#[cfg(test)]
mod tests {
    use k1s0_data_migration::adapter::repository::MigrationJobPostgresRepository;
    use k1s0_data_migration::domain::entity::file_type::FileType;
    use k1s0_data_migration::domain::entity::migration_error::MigrationErrorRecord;
    use k1s0_data_migration::domain::entity::migration_job::{
        JobStatus, MigrationJob, NewMigrationJob,
    };
    use k1s0_data_migration::domain::entity::record_error::RecordError;
    use k1s0_data_migration::domain::repository::{
        ErrorRecordListParams, MigrationJobListParams, MigrationJobRepository,
    };
    use k1s0_data_migration::infrastructure::database;

    async fn make_repo() -> MigrationJobPostgresRepository {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        MigrationJobPostgresRepository::new(pool)
    }

    fn make_job(node: &str) -> MigrationJob {
        MigrationJob::new(NewMigrationJob {
            original_file_name: "contracts.csv".to_string(),
            staged_file_path: "/staging/contracts.csv".to_string(),
            file_size: 128,
            file_checksum: Some("ab".repeat(32)),
            file_type: FileType::DelimitedText,
            source_system: "legacy-core".to_string(),
            target_entity: "contract".to_string(),
            initiated_by: "operator-1".to_string(),
            processing_node: Some(node.to_string()),
            import_config: "{}".to_string(),
            validation_rules: "{}".to_string(),
            batch_size: 4,
            max_retries: 3,
            rollback_window: chrono::Duration::days(30),
        })
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_create_and_find_job() {
        let repo = make_repo().await;
        let job = make_job("pg-node-1");
        repo.create(&job).await.unwrap();

        let found = repo.find_by_job_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.file_type, FileType::DelimitedText);
        assert_eq!(found.batch_size, 4);
        assert!(repo.create(&job).await.is_err());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_save_checkpoint_atomicity() {
        let repo = make_repo().await;
        let mut job = make_job("pg-node-1");
        repo.create(&job).await.unwrap();
        job.begin_validation().unwrap();
        job.begin_processing(10).unwrap();
        repo.update(&job).await.unwrap();

        job.apply_batch(4, 3, 1);
        let error = MigrationErrorRecord::from_record_error(
            &job.job_id,
            2,
            "2,,x",
            &RecordError::invalid_input("policy_no is empty"),
        );
        repo.save_checkpoint(&job, &[error]).await.unwrap();

        let found = repo.find_by_job_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found.checkpoint_position, 4);
        assert_eq!(found.failed_records, 1);
        let (errors, total) = repo
            .find_errors(&job.job_id, &ErrorRecordListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(errors[0].record_offset, 2);

        // 後退するチェックポイントは拒否され、エラーレコードも保存されない
        let mut stale = job.clone();
        stale.checkpoint_position = 0;
        let stale_error = MigrationErrorRecord::from_record_error(
            &job.job_id,
            0,
            "0,,x",
            &RecordError::Format("bad".to_string()),
        );
        assert!(repo.save_checkpoint(&stale, &[stale_error]).await.is_err());
        assert_eq!(repo.find_all_errors(&job.job_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_claim_is_exclusive() {
        let repo = make_repo().await;
        let job = make_job("pg-node-1");
        repo.create(&job).await.unwrap();

        let first = repo
            .claim(&job.job_id, &[JobStatus::Pending], &JobStatus::Validating, "pg-node-1")
            .await
            .unwrap();
        let second = repo
            .claim(&job.job_id, &[JobStatus::Pending], &JobStatus::Validating, "pg-node-2")
            .await
            .unwrap();
        assert!(first);
        assert!(!second);

        let found = repo.find_by_job_id(&job.job_id).await.unwrap().unwrap();
        assert_eq!(found.processing_node.as_deref(), Some("pg-node-1"));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_find_active_by_node_and_list() {
        let repo = make_repo().await;
        let node = format!("pg-node-{}", uuid::Uuid::new_v4().simple());
        let mut running = make_job(&node);
        repo.create(&running).await.unwrap();
        running.begin_validation().unwrap();
        running.begin_processing(10).unwrap();
        repo.update(&running).await.unwrap();
        let pending = make_job(&node);
        repo.create(&pending).await.unwrap();

        let active = repo.find_active_by_node(&node).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].job_id, running.job_id);

        let (jobs, total) = repo
            .list(&MigrationJobListParams {
                status: Some(JobStatus::InProgress),
                page: 1,
                page_size: 100,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(total >= 1);
        assert!(jobs.iter().all(|j| j.status == JobStatus::InProgress));
    }
}
