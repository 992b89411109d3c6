//! Task Lifecycle Tests
//!
//! Exercises creation (with artifact persistence), claim gating, the status
//! machine, and cascade deletion against a real temporary directory.

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::liveness::tracker::HeartbeatTracker;
    use crate::store::memory::MarketStore;
    use crate::tasks::service::{CreateTaskInput, TaskError, TaskService};
    use crate::tasks::types::*;
    use crate::wallet::types::Credits;
    use std::sync::Arc;

    struct TestEnv {
        store: Arc<MarketStore>,
        tracker: Arc<HeartbeatTracker>,
        tasks: Arc<TaskService>,
        _tmp: tempfile::TempDir,
    }

    fn build_env() -> TestEnv {
        let tmp = tempfile::tempdir().expect("temp dir");
        let config = Arc::new(Config {
            data_dir: tmp.path().to_path_buf(),
            ..Config::default()
        });
        let store = MarketStore::new();
        let tracker = HeartbeatTracker::new(config.worker_timeout_ms);
        let tasks = TaskService::new(store.clone(), config, tracker.clone());
        TestEnv {
            store,
            tracker,
            tasks,
            _tmp: tmp,
        }
    }

    fn basic_input(items: usize) -> CreateTaskInput {
        CreateTaskInput {
            name: "resize-images".to_string(),
            capability_required: "image".to_string(),
            cost_per_bucket: Credits::from_major(2.0),
            max_billable_buckets: 5,
            platform_fee_percent: Some(10.0),
            max_buckets: Some(5),
            max_bucket_bytes: None,
            code_archive: b"fake-archive".to_vec(),
            data_items: (0..items).map(|n| serde_json::json!(n)).collect(),
        }
    }

    // ============================================================
    // TEST 1: Creation and validation
    // ============================================================

    #[tokio::test]
    async fn test_create_task_persists_artifacts() {
        let env = build_env();

        let task = env
            .tasks
            .create_task("customer", basic_input(10))
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.total_items, 10);
        assert_eq!(task.budget.budget_total, Credits::from_major(10.0));

        let dir = std::path::Path::new(&task.data_items_ref);
        assert!(dir.join("code.bin").exists());
        assert!(dir.join("data.json").exists());
    }

    #[tokio::test]
    async fn test_create_task_rejects_missing_code_archive() {
        let env = build_env();
        let mut input = basic_input(2);
        input.code_archive.clear();

        let result = env.tasks.create_task("customer", input).await;
        assert!(matches!(result, Err(TaskError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_task_rejects_bad_budget() {
        let env = build_env();

        let mut input = basic_input(2);
        input.cost_per_bucket = Credits::ZERO;
        assert!(matches!(
            env.tasks.create_task("customer", input).await,
            Err(TaskError::Validation(_))
        ));

        let mut input = basic_input(2);
        input.max_billable_buckets = 0;
        assert!(matches!(
            env.tasks.create_task("customer", input).await,
            Err(TaskError::Validation(_))
        ));

        let mut input = basic_input(2);
        input.platform_fee_percent = Some(120.0);
        assert!(matches!(
            env.tasks.create_task("customer", input).await,
            Err(TaskError::Validation(_))
        ));
    }

    // ============================================================
    // TEST 2: Claim gating and the status machine
    // ============================================================

    #[tokio::test]
    async fn test_claim_requires_recent_heartbeat() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();

        let offline = env.tasks.claim(&task.id.0, "w1").await;
        assert!(matches!(offline, Err(TaskError::WorkerOffline)));

        env.tracker.heartbeat("w1");
        let claimed = env.tasks.claim(&task.id.0, "w1").await.unwrap();
        assert!(claimed.assigned_workers.contains("w1"));
        assert_eq!(claimed.status, TaskStatus::Processing);
    }

    #[tokio::test]
    async fn test_claim_refused_while_revoked() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();

        env.tasks.revoke(&task.id.0, "customer").await.unwrap();

        env.tracker.heartbeat("w1");
        let result = env.tasks.claim(&task.id.0, "w1").await;
        assert!(matches!(result, Err(TaskError::Revoked)));

        // Reinvoke re-enables claims.
        env.tasks.reinvoke(&task.id.0, "customer").await.unwrap();
        assert!(env.tasks.claim(&task.id.0, "w1").await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_releases_worker_leases() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();
        env.tracker.heartbeat("w1");
        env.tasks.claim(&task.id.0, "w1").await.unwrap();

        let now = now_ms();
        env.store.chunk_assignments.insert(
            (task.id.0.clone(), 0),
            BucketAssignment {
                task_id: task.id.clone(),
                bucket_index: 0,
                worker_id: "w1".to_string(),
                assigned_at: now,
                expires_at: now + 60_000,
                range_start: 0,
                range_end: 2,
                processed_count: 0,
                progress_range_end: 0,
                bytes_used: 2,
                last_batch_offset: 0,
                last_batch_size: 0,
                updated_at: now,
            },
        );

        let task = env.tasks.drop_worker(&task.id.0, "w1").await.unwrap();
        assert!(!task.assigned_workers.contains("w1"));
        assert!(env.store.assignments_for_task(&task.id.0).is_empty());
    }

    #[tokio::test]
    async fn test_revoke_clears_workers_and_leases_but_keeps_results() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();
        env.tracker.heartbeat("w1");
        env.tasks.claim(&task.id.0, "w1").await.unwrap();

        let now = now_ms();
        env.store.chunk_results.insert(
            (task.id.0.clone(), 0),
            BucketResult {
                task_id: task.id.clone(),
                bucket_index: 0,
                range_start: 0,
                range_end: 2,
                items_count: 2,
                status: BucketStatus::Completed,
                processed_items: 2,
                bytes_used: 2,
                worker_id: "w1".to_string(),
                item_results: vec![],
                item_results_total: 0,
                item_results_truncated: false,
                output: None,
                error: None,
                payout_issued: false,
                payout_at: None,
                created_at: now,
                updated_at: now,
            },
        );

        let task = env.tasks.revoke(&task.id.0, "customer").await.unwrap();
        assert!(task.revoked);
        assert!(task.assigned_workers.is_empty());
        assert!(env.store.assignments_for_task(&task.id.0).is_empty());
        assert_eq!(env.store.results_for_task(&task.id.0).len(), 1);
    }

    #[tokio::test]
    async fn test_only_creator_may_revoke_or_delete() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();

        assert!(matches!(
            env.tasks.revoke(&task.id.0, "stranger").await,
            Err(TaskError::NotCreator)
        ));
        assert!(matches!(
            env.tasks.delete(&task.id.0, "stranger").await,
            Err(TaskError::NotCreator)
        ));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_removes_artifacts() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();
        let dir = std::path::PathBuf::from(&task.data_items_ref);
        assert!(dir.exists());

        env.tasks.delete(&task.id.0, "customer").await.unwrap();

        assert!(env.tasks.get(&task.id.0).is_none());
        assert!(!dir.exists());
    }

    // ============================================================
    // TEST 3: Derived progress
    // ============================================================

    #[tokio::test]
    async fn test_progress_is_derived_from_results() {
        let env = build_env();
        let task = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();

        let now = now_ms();
        env.store.chunk_results.insert(
            (task.id.0.clone(), 0),
            BucketResult {
                task_id: task.id.clone(),
                bucket_index: 0,
                range_start: 0,
                range_end: 2,
                items_count: 2,
                status: BucketStatus::Completed,
                processed_items: 2,
                bytes_used: 2,
                worker_id: "w1".to_string(),
                item_results: vec![],
                item_results_total: 0,
                item_results_truncated: false,
                output: None,
                error: None,
                payout_issued: true,
                payout_at: Some(now),
                created_at: now,
                updated_at: now,
            },
        );

        let view = env.tasks.project(&env.tasks.get(&task.id.0).unwrap());
        assert_eq!(view.processed_buckets, 1);
        assert_eq!(view.processed_items, 2);
        assert_eq!(view.progress, 50);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let env = build_env();
        env.tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();
        let second = env
            .tasks
            .create_task("customer", basic_input(4))
            .await
            .unwrap();
        env.tracker.heartbeat("w1");
        env.tasks.claim(&second.id.0, "w1").await.unwrap();

        assert_eq!(env.tasks.list(None).len(), 2);
        assert_eq!(env.tasks.list(Some(TaskStatus::Queued)).len(), 1);
        assert_eq!(env.tasks.list(Some(TaskStatus::Processing)).len(), 1);
        assert!(env.tasks.list(Some(TaskStatus::Completed)).is_empty());
    }
}
