//! Task Lifecycle Service
//!
//! Every mutation here runs under the task's writer lock so planner,
//! allocator, and aggregator never observe a half-applied lifecycle change.

use super::protocol::TaskView;
use super::types::*;
use crate::config::Config;
use crate::liveness::tracker::HeartbeatTracker;
use crate::store::memory::MarketStore;
use crate::wallet::types::Credits;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task not found: {0}")]
    NotFound(String),
    #[error("only the task creator may do this")]
    NotCreator,
    #[error("task is revoked")]
    Revoked,
    #[error("worker has no recent heartbeat")]
    WorkerOffline,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Validated input assembled from the multipart upload.
pub struct CreateTaskInput {
    pub name: String,
    pub capability_required: String,
    pub cost_per_bucket: Credits,
    pub max_billable_buckets: u32,
    pub platform_fee_percent: Option<f64>,
    pub max_buckets: Option<u32>,
    pub max_bucket_bytes: Option<u64>,
    pub code_archive: Vec<u8>,
    pub data_items: Vec<serde_json::Value>,
}

pub struct TaskService {
    store: Arc<MarketStore>,
    config: Arc<Config>,
    tracker: Arc<HeartbeatTracker>,
}

impl TaskService {
    pub fn new(
        store: Arc<MarketStore>,
        config: Arc<Config>,
        tracker: Arc<HeartbeatTracker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            tracker,
        })
    }

    fn artifact_dir(&self, task_id: &TaskId) -> PathBuf {
        self.config.data_dir.join(&task_id.0)
    }

    /// Creates a task from an upload, persists the artifacts under a storage
    /// id equal to the task id, and stores the record in `queued`.
    pub async fn create_task(
        &self,
        creator_id: &str,
        input: CreateTaskInput,
    ) -> Result<Task, TaskError> {
        if input.code_archive.is_empty() {
            return Err(TaskError::Validation("code archive is required".into()));
        }
        if input.cost_per_bucket <= Credits::ZERO {
            return Err(TaskError::Validation(
                "costPerBucket must be positive".into(),
            ));
        }
        if input.max_billable_buckets < 1 {
            return Err(TaskError::Validation(
                "maxBillableBuckets must be at least 1".into(),
            ));
        }
        let fee = input
            .platform_fee_percent
            .unwrap_or(self.config.platform_fee_percent);
        if !(0.0..=100.0).contains(&fee) {
            return Err(TaskError::Validation(
                "platformFeePercent must be in [0, 100]".into(),
            ));
        }

        let task_id = TaskId::new();
        let dir = self.artifact_dir(&task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .context("creating artifact directory")?;
        tokio::fs::write(dir.join("code.bin"), &input.code_archive)
            .await
            .context("writing code archive")?;
        if !input.data_items.is_empty() {
            let encoded =
                serde_json::to_vec(&input.data_items).context("encoding data items")?;
            tokio::fs::write(dir.join("data.json"), encoded)
                .await
                .context("writing data file")?;
        }

        let now = now_ms();
        let budget_total = Credits::from_micros(
            input
                .cost_per_bucket
                .micros()
                .saturating_mul(input.max_billable_buckets as i64),
        );
        let total_items = input.data_items.len();

        let task = Task {
            id: task_id.clone(),
            creator_id: creator_id.to_string(),
            status: TaskStatus::Queued,
            capability_required: input.capability_required,
            name: input.name,
            data_items_ref: dir.display().to_string(),
            data_items: input.data_items,
            total_items,
            bucket_config: BucketConfig {
                max_buckets: input
                    .max_buckets
                    .unwrap_or(self.config.default_max_buckets)
                    .max(1),
                max_bucket_bytes: input
                    .max_bucket_bytes
                    .unwrap_or(self.config.default_bucket_bytes)
                    .max(1),
            },
            next_bucket_index: 0,
            assigned_workers: Default::default(),
            revoked: false,
            budget: Budget {
                cost_per_bucket: input.cost_per_bucket,
                max_billable_buckets: input.max_billable_buckets,
                budget_total,
                chunks_paid: 0,
                budget_spent: Credits::ZERO,
                platform_fee_percent: fee,
            },
            created_at: now,
            updated_at: now,
        };

        self.store.put_task(task.clone());
        tracing::info!(
            "Created task {} ({} items, {} buckets max)",
            task.id.0,
            task.total_items,
            task.bucket_config.max_buckets
        );
        Ok(task)
    }

    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.store.get_task(task_id)
    }

    pub fn list(&self, status: Option<TaskStatus>) -> Vec<TaskView> {
        let mut tasks: Vec<Task> = self
            .store
            .tasks
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|task| status.map(|wanted| task.status == wanted).unwrap_or(true))
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks.iter().map(|task| self.project(task)).collect()
    }

    /// Opts a worker in. Gated on a recent heartbeat; refused when revoked.
    pub async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Task, TaskError> {
        if !self.tracker.is_online(worker_id) {
            return Err(TaskError::WorkerOffline);
        }

        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if task.revoked {
            return Err(TaskError::Revoked);
        }

        task.assigned_workers.insert(worker_id.to_string());
        if task.status == TaskStatus::Queued {
            task.status = TaskStatus::Processing;
        }
        task.updated_at = now_ms();
        self.store.put_task(task.clone());

        tracing::info!("Worker {} claimed task {}", worker_id, task_id);
        Ok(task)
    }

    /// Opts a worker out and deletes its leases for this task.
    pub async fn drop_worker(&self, task_id: &str, worker_id: &str) -> Result<Task, TaskError> {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;

        task.assigned_workers.remove(worker_id);
        task.updated_at = now_ms();
        self.store.put_task(task.clone());

        let removed = self
            .store
            .remove_assignments_for_worker(task_id, worker_id);
        tracing::info!(
            "Worker {} dropped task {} ({} leases released)",
            worker_id,
            task_id,
            removed
        );
        Ok(task)
    }

    /// Pauses the task: no new leases, all workers unassigned, pending
    /// leases deleted. Existing results remain.
    pub async fn revoke(&self, task_id: &str, caller: &str) -> Result<Task, TaskError> {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if task.creator_id != caller {
            return Err(TaskError::NotCreator);
        }

        task.revoked = true;
        task.assigned_workers.clear();
        task.updated_at = now_ms();
        self.store.put_task(task.clone());

        let removed = self.store.remove_assignments_for_task(task_id);
        tracing::info!("Revoked task {} ({} leases deleted)", task_id, removed);
        Ok(task)
    }

    /// Re-enables claims. Workers must re-claim; a completed task keeps its
    /// status.
    pub async fn reinvoke(&self, task_id: &str, caller: &str) -> Result<Task, TaskError> {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if task.creator_id != caller {
            return Err(TaskError::NotCreator);
        }

        task.revoked = false;
        task.updated_at = now_ms();
        self.store.put_task(task.clone());

        tracing::info!("Reinvoked task {}", task_id);
        Ok(task)
    }

    /// Cascade delete: the record, its results and assignments, and the
    /// artifact directory.
    pub async fn delete(&self, task_id: &str, caller: &str) -> Result<(), TaskError> {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let task = self
            .store
            .get_task(task_id)
            .ok_or_else(|| TaskError::NotFound(task_id.to_string()))?;
        if task.creator_id != caller {
            return Err(TaskError::NotCreator);
        }

        self.store.remove_task_cascade(task_id);

        let dir = self.artifact_dir(&task.id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove artifacts for {}: {}", task_id, e);
            }
        }

        tracing::info!("Deleted task {}", task_id);
        Ok(())
    }

    /// Recomputes the derived progress fields and flips the status to
    /// `completed` when every item is accounted for. Caller holds the
    /// task's writer lock.
    pub fn recompute_progress_locked(&self, task: &mut Task) {
        let (_, _, progress) = self.derive_progress(task);
        if progress == 100 && !task.status.is_terminal() {
            task.status = TaskStatus::Completed;
            tracing::info!("Task {} completed", task.id.0);
        }
        task.updated_at = now_ms();
        self.store.put_task(task.clone());
    }

    fn derive_progress(&self, task: &Task) -> (usize, usize, u8) {
        let results = self.store.results_for_task(&task.id.0);
        let processed_buckets = results
            .iter()
            .filter(|result| result.status.is_terminal())
            .count();
        let processed_items: usize = results
            .iter()
            .map(|result| result.processed_items.min(result.items_count))
            .sum();
        let progress = if task.total_items == 0 {
            0
        } else {
            ((processed_items * 100) / task.total_items).min(100) as u8
        };
        (processed_buckets, processed_items, progress)
    }

    /// Projects a task into its API view, with derived fields computed from
    /// the current results. Reads are lock-free and tolerate staleness.
    pub fn project(&self, task: &Task) -> TaskView {
        let (processed_buckets, processed_items, progress) = self.derive_progress(task);
        let mut assigned_workers: Vec<String> =
            task.assigned_workers.iter().cloned().collect();
        assigned_workers.sort();

        TaskView {
            id: task.id.clone(),
            creator_id: task.creator_id.clone(),
            status: task.status,
            capability_required: task.capability_required.clone(),
            name: task.name.clone(),
            data_items_ref: task.data_items_ref.clone(),
            total_items: task.total_items,
            bucket_config: task.bucket_config,
            next_bucket_index: task.next_bucket_index,
            assigned_workers,
            revoked: task.revoked,
            budget: task.budget.clone(),
            processed_buckets,
            processed_items,
            progress,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}
