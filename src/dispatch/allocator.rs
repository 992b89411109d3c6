//! Assignment Allocator
//!
//! Grants exclusive bucket leases, resumes them on reconnect, and sweeps
//! the expired ones. The whole `next_bucket` sequence runs under the
//! task's writer lock, so bucket indexes are handed out strictly
//! monotonically and two workers can never hold overlapping ranges.

use super::planner;
use crate::config::Config;
use crate::store::memory::MarketStore;
use crate::tasks::types::{now_ms, BucketAssignment, TaskStatus};
use crate::wallet::ledger::WalletLedger;

use serde_json::Value;
use std::sync::Arc;

/// Why a `next_bucket` call returned no lease. Non-fatal; workers back off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NoChunk,
    NotAssigned,
    Revoked,
    BudgetExhausted,
    InsufficientFunds,
    NotFound,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NoChunk => "no-chunk",
            DenyReason::NotAssigned => "not-assigned",
            DenyReason::Revoked => "revoked",
            DenyReason::BudgetExhausted => "budget-exhausted",
            DenyReason::InsufficientFunds => "insufficient-funds",
            DenyReason::NotFound => "not-found",
        }
    }
}

/// A granted (or resumed) lease, including the literal item slice so the
/// worker does not need to re-read the source file.
#[derive(Debug, Clone)]
pub struct GrantedBucket {
    pub bucket_index: u64,
    pub range_start: usize,
    pub range_end: usize,
    pub bytes_used: u64,
    pub resume: bool,
    pub items: Vec<Value>,
}

pub struct Allocator {
    store: Arc<MarketStore>,
    config: Arc<Config>,
    ledger: Arc<WalletLedger>,
}

impl Allocator {
    pub fn new(
        store: Arc<MarketStore>,
        config: Arc<Config>,
        ledger: Arc<WalletLedger>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            ledger,
        })
    }

    /// Grants the next bucket to a worker, or resumes its active lease.
    pub async fn next_bucket(
        &self,
        task_id: &str,
        worker_id: &str,
    ) -> Result<GrantedBucket, DenyReason> {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(task_id)
            .ok_or(DenyReason::NotFound)?;
        if task.revoked {
            return Err(DenyReason::Revoked);
        }
        if !task.assigned_workers.contains(worker_id) {
            return Err(DenyReason::NotAssigned);
        }

        let now = now_ms();
        self.store.remove_expired_assignments(task_id, now);

        // Resume: a worker owns at most one active lease per task, and a
        // reconnect gets the same bucket back so streamed progress is kept.
        if let Some(granted) = self.try_resume(task_id, worker_id, &task.data_items, now) {
            tracing::debug!(
                "Worker {} resumed bucket {} of task {}",
                worker_id,
                granted.bucket_index,
                task_id
            );
            return Ok(granted);
        }

        if !self.config.disable_budget_checks {
            let active_leases = self.store.assignments_for_task(task_id).len() as u32;
            if task.budget.chunks_paid + active_leases >= task.budget.max_billable_buckets {
                return Err(DenyReason::BudgetExhausted);
            }
            let funded = self
                .ledger
                .user_by_session(&task.creator_id)
                .map(|customer| customer.wallet_balance >= task.budget.cost_per_bucket)
                .unwrap_or(false);
            if !funded {
                return Err(DenyReason::InsufficientFunds);
            }
        }

        let mut config = task.bucket_config;
        if planner::normalize_config(&task.data_items, &mut config) {
            task.bucket_config = config;
        }

        let covered = self.covered_ranges(task_id);
        let plan = planner::plan_next_bucket(&task.data_items, &config, &covered)
            .ok_or(DenyReason::NoChunk)?;

        let bucket_index = task.next_bucket_index;
        task.next_bucket_index += 1;
        if task.status == TaskStatus::Queued {
            task.status = TaskStatus::Processing;
        }
        task.updated_at = now;

        let lease = BucketAssignment {
            task_id: task.id.clone(),
            bucket_index,
            worker_id: worker_id.to_string(),
            assigned_at: now,
            expires_at: now + self.config.lease_ttl_ms,
            range_start: plan.range_start,
            range_end: plan.range_end,
            processed_count: 0,
            progress_range_end: plan.range_start,
            bytes_used: plan.bytes_used,
            last_batch_offset: 0,
            last_batch_size: 0,
            updated_at: now,
        };
        self.store
            .chunk_assignments
            .insert((task_id.to_string(), bucket_index), lease);

        let items = task.data_items[plan.range_start..plan.range_end].to_vec();
        self.store.put_task(task);

        tracing::info!(
            "Leased bucket {} [{}, {}) of task {} to worker {}",
            bucket_index,
            plan.range_start,
            plan.range_end,
            task_id,
            worker_id
        );

        Ok(GrantedBucket {
            bucket_index,
            range_start: plan.range_start,
            range_end: plan.range_end,
            bytes_used: plan.bytes_used,
            resume: false,
            items,
        })
    }

    fn try_resume(
        &self,
        task_id: &str,
        worker_id: &str,
        items: &[Value],
        now: u64,
    ) -> Option<GrantedBucket> {
        let mut mine: Vec<BucketAssignment> = self
            .store
            .assignments_for_task(task_id)
            .into_iter()
            .filter(|lease| lease.worker_id == worker_id)
            .filter(|lease| {
                // A lease whose bucket already went terminal is dead weight.
                self.store
                    .chunk_results
                    .get(&(task_id.to_string(), lease.bucket_index))
                    .map(|result| !result.status.is_terminal())
                    .unwrap_or(true)
            })
            .collect();
        if mine.is_empty() {
            return None;
        }

        // Oldest lease wins; any duplicates are discarded.
        mine.sort_by_key(|lease| lease.assigned_at);
        for extra in mine.iter().skip(1) {
            self.store.remove_assignment(task_id, extra.bucket_index);
        }

        let mut lease = mine.swap_remove(0);
        lease.expires_at = now + self.config.lease_ttl_ms;
        lease.updated_at = now;
        self.store.chunk_assignments.insert(
            (task_id.to_string(), lease.bucket_index),
            lease.clone(),
        );

        Some(GrantedBucket {
            bucket_index: lease.bucket_index,
            range_start: lease.range_start,
            range_end: lease.range_end,
            bytes_used: lease.bytes_used,
            resume: true,
            items: items[lease.range_start..lease.range_end].to_vec(),
        })
    }

    /// Ranges no longer available for planning: terminal results plus
    /// active leases.
    fn covered_ranges(&self, task_id: &str) -> Vec<(usize, usize)> {
        let mut covered: Vec<(usize, usize)> = self
            .store
            .results_for_task(task_id)
            .into_iter()
            .filter(|result| result.status.is_terminal())
            .map(|result| (result.range_start, result.range_end))
            .collect();
        covered.extend(
            self.store
                .assignments_for_task(task_id)
                .into_iter()
                .map(|lease| (lease.range_start, lease.range_end)),
        );
        covered
    }

    /// Deletes the lease behind a terminal result, plus any lease whose
    /// range overlaps it (deduplication after a crashed worker). Caller
    /// holds the task's writer lock.
    pub fn release_on_result(
        &self,
        task_id: &str,
        bucket_index: u64,
        range_start: usize,
        range_end: usize,
    ) {
        self.store.remove_assignment(task_id, bucket_index);
        self.store.chunk_assignments.retain(|key, lease| {
            !(key.0 == task_id && lease.overlaps(range_start, range_end))
        });
    }

    /// Deletes expired leases for one task.
    pub async fn sweep_expired(&self, task_id: &str) -> usize {
        let lock = self.store.task_lock(task_id);
        let _guard = lock.lock().await;
        self.store.remove_expired_assignments(task_id, now_ms())
    }

    /// Periodic sweep across all tasks. Correctness never depends on this;
    /// it only shortens the time a dead worker's range stays blocked.
    pub async fn sweep_all_expired(&self) -> usize {
        let task_ids: Vec<String> = self
            .store
            .tasks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for task_id in task_ids {
            removed += self.sweep_expired(&task_id).await;
        }
        if removed > 0 {
            tracing::debug!("Swept {} expired leases", removed);
        }
        removed
    }
}
