use crate::tasks::types::{BucketAssignment, BucketResult, Task};
use crate::wallet::types::{PlatformLedger, User, WalletTransaction};

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Key for the per-bucket collections: `(task id, bucket index)`.
pub type BucketKey = (String, u64);

/// The process-local store with the six named collections.
///
/// Collections are concurrent maps; cross-entry consistency for a single
/// task is provided by the per-task writer lock, not by the maps themselves.
/// Callers must not hold a map reference across an `.await` point.
pub struct MarketStore {
    pub tasks: DashMap<String, Task>,
    pub chunk_results: DashMap<BucketKey, BucketResult>,
    pub chunk_assignments: DashMap<BucketKey, BucketAssignment>,
    pub users: DashMap<String, User>,
    pub wallet_transactions: DashMap<String, WalletTransaction>,
    pub platform_ledger: Mutex<PlatformLedger>,

    /// session id -> user id, so callers and workers resolve in O(1).
    sessions: DashMap<String, String>,
    /// Writer locks, one per live task.
    task_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Insertion counter for transaction rows.
    tx_seq: AtomicU64,
}

impl MarketStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
            chunk_results: DashMap::new(),
            chunk_assignments: DashMap::new(),
            users: DashMap::new(),
            wallet_transactions: DashMap::new(),
            platform_ledger: Mutex::new(PlatformLedger::default()),
            sessions: DashMap::new(),
            task_locks: DashMap::new(),
            tx_seq: AtomicU64::new(0),
        })
    }

    /// Returns the writer lock for a task, creating it on first use.
    ///
    /// The returned handle is cloned out of the registry so the caller never
    /// holds a map reference while awaiting the lock.
    pub fn task_lock(&self, task_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.task_locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    pub fn next_tx_seq(&self) -> u64 {
        self.tx_seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.tasks.get(task_id).map(|entry| entry.clone())
    }

    pub fn put_task(&self, task: Task) {
        self.tasks.insert(task.id.0.clone(), task);
    }

    /// Removes a task and everything keyed under it.
    pub fn remove_task_cascade(&self, task_id: &str) -> Option<Task> {
        let removed = self.tasks.remove(task_id).map(|(_, task)| task);
        self.chunk_results.retain(|key, _| key.0 != task_id);
        self.chunk_assignments.retain(|key, _| key.0 != task_id);
        self.task_locks.remove(task_id);
        removed
    }

    pub fn results_for_task(&self, task_id: &str) -> Vec<BucketResult> {
        let mut results: Vec<BucketResult> = self
            .chunk_results
            .iter()
            .filter(|entry| entry.key().0 == task_id)
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by_key(|result| result.bucket_index);
        results
    }

    pub fn assignments_for_task(&self, task_id: &str) -> Vec<BucketAssignment> {
        let mut assignments: Vec<BucketAssignment> = self
            .chunk_assignments
            .iter()
            .filter(|entry| entry.key().0 == task_id)
            .map(|entry| entry.value().clone())
            .collect();
        assignments.sort_by_key(|assignment| assignment.bucket_index);
        assignments
    }

    pub fn remove_assignment(&self, task_id: &str, bucket_index: u64) {
        self.chunk_assignments
            .remove(&(task_id.to_string(), bucket_index));
    }

    pub fn remove_assignments_for_worker(&self, task_id: &str, worker_id: &str) -> usize {
        let before = self.chunk_assignments.len();
        self.chunk_assignments
            .retain(|key, lease| !(key.0 == task_id && lease.worker_id == worker_id));
        before - self.chunk_assignments.len()
    }

    pub fn remove_assignments_for_task(&self, task_id: &str) -> usize {
        let before = self.chunk_assignments.len();
        self.chunk_assignments.retain(|key, _| key.0 != task_id);
        before - self.chunk_assignments.len()
    }

    pub fn remove_expired_assignments(&self, task_id: &str, now: u64) -> usize {
        let before = self.chunk_assignments.len();
        self.chunk_assignments
            .retain(|key, lease| !(key.0 == task_id && lease.is_expired(now)));
        before - self.chunk_assignments.len()
    }

    pub fn user_by_session(&self, session_id: &str) -> Option<User> {
        let user_id = self.sessions.get(session_id)?.clone();
        self.users.get(&user_id).map(|entry| entry.clone())
    }

    pub fn put_user(&self, user: User) {
        self.sessions.insert(user.session_id.clone(), user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    pub fn transactions_for_user(&self, user_id: &str) -> Vec<WalletTransaction> {
        let mut rows: Vec<WalletTransaction> = self
            .wallet_transactions
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.seq);
        rows
    }

    pub fn task_status_counts(&self) -> (usize, usize, usize, usize) {
        let mut queued = 0;
        let mut processing = 0;
        let mut completed = 0;
        let mut failed = 0;
        for entry in self.tasks.iter() {
            match entry.value().status {
                crate::tasks::types::TaskStatus::Queued => queued += 1,
                crate::tasks::types::TaskStatus::Processing => processing += 1,
                crate::tasks::types::TaskStatus::Completed => completed += 1,
                crate::tasks::types::TaskStatus::Failed => failed += 1,
            }
        }
        (queued, processing, completed, failed)
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self {
            tasks: DashMap::new(),
            chunk_results: DashMap::new(),
            chunk_assignments: DashMap::new(),
            users: DashMap::new(),
            wallet_transactions: DashMap::new(),
            platform_ledger: Mutex::new(PlatformLedger::default()),
            sessions: DashMap::new(),
            task_locks: DashMap::new(),
            tx_seq: AtomicU64::new(0),
        }
    }
}
