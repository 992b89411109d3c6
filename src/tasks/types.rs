use crate::wallet::types::Credits;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Unique identifier for a task.
/// Wrapper around a UUID string so ids stay opaque and stable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// Planning limits for partitioning a task's items into buckets.
///
/// The planner may enlarge `max_bucket_bytes` (and shrink `max_buckets`)
/// so that the largest single item always fits; it never does the reverse.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    pub max_buckets: u32,
    pub max_bucket_bytes: u64,
}

/// Spending limits and running totals for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Budget {
    pub cost_per_bucket: Credits,
    pub max_billable_buckets: u32,
    pub budget_total: Credits,
    /// Number of buckets settled so far. Never exceeds `max_billable_buckets`.
    pub chunks_paid: u32,
    /// Always equals `chunks_paid * cost_per_bucket`.
    pub budget_spent: Credits,
    pub platform_fee_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    /// Session id of the customer who created the task.
    pub creator_id: String,
    pub status: TaskStatus,
    pub capability_required: String,
    pub name: String,
    /// On-disk location of the uploaded artifacts.
    pub data_items_ref: String,
    /// The immutable ordered input sequence. Held in the task record; list
    /// and read responses project a view without this payload.
    pub data_items: Vec<serde_json::Value>,
    pub total_items: usize,
    pub bucket_config: BucketConfig,
    /// Monotonic counter; assigned to the next lease granted and never reused.
    pub next_bucket_index: u64,
    pub assigned_workers: HashSet<String>,
    /// When true, no new leases or claims are granted.
    pub revoked: bool,
    pub budget: Budget,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Terminal (or in-flight) state of one bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BucketStatus {
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl BucketStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BucketStatus::Processing)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Completed,
    Failed,
    Skipped,
}

/// Per-item record inside a bucket result. Previews and outputs are clipped
/// before storage; see the aggregator's bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResult {
    pub local_index: usize,
    /// `range_start + local_index`, derived server-side.
    pub global_index: usize,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result record for one `(task, bucket)` pair.
///
/// Once `payout_issued` is true the record is immutable apart from display
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketResult {
    pub task_id: TaskId,
    pub bucket_index: u64,
    /// Half-open range into the task's item sequence.
    pub range_start: usize,
    pub range_end: usize,
    /// Always equals `range_end - range_start`.
    pub items_count: usize,
    pub status: BucketStatus,
    /// Monotonically non-decreasing; never exceeds `items_count`.
    pub processed_items: usize,
    pub bytes_used: u64,
    pub worker_id: String,
    /// Bounded list, kept sorted by `local_index` and truncated from the
    /// front once it exceeds the storage cap.
    pub item_results: Vec<ItemResult>,
    pub item_results_total: usize,
    pub item_results_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub payout_issued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout_at: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl BucketResult {
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.range_start < end && start < self.range_end
    }
}

/// An exclusive bucket lease. Exists only while the bucket is in flight;
/// deleted on terminal result, drop, revoke, and expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAssignment {
    pub task_id: TaskId,
    pub bucket_index: u64,
    pub worker_id: String,
    pub assigned_at: u64,
    pub expires_at: u64,
    pub range_start: usize,
    pub range_end: usize,
    pub processed_count: usize,
    pub progress_range_end: usize,
    pub bytes_used: u64,
    pub last_batch_offset: usize,
    pub last_batch_size: usize,
    pub updated_at: u64,
}

impl BucketAssignment {
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at < now
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.range_start < end && start < self.range_end
    }
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
