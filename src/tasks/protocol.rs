use super::types::*;
use crate::wallet::types::Credits;
use serde::{Deserialize, Serialize};

// Endpoints
pub const ENDPOINT_TASKS: &str = "/api/tasks";
pub const ENDPOINT_TASK_CLAIM: &str = "/api/tasks/:id/claim";
pub const ENDPOINT_TASK_DROP: &str = "/api/tasks/:id/drop";
pub const ENDPOINT_TASK_REVOKE: &str = "/api/tasks/:id/revoke";
pub const ENDPOINT_TASK_REINVOKE: &str = "/api/tasks/:id/reinvoke";
pub const ENDPOINT_TASK_RESULTS: &str = "/api/tasks/:id/results";

/// Projection of a task for API responses: derived progress included, the
/// raw item payload left out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub creator_id: String,
    pub status: TaskStatus,
    pub capability_required: String,
    pub name: String,
    pub data_items_ref: String,
    pub total_items: usize,
    pub bucket_config: BucketConfig,
    pub next_bucket_index: u64,
    pub assigned_workers: Vec<String>,
    pub revoked: bool,
    pub budget: Budget,
    pub processed_buckets: usize,
    pub processed_items: usize,
    pub progress: u8,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Text fields accepted alongside the multipart file parts.
#[derive(Debug, Default)]
pub struct CreateTaskFields {
    pub name: Option<String>,
    pub capability_required: Option<String>,
    pub cost_per_bucket: Option<Credits>,
    pub max_billable_buckets: Option<u32>,
    pub platform_fee_percent: Option<f64>,
    pub max_buckets: Option<u32>,
    pub max_bucket_bytes: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: TaskView,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResultsResponse {
    pub results: Vec<BucketResult>,
    pub assignments: Vec<BucketAssignment>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub ok: bool,
}
