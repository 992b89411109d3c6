use super::allocator::{DenyReason, GrantedBucket};
use super::settler::PayoutSummary;
use crate::tasks::types::{BucketStatus, ItemStatus};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// Endpoints
pub const ENDPOINT_NEXT_CHUNK: &str = "/api/worker/next-chunk";
pub const ENDPOINT_RECORD_PROGRESS: &str = "/api/worker/record-progress";
pub const ENDPOINT_RECORD_CHUNK: &str = "/api/worker/record-chunk";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextChunkRequest {
    pub task_id: String,
    /// Defaults to the caller's session id.
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextChunkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_index: Option<u64>,
    /// The literal item slice, so the worker need not re-read the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_data: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<bool>,
}

impl NextChunkResponse {
    pub fn granted(bucket: GrantedBucket) -> Self {
        Self {
            ok: true,
            message: None,
            bucket_index: Some(bucket.bucket_index),
            chunk_data: Some(bucket.items),
            range_start: Some(bucket.range_start),
            range_end: Some(bucket.range_end),
            bucket_bytes: Some(bucket.bytes_used),
            resume: bucket.resume.then_some(true),
        }
    }

    pub fn denied(reason: DenyReason) -> Self {
        Self {
            ok: false,
            message: Some(reason.as_str().to_string()),
            bucket_index: None,
            chunk_data: None,
            range_start: None,
            range_end: None,
            bucket_bytes: None,
            resume: None,
        }
    }
}

/// One per-item record in a progress batch or terminal result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressItemPayload {
    pub local_index: usize,
    pub status: ItemStatus,
    #[serde(default)]
    pub input_preview: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressRequest {
    pub task_id: String,
    pub bucket_index: u64,
    pub worker_id: Option<String>,
    pub range_start: usize,
    pub items_processed: usize,
    #[serde(default)]
    pub total_items: usize,
    #[serde(default)]
    pub bytes_used: u64,
    #[serde(default)]
    pub items: Vec<ProgressItemPayload>,
    #[serde(default)]
    pub batch_offset: usize,
    #[serde(default)]
    pub batch_size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProgressResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl RecordProgressResponse {
    pub fn ok(processed: usize, total: usize) -> Self {
        Self {
            ok: true,
            message: None,
            processed: Some(processed),
            total: Some(total),
        }
    }

    pub fn denied(message: &str) -> Self {
        Self {
            ok: false,
            message: Some(message.to_string()),
            processed: None,
            total: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChunkRequest {
    pub task_id: String,
    pub bucket_index: u64,
    pub status: BucketStatus,
    pub range_start: usize,
    pub range_end: usize,
    #[serde(default)]
    pub items_count: usize,
    #[serde(default)]
    pub item_results: Vec<ProgressItemPayload>,
    #[serde(default)]
    pub processed_items: usize,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub worker_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChunkResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<PayoutSummary>,
}

impl RecordChunkResponse {
    pub fn ok(payout: Option<PayoutSummary>) -> Self {
        Self {
            ok: true,
            message: None,
            payout,
        }
    }

    pub fn denied(message: &str) -> Self {
        Self {
            ok: false,
            message: Some(message.to_string()),
            payout: None,
        }
    }
}
