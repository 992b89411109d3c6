//! Progress & Result Aggregator
//!
//! Merges the two kinds of worker writes into per-bucket results:
//! streaming progress batches (never regressing) and terminal bucket
//! results (which release the lease, deduplicate overlapping state, and
//! trigger settlement). Stored per-item records are bounded and clipped.

use super::allocator::Allocator;
use super::protocol::{ProgressItemPayload, RecordChunkRequest, RecordProgressRequest};
use super::settler::{PayoutSummary, Settler};
use crate::store::memory::MarketStore;
use crate::tasks::service::TaskService;
use crate::tasks::types::{
    now_ms, BucketResult, BucketStatus, ItemResult, ItemStatus, Task, TaskId,
};

use std::sync::Arc;

/// Cap on stored per-item records for one bucket. Clients must never
/// assume completeness; the `item_results_truncated` flag says so.
pub const MAX_ITEM_RESULTS_STORED: usize = 200;
/// Cap on stored preview/output text, in bytes.
pub const ITEM_PREVIEW_LIMIT: usize = 240;

/// Clips text to `limit` bytes (at a char boundary) with a visible marker.
pub fn clip_text(input: &str, limit: usize) -> String {
    if input.len() <= limit {
        return input.to_string();
    }
    let mut cut = limit;
    while !input.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (+{} chars)", &input[..cut], input.len() - cut)
}

/// Worker-scoped reasons a record call was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDenied {
    TaskNotFound,
}

impl RecordDenied {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordDenied::TaskNotFound => "not-found",
        }
    }
}

pub struct Aggregator {
    store: Arc<MarketStore>,
    tasks: Arc<TaskService>,
    allocator: Arc<Allocator>,
    settler: Arc<Settler>,
}

impl Aggregator {
    pub fn new(
        store: Arc<MarketStore>,
        tasks: Arc<TaskService>,
        allocator: Arc<Allocator>,
        settler: Arc<Settler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            tasks,
            allocator,
            settler,
        })
    }

    /// Applies a streaming progress batch. Returns `(processed, total)`
    /// for the bucket.
    pub async fn record_progress(
        &self,
        req: RecordProgressRequest,
        worker_id: &str,
    ) -> Result<(usize, usize), RecordDenied> {
        let lock = self.store.task_lock(&req.task_id);
        let _guard = lock.lock().await;

        let task = self
            .store
            .get_task(&req.task_id)
            .ok_or(RecordDenied::TaskNotFound)?;

        let key = (req.task_id.clone(), req.bucket_index);
        let now = now_ms();
        let lease = self.store.chunk_assignments.get(&key).map(|l| l.clone());

        let mut result = match self.store.chunk_results.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let (range_start, range_end) = lease
                    .as_ref()
                    .map(|l| (l.range_start, l.range_end))
                    .unwrap_or((req.range_start, req.range_start + req.total_items));
                new_result(
                    &task,
                    req.bucket_index,
                    range_start,
                    range_end,
                    worker_id,
                    now,
                )
            }
        };

        if result.payout_issued {
            // Settled buckets are immutable; acknowledge and move on.
            return Ok((result.processed_items, result.items_count));
        }

        // Progress never regresses.
        result.range_end = result.range_end.max(req.range_start + req.items_processed);
        result.items_count = result.range_end - result.range_start;
        result.processed_items = result
            .processed_items
            .max(req.items_processed)
            .min(result.items_count);
        result.bytes_used = result
            .bytes_used
            .max(req.bytes_used)
            .min(task.bucket_config.max_bucket_bytes);
        self.merge_items(&mut result, &req.items);
        result.updated_at = now;

        let response = (result.processed_items, result.items_count);
        self.store.chunk_results.insert(key.clone(), result);

        // Mirror the batch counters onto the lease for the live view.
        if let Some(mut lease) = self.store.chunk_assignments.get_mut(&key) {
            lease.processed_count = lease.processed_count.max(req.items_processed);
            lease.progress_range_end = lease
                .progress_range_end
                .max(req.range_start + req.items_processed);
            lease.bytes_used = lease
                .bytes_used
                .max(req.bytes_used)
                .min(task.bucket_config.max_bucket_bytes);
            lease.last_batch_offset = req.batch_offset;
            lease.last_batch_size = req.batch_size;
            lease.updated_at = now;
        }

        Ok(response)
    }

    /// Applies a terminal bucket result: overwrite, release the lease,
    /// deduplicate overlapping state, settle, and recompute task progress.
    pub async fn record_bucket(
        &self,
        req: RecordChunkRequest,
        worker_id: &str,
    ) -> Result<Option<PayoutSummary>, RecordDenied> {
        let lock = self.store.task_lock(&req.task_id);
        let _guard = lock.lock().await;

        let mut task = self
            .store
            .get_task(&req.task_id)
            .ok_or(RecordDenied::TaskNotFound)?;

        let key = (req.task_id.clone(), req.bucket_index);
        let now = now_ms();
        let existing = self.store.chunk_results.get(&key).map(|r| r.clone());

        if let Some(settled) = existing.as_ref().filter(|r| r.payout_issued) {
            // Retried terminal updates never double-pay.
            self.allocator.release_on_result(
                &req.task_id,
                req.bucket_index,
                settled.range_start,
                settled.range_end,
            );
            return Ok(None);
        }

        let mut result = existing.unwrap_or_else(|| {
            new_result(
                &task,
                req.bucket_index,
                req.range_start,
                req.range_end,
                worker_id,
                now,
            )
        });

        result.range_start = req.range_start;
        result.range_end = req.range_end.max(req.range_start);
        result.items_count = result.range_end - result.range_start;
        result.processed_items = result.items_count;
        result.status = derive_terminal_status(req.status, &req.item_results);
        result.worker_id = worker_id.to_string();
        result.output = req.output.map(|text| clip_text(&text, ITEM_PREVIEW_LIMIT));
        result.error = req.error.map(|text| clip_text(&text, ITEM_PREVIEW_LIMIT));
        result.updated_at = now;

        // Terminal item list replaces whatever streamed in before it.
        result.item_results.clear();
        result.item_results_total = 0;
        result.item_results_truncated = false;
        self.merge_items(&mut result, &req.item_results);

        self.allocator.release_on_result(
            &req.task_id,
            req.bucket_index,
            result.range_start,
            result.range_end,
        );

        // Range-based dedup: a crashed worker may have left a stale result
        // over the same items under another bucket index.
        let (dedup_start, dedup_end) = (result.range_start, result.range_end);
        self.store.chunk_results.retain(|k, other| {
            !(k.0 == req.task_id
                && other.bucket_index != req.bucket_index
                && other.overlaps(dedup_start, dedup_end))
        });

        let payout = self.settler.settle_bucket_locked(&mut task, &mut result);

        self.store.chunk_results.insert(key, result);
        self.tasks.recompute_progress_locked(&mut task);

        Ok(payout)
    }

    /// Upserts normalised item records, keyed by local index, keeping the
    /// list sorted and bounded (truncated from the front).
    fn merge_items(&self, result: &mut BucketResult, items: &[ProgressItemPayload]) {
        for payload in items {
            let normalized = ItemResult {
                local_index: payload.local_index,
                global_index: result.range_start + payload.local_index,
                status: payload.status,
                input_preview: payload
                    .input_preview
                    .as_deref()
                    .map(|text| clip_text(text, ITEM_PREVIEW_LIMIT)),
                output: payload
                    .output
                    .as_deref()
                    .map(|text| clip_text(text, ITEM_PREVIEW_LIMIT)),
                error: payload
                    .error
                    .as_deref()
                    .map(|text| clip_text(text, ITEM_PREVIEW_LIMIT)),
            };

            match result
                .item_results
                .iter_mut()
                .find(|entry| entry.local_index == payload.local_index)
            {
                Some(entry) => *entry = normalized,
                None => {
                    result.item_results.push(normalized);
                    result.item_results_total += 1;
                }
            }
        }

        result.item_results.sort_by_key(|entry| entry.local_index);
        if result.item_results.len() > MAX_ITEM_RESULTS_STORED {
            let excess = result.item_results.len() - MAX_ITEM_RESULTS_STORED;
            result.item_results.drain(..excess);
            result.item_results_truncated = true;
        }
    }
}

fn new_result(
    task: &Task,
    bucket_index: u64,
    range_start: usize,
    range_end: usize,
    worker_id: &str,
    now: u64,
) -> BucketResult {
    let range_end = range_end.max(range_start);
    BucketResult {
        task_id: TaskId(task.id.0.clone()),
        bucket_index,
        range_start,
        range_end,
        items_count: range_end - range_start,
        status: BucketStatus::Processing,
        processed_items: 0,
        bytes_used: 0,
        worker_id: worker_id.to_string(),
        item_results: Vec::new(),
        item_results_total: 0,
        item_results_truncated: false,
        output: None,
        error: None,
        payout_issued: false,
        payout_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// A terminal status is derived from the items when any were reported:
/// one failure fails the bucket, otherwise one success completes it,
/// otherwise everything was skipped.
fn derive_terminal_status(requested: BucketStatus, items: &[ProgressItemPayload]) -> BucketStatus {
    if items.is_empty() {
        return if requested == BucketStatus::Processing {
            BucketStatus::Completed
        } else {
            requested
        };
    }
    if items.iter().any(|item| item.status == ItemStatus::Failed) {
        BucketStatus::Failed
    } else if items.iter().any(|item| item.status == ItemStatus::Completed) {
        BucketStatus::Completed
    } else {
        BucketStatus::Skipped
    }
}
