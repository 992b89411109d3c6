//! HTTP Request Handlers
//!
//! The worker-facing API: lease grants, streamed progress, and terminal
//! results. State denials come back as `ok:false` with a short machine
//! message so workers can back off instead of treating them as failures.
//! Every call here also refreshes the worker's heartbeat; a worker that is
//! talking to us is alive.

use super::aggregator::Aggregator;
use super::allocator::Allocator;
use super::protocol::*;
use crate::liveness::tracker::HeartbeatTracker;
use crate::wallet::handlers::session_from_headers;
use crate::wallet::protocol::ErrorResponse;

use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use std::sync::Arc;

fn resolve_worker(
    explicit: Option<String>,
    headers: &HeaderMap,
) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    explicit
        .filter(|worker| !worker.is_empty())
        .or_else(|| session_from_headers(headers))
        .ok_or((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing worker id")),
        ))
}

/// Grant or resume a bucket lease.
pub async fn handle_next_chunk(
    headers: HeaderMap,
    Extension(allocator): Extension<Arc<Allocator>>,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
    Json(req): Json<NextChunkRequest>,
) -> Result<Json<NextChunkResponse>, (StatusCode, Json<ErrorResponse>)> {
    let worker_id = resolve_worker(req.worker_id, &headers)?;
    tracker.heartbeat(&worker_id);

    match allocator.next_bucket(&req.task_id, &worker_id).await {
        Ok(bucket) => Ok(Json(NextChunkResponse::granted(bucket))),
        Err(reason) => {
            tracing::debug!(
                "next-chunk denied for worker {} on task {}: {}",
                worker_id,
                req.task_id,
                reason.as_str()
            );
            Ok(Json(NextChunkResponse::denied(reason)))
        }
    }
}

/// Incremental progress batch for an in-flight bucket.
pub async fn handle_record_progress(
    headers: HeaderMap,
    Extension(aggregator): Extension<Arc<Aggregator>>,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
    Json(req): Json<RecordProgressRequest>,
) -> Result<Json<RecordProgressResponse>, (StatusCode, Json<ErrorResponse>)> {
    let worker_id = resolve_worker(req.worker_id.clone(), &headers)?;
    tracker.heartbeat(&worker_id);

    match aggregator.record_progress(req, &worker_id).await {
        Ok((processed, total)) => Ok(Json(RecordProgressResponse::ok(processed, total))),
        Err(denied) => Ok(Json(RecordProgressResponse::denied(denied.as_str()))),
    }
}

/// Terminal bucket result. Releases the lease and, for completed buckets,
/// settles the payout.
pub async fn handle_record_chunk(
    headers: HeaderMap,
    Extension(aggregator): Extension<Arc<Aggregator>>,
    Extension(tracker): Extension<Arc<HeartbeatTracker>>,
    Json(req): Json<RecordChunkRequest>,
) -> Result<Json<RecordChunkResponse>, (StatusCode, Json<ErrorResponse>)> {
    let worker_id = resolve_worker(req.worker_id.clone(), &headers)?;
    tracker.heartbeat(&worker_id);

    match aggregator.record_bucket(req, &worker_id).await {
        Ok(payout) => Ok(Json(RecordChunkResponse::ok(payout))),
        Err(denied) => Ok(Json(RecordChunkResponse::denied(denied.as_str()))),
    }
}
