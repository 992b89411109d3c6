//! HTTP Request Handlers
//!
//! Axum route handlers for the customer-facing task surface. Task creation
//! is a multipart upload (code archive plus optional JSON data file); the
//! rest are JSON endpoints keyed by the caller's session.

use super::protocol::*;
use super::service::{CreateTaskInput, TaskError, TaskService};
use super::types::TaskStatus;
use crate::store::memory::MarketStore;
use crate::wallet::handlers::session_from_headers;
use crate::wallet::ledger::WalletLedger;
use crate::wallet::protocol::ErrorResponse;
use crate::wallet::types::Credits;

use axum::extract::{Multipart, Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use std::sync::Arc;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}

fn task_error_response(error: TaskError) -> HandlerError {
    let status = match &error {
        TaskError::NotFound(_) => StatusCode::NOT_FOUND,
        TaskError::NotCreator => StatusCode::FORBIDDEN,
        TaskError::Revoked => StatusCode::CONFLICT,
        TaskError::WorkerOffline => StatusCode::BAD_REQUEST,
        TaskError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Task operation failed: {}", error);
        return (status, Json(ErrorResponse::new("internal error")));
    }
    (status, Json(ErrorResponse::new(error.to_string())))
}

fn require_session(headers: &HeaderMap) -> Result<String, HandlerError> {
    session_from_headers(headers).ok_or_else(|| bad_request("missing session id"))
}

/// Create a task from a multipart upload.
///
/// Expected parts: `code` (required file), `data` (optional file holding a
/// JSON array of input items), and text fields mirroring the budget and
/// bucket configuration.
pub async fn handle_create_task(
    headers: HeaderMap,
    Extension(service): Extension<Arc<TaskService>>,
    Extension(ledger): Extension<Arc<WalletLedger>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<TaskResponse>), HandlerError> {
    let session = require_session(&headers)?;
    let creator = ledger.resolve_session(&session);

    let mut fields = CreateTaskFields::default();
    let mut code_archive: Vec<u8> = Vec::new();
    let mut data_items: Vec<serde_json::Value> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "code" => {
                code_archive = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("reading code archive: {}", e)))?
                    .to_vec();
            }
            "data" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("reading data file: {}", e)))?;
                data_items = serde_json::from_slice(&bytes)
                    .map_err(|e| bad_request(format!("data file must be a JSON array: {}", e)))?;
            }
            _ => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("reading field {}: {}", name, e)))?;
                apply_text_field(&mut fields, &name, &text)?;
            }
        }
    }

    let input = CreateTaskInput {
        name: fields.name.unwrap_or_else(|| "untitled".to_string()),
        capability_required: fields.capability_required.unwrap_or_default(),
        cost_per_bucket: fields
            .cost_per_bucket
            .ok_or_else(|| bad_request("costPerBucket is required"))?,
        max_billable_buckets: fields
            .max_billable_buckets
            .ok_or_else(|| bad_request("maxBillableBuckets is required"))?,
        platform_fee_percent: fields.platform_fee_percent,
        max_buckets: fields.max_buckets,
        max_bucket_bytes: fields.max_bucket_bytes,
        code_archive,
        data_items,
    };

    match service.create_task(&creator.session_id, input).await {
        Ok(task) => Ok((
            StatusCode::CREATED,
            Json(TaskResponse {
                task: service.project(&task),
            }),
        )),
        Err(e) => Err(task_error_response(e)),
    }
}

fn apply_text_field(
    fields: &mut CreateTaskFields,
    name: &str,
    text: &str,
) -> Result<(), HandlerError> {
    let parse_err = |field: &str| bad_request(format!("invalid value for {}", field));
    match name {
        "name" => fields.name = Some(text.to_string()),
        "capabilityRequired" => fields.capability_required = Some(text.to_string()),
        "costPerBucket" => {
            let amount: f64 = text.parse().map_err(|_| parse_err(name))?;
            fields.cost_per_bucket = Some(Credits::from_major(amount));
        }
        "maxBillableBuckets" => {
            fields.max_billable_buckets = Some(text.parse().map_err(|_| parse_err(name))?)
        }
        "platformFeePercent" => {
            fields.platform_fee_percent = Some(text.parse().map_err(|_| parse_err(name))?)
        }
        "maxBuckets" => fields.max_buckets = Some(text.parse().map_err(|_| parse_err(name))?),
        "maxBucketBytes" => {
            fields.max_bucket_bytes = Some(text.parse().map_err(|_| parse_err(name))?)
        }
        other => {
            tracing::debug!("Ignoring unknown upload field {}", other);
        }
    }
    Ok(())
}

/// List tasks, optionally filtered by status.
pub async fn handle_list_tasks(
    Query(query): Query<TaskListQuery>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<TaskListResponse>, HandlerError> {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some("queued") => Some(TaskStatus::Queued),
        Some("processing") => Some(TaskStatus::Processing),
        Some("completed") => Some(TaskStatus::Completed),
        Some("failed") => Some(TaskStatus::Failed),
        Some(other) => return Err(bad_request(format!("unknown status filter: {}", other))),
    };

    Ok(Json(TaskListResponse {
        tasks: service.list(status),
    }))
}

/// Opt the calling worker in to a task.
pub async fn handle_claim_task(
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<TaskResponse>, HandlerError> {
    let session = require_session(&headers)?;
    match service.claim(&task_id, &session).await {
        Ok(task) => Ok(Json(TaskResponse {
            task: service.project(&task),
        })),
        Err(e) => Err(task_error_response(e)),
    }
}

/// Opt the calling worker out and release its leases.
pub async fn handle_drop_task(
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<TaskResponse>, HandlerError> {
    let session = require_session(&headers)?;
    match service.drop_worker(&task_id, &session).await {
        Ok(task) => Ok(Json(TaskResponse {
            task: service.project(&task),
        })),
        Err(e) => Err(task_error_response(e)),
    }
}

pub async fn handle_revoke_task(
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<TaskResponse>, HandlerError> {
    let session = require_session(&headers)?;
    match service.revoke(&task_id, &session).await {
        Ok(task) => Ok(Json(TaskResponse {
            task: service.project(&task),
        })),
        Err(e) => Err(task_error_response(e)),
    }
}

pub async fn handle_reinvoke_task(
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<TaskResponse>, HandlerError> {
    let session = require_session(&headers)?;
    match service.reinvoke(&task_id, &session).await {
        Ok(task) => Ok(Json(TaskResponse {
            task: service.project(&task),
        })),
        Err(e) => Err(task_error_response(e)),
    }
}

pub async fn handle_delete_task(
    headers: HeaderMap,
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
) -> Result<Json<DeleteResponse>, HandlerError> {
    let session = require_session(&headers)?;
    match service.delete(&task_id, &session).await {
        Ok(()) => Ok(Json(DeleteResponse { ok: true })),
        Err(e) => Err(task_error_response(e)),
    }
}

/// Results and live assignments for a task. Read-only; tolerates slightly
/// stale derived fields and takes no lock.
pub async fn handle_task_results(
    Path(task_id): Path<String>,
    Extension(service): Extension<Arc<TaskService>>,
    Extension(store): Extension<Arc<MarketStore>>,
) -> Result<Json<TaskResultsResponse>, HandlerError> {
    if service.get(&task_id).is_none() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("task not found: {}", task_id))),
        ));
    }

    Ok(Json(TaskResultsResponse {
        results: store.results_for_task(&task_id),
        assignments: store.assignments_for_task(&task_id),
    }))
}
