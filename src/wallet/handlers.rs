//! HTTP Request Handlers
//!
//! Axum route handlers for the caller-facing wallet surface: profile,
//! sandbox deposits/withdrawals, and the external checkout contract.

use super::ledger::{LedgerError, WalletLedger};
use super::protocol::*;
use super::stripe::StripeClient;
use crate::wallet::types::Credits;

use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use std::sync::Arc;

/// Pulls the opaque session id from the `x-session-id` header or the
/// `rt_session` cookie. Returns `None` when neither is present.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(SESSION_HEADER) {
        if let Ok(session) = value.to_str() {
            if !session.is_empty() {
                return Some(session.to_string());
            }
        }
    }

    let cookies = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for pair in cookies.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        if parts.next() == Some(SESSION_COOKIE) {
            let value = parts.next().unwrap_or_default();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn ledger_error_status(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::SandboxDisabled => StatusCode::FORBIDDEN,
        LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        LedgerError::InsufficientFunds => StatusCode::BAD_REQUEST,
        LedgerError::UnknownUser(_) => StatusCode::NOT_FOUND,
        LedgerError::Overflow => StatusCode::BAD_REQUEST,
    }
}

/// Caller profile plus the last 25 transactions.
pub async fn handle_me(
    headers: HeaderMap,
    Extension(ledger): Extension<Arc<WalletLedger>>,
) -> Result<Json<MeResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(session) = session_from_headers(&headers) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing session id")),
        ));
    };

    let user = ledger.resolve_session(&session);
    let (wallet_transactions, wallet_transactions_total) = ledger.transactions_for(&user.id, 25);

    Ok(Json(MeResponse {
        user,
        wallet_transactions,
        wallet_transactions_total,
    }))
}

/// Sandbox-only wallet credit.
pub async fn handle_deposit(
    headers: HeaderMap,
    Extension(ledger): Extension<Arc<WalletLedger>>,
    Json(req): Json<WalletAmountRequest>,
) -> Result<Json<WalletOpResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(session) = session_from_headers(&headers) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing session id")),
        ));
    };

    let user = ledger.resolve_session(&session);
    match ledger.deposit(&user.id, req.amount) {
        Ok((user, transaction)) => Ok(Json(WalletOpResponse { user, transaction })),
        Err(e) => {
            tracing::debug!("Deposit rejected for {}: {}", user.id, e);
            Err((ledger_error_status(&e), Json(ErrorResponse::new(e.to_string()))))
        }
    }
}

/// Sandbox-only wallet debit.
pub async fn handle_withdraw(
    headers: HeaderMap,
    Extension(ledger): Extension<Arc<WalletLedger>>,
    Json(req): Json<WalletAmountRequest>,
) -> Result<Json<WalletOpResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(session) = session_from_headers(&headers) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing session id")),
        ));
    };

    let user = ledger.resolve_session(&session);
    match ledger.withdraw(&user.id, req.amount) {
        Ok((user, transaction)) => Ok(Json(WalletOpResponse { user, transaction })),
        Err(e) => {
            tracing::debug!("Withdrawal rejected for {}: {}", user.id, e);
            Err((ledger_error_status(&e), Json(ErrorResponse::new(e.to_string()))))
        }
    }
}

/// Delegates a deposit to the hosted checkout provider.
/// Responds 501 when no provider is configured.
pub async fn handle_create_checkout_session(
    headers: HeaderMap,
    Extension(ledger): Extension<Arc<WalletLedger>>,
    Extension(stripe): Extension<Arc<StripeClient>>,
    Json(req): Json<CreateCheckoutRequest>,
) -> Result<Json<CheckoutSessionResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Some(session) = session_from_headers(&headers) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("missing session id")),
        ));
    };
    if !stripe.enabled() {
        return Err((
            StatusCode::NOT_IMPLEMENTED,
            Json(ErrorResponse::new("checkout provider not configured")),
        ));
    }
    if !req.amount.is_finite() || req.amount <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("amount must be positive")),
        ));
    }

    let user = ledger.resolve_session(&session);
    let amount_cents = (req.amount * 100.0).round_ties_even() as i64;

    match stripe.create_checkout_session(&user.id, amount_cents).await {
        Ok(session) => Ok(Json(session)),
        Err(e) => {
            tracing::error!("Checkout session creation failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("checkout session creation failed")),
            ))
        }
    }
}

/// Applies a completed checkout event to the referenced wallet.
///
/// Unknown event types and unknown references are acknowledged and ignored,
/// so the provider does not retry them forever.
pub async fn handle_stripe_webhook(
    Extension(ledger): Extension<Arc<WalletLedger>>,
    Json(event): Json<WebhookEvent>,
) -> Json<WebhookAck> {
    if event.event_type != "checkout.session.completed" {
        tracing::debug!("Ignoring webhook event type {}", event.event_type);
        return Json(WebhookAck { received: true });
    }

    let object = event.data.object;
    let Some(user_id) = object.client_reference_id else {
        tracing::warn!("Completed checkout {} without client reference", object.id);
        return Json(WebhookAck { received: true });
    };
    let cents = object.amount_total.unwrap_or(0);
    if cents <= 0 {
        tracing::warn!("Completed checkout {} with non-positive amount", object.id);
        return Json(WebhookAck { received: true });
    }

    let amount = Credits::from_micros(cents * 10_000);
    match ledger.apply_checkout(&user_id, amount, "stripe-checkout") {
        Ok(tx) => tracing::info!(
            "Applied checkout {} to user {} ({})",
            object.id,
            user_id,
            tx.amount
        ),
        Err(e) => tracing::warn!("Failed to apply checkout {}: {}", object.id, e),
    }

    Json(WebhookAck { received: true })
}
