use super::types::{User, WalletTransaction};
use serde::{Deserialize, Serialize};

// Endpoints
pub const ENDPOINT_ME: &str = "/api/me";
pub const ENDPOINT_WALLET_DEPOSIT: &str = "/api/wallet/deposit";
pub const ENDPOINT_WALLET_WITHDRAW: &str = "/api/wallet/withdraw";
pub const ENDPOINT_STRIPE_CHECKOUT: &str = "/api/stripe/create-checkout-session";
pub const ENDPOINT_STRIPE_WEBHOOK: &str = "/api/stripe/webhook";

/// Header and cookie carrying the opaque session id.
pub const SESSION_HEADER: &str = "x-session-id";
pub const SESSION_COOKIE: &str = "rt_session";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user: User,
    pub wallet_transactions: Vec<WalletTransaction>,
    pub wallet_transactions_total: usize,
}

#[derive(Debug, Deserialize)]
pub struct WalletAmountRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct WalletOpResponse {
    pub user: User,
    pub transaction: WalletTransaction,
}

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    pub id: String,
    pub url: String,
}

/// The subset of a checkout webhook event this service reads.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub object: WebhookObject,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookObject {
    #[serde(default)]
    pub id: String,
    /// Set to the user id when the checkout session was created.
    pub client_reference_id: Option<String>,
    /// Amount captured by the provider, in cents.
    pub amount_total: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
