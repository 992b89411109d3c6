//! External Checkout Client
//!
//! Thin client for the hosted checkout provider. The service never touches
//! card data; it creates a checkout session, hands the URL to the caller,
//! and later applies the completed event delivered to the webhook endpoint.

use super::protocol::CheckoutSessionResponse;
use crate::config::Config;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

pub struct StripeClient {
    secret_key: Option<String>,
    public_base_url: String,
    http_client: reqwest::Client,
}

impl StripeClient {
    pub fn new(config: &Config) -> Arc<Self> {
        Arc::new(Self {
            secret_key: config.stripe_secret_key.clone(),
            public_base_url: config.public_base_url.clone(),
            http_client: reqwest::Client::new(),
        })
    }

    pub fn enabled(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Creates a hosted checkout session for a wallet top-up.
    ///
    /// `amount_cents` is the charge in cents; `user_id` rides along as the
    /// client reference so the webhook can credit the right wallet.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        amount_cents: i64,
    ) -> Result<CheckoutSessionResponse> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("checkout provider not configured"))?;

        let amount = amount_cents.to_string();
        let success_url = format!("{}/wallet?checkout=success", self.public_base_url);
        let cancel_url = format!("{}/wallet?checkout=cancelled", self.public_base_url);
        let params: Vec<(&str, &str)> = vec![
            ("mode", "payment"),
            ("client_reference_id", user_id),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", "Wallet credit"),
            ("line_items[0][price_data][unit_amount]", &amount),
            ("line_items[0][quantity]", "1"),
            ("success_url", &success_url),
            ("cancel_url", &cancel_url),
        ];

        let response = self
            .post_form_with_retry(
                CHECKOUT_SESSIONS_URL,
                secret_key,
                &params,
                Duration::from_secs(10),
                3,
            )
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Checkout session creation failed: {}",
                response.status()
            ));
        }

        let session: CheckoutSessionResponse = response.json().await?;
        Ok(session)
    }

    async fn post_form_with_retry(
        &self,
        url: &str,
        secret_key: &str,
        params: &[(&str, &str)],
        timeout: Duration,
        attempts: usize,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..attempts {
            let response = self
                .http_client
                .post(url)
                .basic_auth(secret_key, None::<&str>)
                .form(params)
                .timeout(timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == attempts {
                        return Err(anyhow::anyhow!(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(anyhow::anyhow!("Retry attempts exhausted"))
    }
}
