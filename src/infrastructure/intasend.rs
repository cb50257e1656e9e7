use crate::config::GatewayConfig;
use crate::domain::payment::{PaymentState, normalize_phone};
use crate::domain::ports::{GatewayStatus, PaymentGateway, PaymentRequest};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const LIVE_BASE_URL: &str = "https://payment.intasend.com";
pub const SANDBOX_BASE_URL: &str = "https://sandbox.intasend.com";

const STK_PUSH_PATH: &str = "api/v1/payment/mpesa-stk-push/";
const STATUS_PATH: &str = "api/v1/payment/status/";
const CONNECT_TIMEOUT_SECS: u64 = 5;
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize)]
struct StkPushBody<'a> {
    public_key: &'a str,
    currency: &'a str,
    method: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    amount: Decimal,
    phone_number: &'a str,
    email: &'a str,
    api_ref: &'a str,
}

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    public_key: &'a str,
    invoice_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct InvoiceEnvelope {
    invoice: Option<InvoiceBody>,
}

#[derive(Debug, Deserialize)]
struct InvoiceBody {
    invoice_id: Option<String>,
    state: Option<String>,
    value: Option<Decimal>,
    account: Option<String>,
}

/// Push-payment adapter for the IntaSend M-PESA API.
///
/// Constructed even without credentials so the rest of the service can
/// report it as unconfigured instead of failing to start.
pub struct IntaSendGateway {
    client: Client,
    base_url: String,
    publishable_key: Option<String>,
    secret_key: Option<String>,
}

impl IntaSendGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let base_url = if config.sandbox {
            SANDBOX_BASE_URL
        } else {
            LIVE_BASE_URL
        };
        Self::with_base_url(config, base_url)
    }

    pub fn with_base_url(config: &GatewayConfig, base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout())
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        let (publishable_key, secret_key) = match config.credentials() {
            Some((public, secret)) => {
                info!(base_url, "Payment gateway configured");
                (Some(public.to_string()), Some(secret.to_string()))
            }
            None => {
                warn!("Missing IntaSend keys. Payment initiation is disabled.");
                (None, None)
            }
        };

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            publishable_key,
            secret_key,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn keys(&self) -> Result<(&str, &str)> {
        match (&self.publishable_key, &self.secret_key) {
            (Some(public), Some(secret)) => Ok((public.as_str(), secret.as_str())),
            _ => Err(ServiceError::Unavailable(
                "Payment service not configured".to_string(),
            )),
        }
    }

    fn truncate(body: &str) -> String {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}

#[async_trait]
impl PaymentGateway for IntaSendGateway {
    fn is_configured(&self) -> bool {
        self.keys().is_ok()
    }

    fn publishable_key(&self) -> Option<&str> {
        self.publishable_key.as_deref()
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<String> {
        let (public_key, secret_key) = self.keys()?;
        let phone = normalize_phone(&request.phone);
        let api_ref = uuid::Uuid::new_v4().to_string();
        let body = StkPushBody {
            public_key,
            currency: request.currency.as_str(),
            method: "M-PESA",
            amount: request.amount.value(),
            phone_number: &phone,
            email: &request.email,
            api_ref: &api_ref,
        };

        debug!(api_ref = %api_ref, "Sending STK push request");
        let response = self
            .client
            .post(self.api_url(STK_PUSH_PATH))
            .bearer_auth(secret_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::Gateway(format!(
                "{status}: {}",
                Self::truncate(&text)
            )));
        }

        let envelope: InvoiceEnvelope = response
            .json()
            .await
            .map_err(|e| ServiceError::Gateway(format!("Unexpected response: {e}")))?;

        envelope
            .invoice
            .and_then(|invoice| invoice.invoice_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ServiceError::Gateway("Response did not include an invoice id".to_string()))
    }

    async fn fetch_status(&self, invoice_id: &str) -> Result<GatewayStatus> {
        let (public_key, secret_key) = self.keys()?;

        let response = match self
            .client
            .post(self.api_url(STATUS_PATH))
            .bearer_auth(secret_key)
            .json(&StatusBody {
                public_key,
                invoice_id,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(invoice_id, error = %e, "Status request failed");
                return Ok(GatewayStatus::transient_error());
            }
        };

        let status = response.status();
        if is_transient(status) {
            warn!(invoice_id, %status, "Gateway unavailable while fetching status");
            return Ok(GatewayStatus::transient_error());
        }
        if !status.is_success() {
            warn!(invoice_id, %status, "Gateway rejected status request");
            return Ok(GatewayStatus::reported(PaymentState::Error, None, None));
        }

        let envelope: InvoiceEnvelope = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) if e.is_timeout() => {
                warn!(invoice_id, error = %e, "Status response timed out");
                return Ok(GatewayStatus::transient_error());
            }
            Err(e) => {
                warn!(invoice_id, error = %e, "Unrecognized status response");
                return Ok(GatewayStatus::reported(PaymentState::Error, None, None));
            }
        };

        Ok(status_from_envelope(envelope))
    }
}

/// Statuses that say nothing about the invoice itself.
fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
}

fn status_from_envelope(envelope: InvoiceEnvelope) -> GatewayStatus {
    match envelope.invoice {
        Some(invoice) => {
            let state = invoice
                .state
                .as_deref()
                .map_or(PaymentState::Error, PaymentState::from_gateway);
            GatewayStatus::reported(state, invoice.value, invoice.account)
        }
        None => GatewayStatus::reported(PaymentState::Error, None, None),
    }
}
