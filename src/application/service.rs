use super::inference::InferenceEngine;
use super::query_log::QueryLog;
use super::reconciler::{PaymentReconciler, Transition};
use crate::domain::payment::{
    Amount, Currency, PaymentInvoice, PaymentState, TransitionPayload, check_invoice_id,
};
use crate::domain::ports::{PaymentGatewayBox, PaymentRequest};
use crate::domain::topic::Topic;
use crate::error::{Result, ServiceError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

/// Topic used by the model smoke test.
pub const PROBE_TOPIC: &str = "mathematics";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub topic: String,
    pub relevance: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceFlags {
    pub ai_model_loaded: bool,
    pub payment_configured: bool,
    pub database_configured: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub services: ServiceFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatus {
    pub state: PaymentState,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookCustomer {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

/// A payment notification pushed by the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub customer: Option<WebhookCustomer>,
    #[serde(default)]
    pub challenge: Option<String>,
}

impl WebhookEvent {
    /// The invoice this event is about: `transaction_id`, else `invoice_id`.
    pub fn invoice_id(&self) -> Option<&str> {
        required(self.transaction_id.as_deref()).or_else(|| required(self.invoice_id.as_deref()))
    }

    fn challenge_matches(&self, expected: &str) -> bool {
        self.challenge
            .as_deref()
            .is_some_and(|given| bool::from(given.as_bytes().ct_eq(expected.as_bytes())))
    }

    /// The state this event reports, if it reports one this service acts on.
    pub fn reported_state(&self) -> Option<PaymentState> {
        let from_event = self.event.as_deref().and_then(|event| {
            match event.trim().to_ascii_lowercase().as_str() {
                "payment.completed" | "payment_completed" | "payment.complete" | "complete"
                | "completed" => Some(PaymentState::Complete),
                "payment.failed" | "payment_failed" | "failed" => Some(PaymentState::Failed),
                _ => None,
            }
        });
        from_event.or_else(|| {
            self.state
                .as_deref()
                .map(PaymentState::from_gateway)
                .filter(|s| *s != PaymentState::Error)
        })
    }

    fn payload(&self) -> TransitionPayload {
        let customer = self.customer.clone().unwrap_or_default();
        TransitionPayload {
            amount: self.amount,
            email: customer.email.filter(|e| !e.is_empty()),
            phone: customer.phone_number.filter(|p| !p.is_empty()),
        }
    }
}

/// Settings the orchestrator needs besides its components.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub price: Amount,
    pub currency: Currency,
    pub database_configured: bool,
    pub webhook_challenge: Option<String>,
}

/// Composes inference, query logging and the payment flow into the
/// operations exposed at the service boundary.
pub struct PremiumService {
    inference: InferenceEngine,
    query_log: QueryLog,
    gateway: PaymentGatewayBox,
    reconciler: PaymentReconciler,
    settings: ServiceSettings,
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl PremiumService {
    pub fn new(
        inference: InferenceEngine,
        query_log: QueryLog,
        gateway: PaymentGatewayBox,
        reconciler: PaymentReconciler,
        settings: ServiceSettings,
    ) -> Self {
        if settings.webhook_challenge.is_none() {
            warn!("No webhook challenge configured; inbound webhooks are trusted unverified");
        }
        Self {
            inference,
            query_log,
            gateway,
            reconciler,
            settings,
        }
    }

    pub fn price(&self) -> Amount {
        self.settings.price
    }

    pub fn currency(&self) -> Currency {
        self.settings.currency
    }

    pub fn publishable_key(&self) -> Option<&str> {
        self.gateway.publishable_key()
    }

    pub fn reconciler(&self) -> &PaymentReconciler {
        &self.reconciler
    }

    /// Explains a topic and logs the pair. Fails only when the topic is missing.
    pub async fn explain(&self, topic: Option<&str>) -> Result<Explanation> {
        let topic = Topic::new(topic.unwrap_or_default())?;
        let relevance = self.inference.explain(&topic).await;
        self.query_log.record(&topic, &relevance);
        Ok(Explanation {
            topic: topic.into(),
            relevance,
        })
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            services: ServiceFlags {
                ai_model_loaded: self.inference.is_loaded(),
                payment_configured: self.gateway.is_configured(),
                database_configured: self.settings.database_configured,
            },
        }
    }

    /// Starts a push payment for premium access and returns the invoice id.
    pub async fn initiate_payment(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<String> {
        let (email, phone) = match (required(email), required(phone)) {
            (Some(email), Some(phone)) => (email, phone),
            (None, None) => {
                return Err(ServiceError::Validation(
                    "Email and phone number are required".to_string(),
                ));
            }
            (None, Some(_)) => {
                return Err(ServiceError::Validation("Email is required".to_string()));
            }
            (Some(_), None) => {
                return Err(ServiceError::Validation(
                    "Phone number is required".to_string(),
                ));
            }
        };
        if !self.gateway.is_configured() {
            return Err(ServiceError::Unavailable(
                "Payment service not configured".to_string(),
            ));
        }

        let request = PaymentRequest {
            email: email.to_string(),
            phone: phone.to_string(),
            amount: self.settings.price,
            currency: self.settings.currency,
        };
        let invoice_id = self.gateway.initiate(&request).await?;
        info!(invoice_id = %invoice_id, "Payment initiated");

        let invoice = PaymentInvoice::pending(
            invoice_id.as_str(),
            email,
            phone,
            self.settings.price,
            self.settings.currency,
        );
        // A missing invoice row is rebuilt from the first poll or webhook.
        if let Err(e) = self.reconciler.open(invoice).await {
            error!(invoice_id = %invoice_id, error = %e, "Failed to store initiated invoice");
        }
        Ok(invoice_id)
    }

    /// Polls the gateway and reconciles the reported state.
    pub async fn check_payment_status(&self, invoice_id: &str) -> Result<PaymentStatus> {
        let invoice_id = invoice_id.trim();
        check_invoice_id(invoice_id)?;

        let status = self.gateway.fetch_status(invoice_id).await?;
        if status.transient {
            return Ok(PaymentStatus {
                state: PaymentState::Error,
                amount: status.amount,
            });
        }

        let payload = TransitionPayload {
            amount: status.amount,
            email: status.email.clone(),
            phone: None,
        };
        let transition = self
            .reconciler
            .apply_transition(invoice_id, status.state, &payload)
            .await?;

        let state = match transition {
            Transition::Recorded | Transition::AlreadyRecorded => PaymentState::Complete,
            Transition::Closed(state) => state,
            Transition::Pending => PaymentState::Pending,
            Transition::Ignored { current } => current,
            Transition::Untracked(state) => state,
        };
        Ok(PaymentStatus {
            state,
            amount: status.amount,
        })
    }

    /// Handles a gateway webhook. Never fails: the gateway retries anything
    /// that is not acknowledged, so problems are only logged.
    pub async fn receive_webhook(&self, event: &WebhookEvent) -> Option<Transition> {
        if let Some(expected) = &self.settings.webhook_challenge
            && !event.challenge_matches(expected)
        {
            warn!("Webhook challenge mismatch; event dropped");
            return None;
        }

        let Some(invoice_id) = event.invoice_id() else {
            warn!(event = ?event.event, "Webhook without transaction id dropped");
            return None;
        };
        let Some(state) = event.reported_state() else {
            info!(invoice_id, event = ?event.event, "Webhook event not acted on");
            return None;
        };

        match self
            .reconciler
            .apply_transition(invoice_id, state, &event.payload())
            .await
        {
            Ok(transition) => {
                info!(invoice_id, ?transition, "Webhook reconciled");
                Some(transition)
            }
            Err(e) => {
                error!(invoice_id, error = %e, "Webhook reconciliation failed");
                None
            }
        }
    }

    /// Opens and releases one database connection.
    pub async fn test_database(&self) -> bool {
        self.query_log.check_connection().await
    }

    /// Runs one explanation through the model without logging it.
    pub async fn test_model(&self) -> String {
        match Topic::new(PROBE_TOPIC) {
            Ok(topic) => self.inference.explain(&topic).await,
            Err(e) => e.to_string(),
        }
    }
}
