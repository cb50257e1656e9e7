use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dialing code prepended to local mobile numbers.
pub const COUNTRY_CODE: &str = "254";

/// Longest invoice id that fits the stored key columns.
pub const MAX_INVOICE_ID_LEN: usize = 64;

/// Lifecycle state of a single push-payment invoice.
///
/// `Pending` is the only non-terminal state. Once an invoice reaches
/// `Complete`, `Failed` or `Error` it never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentState {
    Pending,
    Complete,
    Failed,
    Error,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentState::Pending)
    }

    /// Maps the gateway's raw status vocabulary onto the canonical states.
    ///
    /// Anything unrecognized becomes `Error`, never `Pending`.
    pub fn from_gateway(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "PROCESSING" => PaymentState::Pending,
            "COMPLETE" | "COMPLETED" => PaymentState::Complete,
            "FAILED" | "CANCELLED" | "CANCELED" => PaymentState::Failed,
            _ => PaymentState::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentState::Pending => "PENDING",
            PaymentState::Complete => "COMPLETE",
            PaymentState::Failed => "FAILED",
            PaymentState::Error => "ERROR",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentState::Pending),
            "COMPLETE" => Ok(PaymentState::Complete),
            "FAILED" => Ok(PaymentState::Failed),
            "ERROR" => Ok(PaymentState::Error),
            other => Err(ServiceError::Persistence(format!(
                "Unknown payment state: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Kes,
    Usd,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Kes => "KES",
            Currency::Usd => "USD",
        }
    }
}

impl FromStr for Currency {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "KES" => Ok(Currency::Kes),
            "USD" => Ok(Currency::Usd),
            other => Err(ServiceError::Persistence(format!(
                "Unknown currency: {other}"
            ))),
        }
    }
}

/// A strictly positive monetary amount.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ServiceError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ServiceError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ServiceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Normalizes a mobile number to the single international form the gateway expects.
///
/// A leading `0` is replaced by the country code, numbers already carrying the
/// country code pass through, anything else gets the country code prepended.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if let Some(local) = digits.strip_prefix('0') {
        format!("{COUNTRY_CODE}{local}")
    } else if digits.starts_with(COUNTRY_CODE) {
        digits
    } else {
        format!("{COUNTRY_CODE}{digits}")
    }
}

/// Rejects invoice ids that are blank or longer than [`MAX_INVOICE_ID_LEN`] characters.
pub fn check_invoice_id(invoice_id: &str) -> Result<(), ServiceError> {
    if invoice_id.trim().is_empty() {
        return Err(ServiceError::Validation("Invoice id is required".to_string()));
    }
    if invoice_id.chars().count() > MAX_INVOICE_ID_LEN {
        return Err(ServiceError::Validation(format!(
            "Invoice id longer than {MAX_INVOICE_ID_LEN} characters"
        )));
    }
    Ok(())
}

/// The gateway's unit of a single payment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInvoice {
    pub invoice_id: String,
    pub payer_email: String,
    pub payer_phone: String,
    pub amount: Amount,
    pub currency: Currency,
    pub state: PaymentState,
    pub last_checked_at: DateTime<Utc>,
}

impl PaymentInvoice {
    /// A freshly initiated invoice awaiting confirmation on the payer's device.
    pub fn pending(
        invoice_id: impl Into<String>,
        payer_email: impl Into<String>,
        payer_phone: &str,
        amount: Amount,
        currency: Currency,
    ) -> Self {
        Self {
            invoice_id: invoice_id.into(),
            payer_email: payer_email.into(),
            payer_phone: normalize_phone(payer_phone),
            amount,
            currency,
            state: PaymentState::Pending,
            last_checked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Completed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Completed => "completed",
        }
    }
}

/// Durable proof of a completed payment. At most one exists per invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payer_email: String,
    pub transaction_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub status: RecordStatus,
    pub recorded_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn completed(invoice: &PaymentInvoice) -> Self {
        Self {
            payer_email: invoice.payer_email.clone(),
            transaction_id: invoice.invoice_id.clone(),
            amount: invoice.amount,
            currency: invoice.currency,
            status: RecordStatus::Completed,
            recorded_at: Utc::now(),
        }
    }
}

/// Details that may accompany a state observation, from a poll or a webhook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionPayload {
    pub amount: Option<Decimal>,
    pub email: Option<String>,
    pub phone: Option<String>,
}
