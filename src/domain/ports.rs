use super::payment::{Amount, Currency, PaymentInvoice, PaymentRecord, PaymentState};
use super::topic::TopicQuery;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Append-only storage for explained topics.
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn append(&self, query: TopicQuery) -> Result<()>;
    /// Acquires and releases one connection to prove the store is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Durable state for invoices and their completion records.
///
/// Implementations must make `advance_invoice` and `insert_record` atomic:
/// the first is a compare-and-set from `Pending`, the second an insert that
/// is a no-op when a record for the same transaction id already exists.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts the invoice unless one with the same id exists. Returns whether it was inserted.
    async fn open_invoice(&self, invoice: PaymentInvoice) -> Result<bool>;
    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<PaymentInvoice>>;
    /// Moves a pending invoice to `state`. Returns `false` if it was not pending.
    async fn advance_invoice(
        &self,
        invoice_id: &str,
        state: PaymentState,
        at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn touch_invoice(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<()>;
    /// Returns `false` if a record for the same transaction id already exists.
    async fn insert_record(&self, record: PaymentRecord) -> Result<bool>;
    async fn get_record(&self, transaction_id: &str) -> Result<Option<PaymentRecord>>;
    async fn all_records(&self) -> Result<Vec<PaymentRecord>>;
}

/// A push-payment request as handed to the gateway adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub email: String,
    pub phone: String,
    pub amount: Amount,
    pub currency: Currency,
}

/// Canonical view of an invoice as reported by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayStatus {
    pub state: PaymentState,
    pub amount: Option<Decimal>,
    pub email: Option<String>,
    /// Set when the state stems from a timeout or transport failure rather
    /// than from a gateway response. Such observations are not applied.
    pub transient: bool,
}

impl GatewayStatus {
    pub fn reported(state: PaymentState, amount: Option<Decimal>, email: Option<String>) -> Self {
        Self {
            state,
            amount,
            email,
            transient: false,
        }
    }

    pub fn transient_error() -> Self {
        Self {
            state: PaymentState::Error,
            amount: None,
            email: None,
            transient: true,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn is_configured(&self) -> bool;
    fn publishable_key(&self) -> Option<&str>;
    /// Triggers the confirmation prompt on the payer's device and returns the invoice id.
    async fn initiate(&self, request: &PaymentRequest) -> Result<String>;
    /// Fails only when the adapter is unconfigured; every other failure is an `Error` status.
    async fn fetch_status(&self, invoice_id: &str) -> Result<GatewayStatus>;
}

/// Fixed sampling configuration for topic explanations.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub do_sample: bool,
    pub max_length: u32,
    pub temperature: f32,
    pub num_return_sequences: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            do_sample: true,
            max_length: 100,
            temperature: 0.7,
            num_return_sequences: 1,
        }
    }
}

/// A loaded text-generation model. Shared read-only across requests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Vec<String>>;
}

/// Performs the expensive, fallible model load.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn TextGenerator>>;
}

pub type QueryStoreBox = Box<dyn QueryStore>;
pub type PaymentStoreBox = Box<dyn PaymentStore>;
pub type PaymentGatewayBox = Box<dyn PaymentGateway>;
pub type ModelLoaderBox = Box<dyn ModelLoader>;
