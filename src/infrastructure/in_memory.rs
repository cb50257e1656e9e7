use crate::domain::payment::{PaymentInvoice, PaymentRecord, PaymentState};
use crate::domain::ports::{PaymentStore, QueryStore};
use crate::domain::topic::TopicQuery;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory query log.
///
/// Used when no database is configured and in tests.
#[derive(Default, Clone)]
pub struct InMemoryQueryStore {
    queries: Arc<RwLock<Vec<TopicQuery>>>,
}

impl InMemoryQueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn queries(&self) -> Vec<TopicQuery> {
        self.queries.read().await.clone()
    }
}

#[async_trait]
impl QueryStore for InMemoryQueryStore {
    async fn append(&self, query: TopicQuery) -> Result<()> {
        self.queries.write().await.push(query);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// A thread-safe in-memory store for invoices and payment records.
///
/// Each conditional operation runs under a single write lock, which gives
/// the same atomicity a unique key and a conditional update give in SQL.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    invoices: Arc<RwLock<HashMap<String, PaymentInvoice>>>,
    records: Arc<RwLock<HashMap<String, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn open_invoice(&self, invoice: PaymentInvoice) -> Result<bool> {
        let mut invoices = self.invoices.write().await;
        match invoices.entry(invoice.invoice_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(invoice);
                Ok(true)
            }
        }
    }

    async fn get_invoice(&self, invoice_id: &str) -> Result<Option<PaymentInvoice>> {
        let invoices = self.invoices.read().await;
        Ok(invoices.get(invoice_id).cloned())
    }

    async fn advance_invoice(
        &self,
        invoice_id: &str,
        state: PaymentState,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut invoices = self.invoices.write().await;
        match invoices.get_mut(invoice_id) {
            Some(invoice) if invoice.state == PaymentState::Pending => {
                invoice.state = state;
                invoice.last_checked_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn touch_invoice(&self, invoice_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut invoices = self.invoices.write().await;
        if let Some(invoice) = invoices.get_mut(invoice_id) {
            invoice.last_checked_at = at;
        }
        Ok(())
    }

    async fn insert_record(&self, record: PaymentRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(true)
            }
        }
    }

    async fn get_record(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.get(transaction_id).cloned())
    }

    async fn all_records(&self) -> Result<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        Ok(records.values().cloned().collect())
    }
}
