use crate::domain::payment::{
    Amount, Currency, PaymentInvoice, PaymentRecord, PaymentState, TransitionPayload,
    check_invoice_id,
};
use crate::domain::ports::PaymentStoreBox;
use crate::error::Result;
use chrono::Utc;
use tracing::{debug, info};

/// What a single `apply_transition` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The invoice is complete and this call wrote its payment record.
    Recorded,
    /// The invoice is complete and its record already existed.
    AlreadyRecorded,
    /// The invoice ended in a terminal state that carries no record.
    Closed(PaymentState),
    /// The invoice is still awaiting confirmation.
    Pending,
    /// The invoice was already terminal in another state; the observation was dropped.
    Ignored { current: PaymentState },
    /// No such invoice is tracked and the observation does not describe a real one.
    Untracked(PaymentState),
}

/// Merges poll results and webhook events into one payment record per invoice.
///
/// Both delivery paths call [`PaymentReconciler::apply_transition`]. The
/// store's compare-and-set on the invoice state serializes competing
/// transitions for one invoice, and its unique insert makes a losing
/// second writer of the record a no-op.
pub struct PaymentReconciler {
    store: PaymentStoreBox,
    default_amount: Amount,
    currency: Currency,
}

impl PaymentReconciler {
    pub fn new(store: PaymentStoreBox, default_amount: Amount, currency: Currency) -> Self {
        Self {
            store,
            default_amount,
            currency,
        }
    }

    /// Registers a freshly initiated invoice in `Pending`.
    pub async fn open(&self, invoice: PaymentInvoice) -> Result<()> {
        check_invoice_id(&invoice.invoice_id)?;
        let invoice_id = invoice.invoice_id.clone();
        if self.store.open_invoice(invoice).await? {
            info!(invoice_id = %invoice_id, "Invoice opened");
        }
        Ok(())
    }

    pub async fn invoice(&self, invoice_id: &str) -> Result<Option<PaymentInvoice>> {
        self.store.get_invoice(invoice_id).await
    }

    pub async fn record(&self, transaction_id: &str) -> Result<Option<PaymentRecord>> {
        self.store.get_record(transaction_id).await
    }

    pub async fn records(&self) -> Result<Vec<PaymentRecord>> {
        self.store.all_records().await
    }

    /// Applies an observed state to an invoice.
    ///
    /// Idempotent and order-independent: duplicates and stale observations
    /// are dropped, and a payment record is written at most once, on the
    /// first observation of `Complete`.
    pub async fn apply_transition(
        &self,
        invoice_id: &str,
        new_state: PaymentState,
        payload: &TransitionPayload,
    ) -> Result<Transition> {
        check_invoice_id(invoice_id)?;
        let now = Utc::now();
        let Some(invoice) = self.ensure_invoice(invoice_id, new_state, payload).await? else {
            debug!(invoice_id, state = %new_state, "Observation for untracked invoice dropped");
            return Ok(Transition::Untracked(new_state));
        };

        if new_state == PaymentState::Pending {
            if invoice.state.is_terminal() {
                debug!(invoice_id, current = %invoice.state, "Stale pending observation dropped");
                return Ok(Transition::Ignored {
                    current: invoice.state,
                });
            }
            self.store.touch_invoice(invoice_id, now).await?;
            return Ok(Transition::Pending);
        }

        let advanced = self.store.advance_invoice(invoice_id, new_state, now).await?;
        let current = if advanced {
            info!(invoice_id, state = %new_state, "Invoice state advanced");
            new_state
        } else {
            self.store
                .get_invoice(invoice_id)
                .await?
                .map_or(invoice.state, |i| i.state)
        };

        if current != new_state {
            info!(
                invoice_id,
                current = %current,
                observed = %new_state,
                "Invoice already terminal; transition ignored"
            );
            return Ok(Transition::Ignored { current });
        }

        match new_state {
            // Retried even when another caller advanced the state, so a record
            // lost to an earlier write failure is still produced.
            PaymentState::Complete => self.record_completion(&invoice).await,
            other => Ok(Transition::Closed(other)),
        }
    }

    /// Returns the stored invoice, creating it from the payload when the
    /// observation describes a real gateway invoice. An `Error` observation
    /// never creates one.
    async fn ensure_invoice(
        &self,
        invoice_id: &str,
        observed: PaymentState,
        payload: &TransitionPayload,
    ) -> Result<Option<PaymentInvoice>> {
        if let Some(invoice) = self.store.get_invoice(invoice_id).await? {
            return Ok(Some(invoice));
        }
        if observed == PaymentState::Error {
            return Ok(None);
        }

        let amount = payload
            .amount
            .and_then(|a| Amount::new(a).ok())
            .unwrap_or(self.default_amount);
        let mut invoice = PaymentInvoice::pending(
            invoice_id,
            payload.email.clone().unwrap_or_default(),
            payload.phone.as_deref().unwrap_or_default(),
            amount,
            self.currency,
        );
        if payload.phone.is_none() {
            invoice.payer_phone.clear();
        }

        if self.store.open_invoice(invoice.clone()).await? {
            info!(invoice_id, "Invoice first seen through a notification");
        }
        Ok(Some(
            self.store.get_invoice(invoice_id).await?.unwrap_or(invoice),
        ))
    }

    async fn record_completion(&self, invoice: &PaymentInvoice) -> Result<Transition> {
        let record = PaymentRecord::completed(invoice);
        if self.store.insert_record(record).await? {
            info!(invoice_id = %invoice.invoice_id, amount = %invoice.amount.value(), "Payment recorded");
            Ok(Transition::Recorded)
        } else {
            debug!(invoice_id = %invoice.invoice_id, "Payment already recorded");
            Ok(Transition::AlreadyRecorded)
        }
    }
}
