#![allow(dead_code)]

use async_trait::async_trait;
use careerlens::application::inference::InferenceEngine;
use careerlens::application::query_log::QueryLog;
use careerlens::application::reconciler::PaymentReconciler;
use careerlens::application::service::{PremiumService, ServiceSettings};
use careerlens::domain::payment::{Amount, Currency, PaymentState};
use careerlens::domain::ports::{
    GatewayStatus, GenerationParams, ModelLoader, PaymentGateway, PaymentGatewayBox,
    PaymentRequest, QueryStore, QueryStoreBox, TextGenerator,
};
use careerlens::domain::topic::TopicQuery;
use careerlens::error::{Result, ServiceError};
use careerlens::infrastructure::in_memory::{InMemoryPaymentStore, InMemoryQueryStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MODEL_TEXT: &str = "Statistics powers weather forecasts, sports analytics and medicine.";

/// Model that answers every prompt with the same text, optionally slowly.
pub struct FixedModel {
    pub text: String,
    pub delay: Duration,
}

#[async_trait]
impl TextGenerator for FixedModel {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Vec<String>> {
        tokio::time::sleep(self.delay).await;
        Ok(vec![self.text.clone()])
    }
}

/// Loader that counts how often it is asked to load.
#[derive(Clone)]
pub struct CountingLoader {
    pub loads: Arc<AtomicUsize>,
    pub fail: bool,
    pub load_delay: Duration,
    pub generate_delay: Duration,
}

impl CountingLoader {
    pub fn working() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            fail: false,
            load_delay: Duration::ZERO,
            generate_delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::working()
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self) -> Result<Arc<dyn TextGenerator>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.load_delay).await;
        if self.fail {
            return Err(ServiceError::Unavailable("weights missing".to_string()));
        }
        Ok(Arc::new(FixedModel {
            text: MODEL_TEXT.to_string(),
            delay: self.generate_delay,
        }))
    }
}

/// Gateway whose status answers are set by the test.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    pub configured: bool,
    statuses: Arc<Mutex<HashMap<String, GatewayStatus>>>,
    requests: Arc<Mutex<Vec<PaymentRequest>>>,
    issued: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    pub fn configured() -> Self {
        Self {
            configured: true,
            ..Self::default()
        }
    }

    pub fn set_status(&self, invoice_id: &str, status: GatewayStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(invoice_id.to_string(), status);
        }
    }

    pub fn report(&self, invoice_id: &str, state: PaymentState) {
        self.set_status(
            invoice_id,
            GatewayStatus::reported(state, Some(dec!(20)), None),
        );
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    fn is_configured(&self) -> bool {
        self.configured
    }

    fn publishable_key(&self) -> Option<&str> {
        self.configured.then_some("ISPubKey_test_key")
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<String> {
        if !self.configured {
            return Err(ServiceError::Unavailable(
                "Payment service not configured".to_string(),
            ));
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("INV-{n}"))
    }

    async fn fetch_status(&self, invoice_id: &str) -> Result<GatewayStatus> {
        if !self.configured {
            return Err(ServiceError::Unavailable(
                "Payment service not configured".to_string(),
            ));
        }
        let status = self
            .statuses
            .lock()
            .ok()
            .and_then(|s| s.get(invoice_id).cloned());
        Ok(status.unwrap_or_else(|| {
            GatewayStatus::reported(PaymentState::Pending, Some(dec!(20)), None)
        }))
    }
}

/// Query store whose writes always fail.
pub struct BrokenQueryStore;

#[async_trait]
impl QueryStore for BrokenQueryStore {
    async fn append(&self, _query: TopicQuery) -> Result<()> {
        Err(ServiceError::Persistence("Lost connection to MySQL server".to_string()))
    }

    async fn ping(&self) -> Result<()> {
        Err(ServiceError::Unavailable("connection refused".to_string()))
    }
}

/// Query store whose writes never finish.
pub struct StalledQueryStore;

#[async_trait]
impl QueryStore for StalledQueryStore {
    async fn append(&self, _query: TopicQuery) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<PremiumService>,
    pub queries: InMemoryQueryStore,
    pub gateway: ScriptedGateway,
    pub loader: CountingLoader,
}

impl Harness {
    /// Waits for the background log writes to land, up to two seconds.
    pub async fn logged_queries(&self, expected: usize) -> Vec<TopicQuery> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let queries = self.queries.queries().await;
            if queries.len() >= expected || tokio::time::Instant::now() >= deadline {
                return queries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[derive(Clone, Copy)]
enum QueryBackend {
    InMemory,
    Broken,
    Stalled,
}

pub struct HarnessBuilder {
    loader: CountingLoader,
    gateway: ScriptedGateway,
    live_gateway: Option<PaymentGatewayBox>,
    query_backend: QueryBackend,
    challenge: Option<String>,
    generation_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            loader: CountingLoader::working(),
            gateway: ScriptedGateway::configured(),
            live_gateway: None,
            query_backend: QueryBackend::InMemory,
            challenge: None,
            generation_timeout: Duration::from_secs(5),
        }
    }

    pub fn loader(mut self, loader: CountingLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn gateway(mut self, gateway: ScriptedGateway) -> Self {
        self.gateway = gateway;
        self
    }

    /// Uses a real gateway adapter instead of the scripted one.
    pub fn live_gateway(mut self, gateway: PaymentGatewayBox) -> Self {
        self.live_gateway = Some(gateway);
        self
    }

    pub fn broken_queries(mut self) -> Self {
        self.query_backend = QueryBackend::Broken;
        self
    }

    pub fn stalled_queries(mut self) -> Self {
        self.query_backend = QueryBackend::Stalled;
        self
    }

    pub fn challenge(mut self, challenge: &str) -> Self {
        self.challenge = Some(challenge.to_string());
        self
    }

    pub fn generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn build(self) -> Harness {
        let price = Amount::new(dec!(20)).expect("valid price");
        let queries = InMemoryQueryStore::new();
        let query_store: QueryStoreBox = match self.query_backend {
            QueryBackend::InMemory => Box::new(queries.clone()),
            QueryBackend::Broken => Box::new(BrokenQueryStore),
            QueryBackend::Stalled => Box::new(StalledQueryStore),
        };
        let gateway: PaymentGatewayBox = match self.live_gateway {
            Some(gateway) => gateway,
            None => Box::new(self.gateway.clone()),
        };

        let service = PremiumService::new(
            InferenceEngine::with_timeout(Box::new(self.loader.clone()), self.generation_timeout),
            QueryLog::new(query_store),
            gateway,
            PaymentReconciler::new(Box::new(InMemoryPaymentStore::new()), price, Currency::Kes),
            ServiceSettings {
                price,
                currency: Currency::Kes,
                database_configured: false,
                webhook_challenge: self.challenge,
            },
        );

        Harness {
            service: Arc::new(service),
            queries,
            gateway: self.gateway,
            loader: self.loader,
        }
    }
}

pub fn harness() -> Harness {
    HarnessBuilder::new().build()
}

pub fn price() -> Decimal {
    dec!(20)
}
