use crate::domain::ports::{QueryStore, QueryStoreBox};
use crate::domain::topic::{Topic, TopicQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort persistence of explained topics.
///
/// Writes run on their own task. A failed or slow write is logged and
/// dropped; it never reaches the caller, whose explanation has already been
/// computed.
#[derive(Clone)]
pub struct QueryLog {
    store: Arc<dyn QueryStore>,
    write_timeout: Duration,
}

impl QueryLog {
    pub fn new(store: QueryStoreBox) -> Self {
        Self::with_timeout(store, DEFAULT_WRITE_TIMEOUT)
    }

    pub fn with_timeout(store: QueryStoreBox, write_timeout: Duration) -> Self {
        Self {
            store: Arc::from(store),
            write_timeout,
        }
    }

    /// Starts the write and returns without waiting for it.
    pub fn record(&self, topic: &Topic, response: &str) -> JoinHandle<()> {
        let query = TopicQuery::new(topic, response);
        let store = Arc::clone(&self.store);
        let write_timeout = self.write_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(write_timeout, store.append(query)).await {
                Ok(Ok(())) => debug!("Topic query logged"),
                Ok(Err(e)) => error!(error = %e, "DB error while logging topic query"),
                Err(_) => warn!(
                    timeout_secs = write_timeout.as_secs(),
                    "Topic query log write timed out"
                ),
            }
        })
    }

    /// Opens and releases one connection to the underlying store.
    pub async fn check_connection(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "DB connection error");
                false
            }
        }
    }
}
