use crate::domain::ports::{GenerationParams, ModelLoaderBox, TextGenerator};
use crate::domain::topic::Topic;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

/// Returned for every call once the model is known to be unavailable.
pub const UNAVAILABLE_MESSAGE: &str =
    "The explanation service is currently unavailable. Please try again later.";

/// Returned when a generation attempt fails or times out.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I encountered an error while generating the explanation.";

pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

enum ModelSlot {
    Ready(Arc<dyn TextGenerator>),
    Unavailable,
}

/// Builds the instruction sent to the model for a topic.
pub fn build_prompt(topic: &Topic) -> String {
    format!(
        "Explain the real-world importance of {topic} in one engaging paragraph. \
         Connect it to modern careers, hobbies, or global challenges. \
         Write in a motivational tone for high school students."
    )
}

/// Owns the single text-generation model of the process.
///
/// The model is loaded on first use. Concurrent first callers wait on the
/// same load instead of starting their own. A failed load is remembered for
/// the lifetime of the engine and is never retried.
pub struct InferenceEngine {
    loader: ModelLoaderBox,
    slot: OnceCell<ModelSlot>,
    params: GenerationParams,
    timeout: Duration,
}

impl InferenceEngine {
    pub fn new(loader: ModelLoaderBox) -> Self {
        Self::with_timeout(loader, DEFAULT_GENERATION_TIMEOUT)
    }

    pub fn with_timeout(loader: ModelLoaderBox, timeout: Duration) -> Self {
        Self {
            loader,
            slot: OnceCell::new(),
            params: GenerationParams::default(),
            timeout,
        }
    }

    /// Whether a model has been loaded successfully. Never triggers a load.
    pub fn is_loaded(&self) -> bool {
        matches!(self.slot.get(), Some(ModelSlot::Ready(_)))
    }

    async fn model(&self) -> Option<&Arc<dyn TextGenerator>> {
        let slot = self
            .slot
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(model) => ModelSlot::Ready(model),
                    Err(e) => {
                        error!(error = %e, "AI model failed to load; explanations disabled");
                        ModelSlot::Unavailable
                    }
                }
            })
            .await;

        match slot {
            ModelSlot::Ready(model) => Some(model),
            ModelSlot::Unavailable => None,
        }
    }

    /// Produces an explanation of `topic`.
    ///
    /// Never fails: an unavailable model yields [`UNAVAILABLE_MESSAGE`], a
    /// failed or overdue generation yields [`APOLOGY_MESSAGE`].
    pub async fn explain(&self, topic: &Topic) -> String {
        let Some(model) = self.model().await else {
            return UNAVAILABLE_MESSAGE.to_string();
        };

        let prompt = build_prompt(topic);
        match tokio::time::timeout(self.timeout, model.generate(&prompt, &self.params)).await {
            Ok(Ok(outputs)) => match outputs.into_iter().next().map(|t| t.trim().to_string()) {
                Some(text) if !text.is_empty() => {
                    info!(topic_len = topic.as_str().len(), "Explanation generated");
                    text
                }
                _ => {
                    warn!("Model returned no text");
                    APOLOGY_MESSAGE.to_string()
                }
            },
            Ok(Err(e)) => {
                error!(error = %e, "AI error");
                APOLOGY_MESSAGE.to_string()
            }
            Err(_) => {
                error!(timeout_secs = self.timeout.as_secs(), "AI generation timed out");
                APOLOGY_MESSAGE.to_string()
            }
        }
    }
}
