//! Canned providers for local runs (`PROVIDER_TEST_MODE=mock`) and tests.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{AttributeProvider, ProviderInput, ProviderSet, RawOutput};
use crate::attributes::{PerProvider, ProviderId};
use crate::error::ProviderError;

/// Always answers with the same raw output, optionally after a delay.
pub struct StaticProvider {
    id: ProviderId,
    model: String,
    output: RawOutput,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(id: ProviderId, model: &str, output: RawOutput) -> Self {
        Self {
            id,
            model: model.to_string(),
            output,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text(id: ProviderId, model: &str, text: &str) -> Self {
        Self::new(id, model, RawOutput::Text(text.to_string()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttributeProvider for StaticProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn call(&self, _input: &ProviderInput) -> Result<RawOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        Ok(self.output.clone())
    }
}

/// Always fails, as a provider outage would.
pub struct FailingProvider {
    id: ProviderId,
    model: String,
}

impl FailingProvider {
    pub fn new(id: ProviderId, model: &str) -> Self {
        Self {
            id,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl AttributeProvider for FailingProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn call(&self, _input: &ProviderInput) -> Result<RawOutput, ProviderError> {
        Err(ProviderError::Response(format!("{} unavailable", self.id)))
    }
}

/// Deterministic set used by `PROVIDER_TEST_MODE=mock`.
pub fn mock_set() -> ProviderSet {
    PerProvider {
        gemini: Arc::new(StaticProvider::text(
            ProviderId::Gemini,
            "mock-gemini",
            r#"{"category":"t-shirt","brand":"unknown","material":"cotton jersey","condition":"like_new","style":"casual","gender":"unisex","season":"summer","pattern":"solid","fit":"regular"}"#,
        )),
        cloud: Arc::new(StaticProvider::new(
            ProviderId::Cloud,
            "mock-cloud-vision",
            RawOutput::Structured(json!({"color": "white"})),
        )),
        llama: Arc::new(StaticProvider::text(
            ProviderId::Llama,
            "mock-llama",
            r#"{"sleeve_length":"short sleeve","neckline":"crew neck","closure_type":"none"}"#,
        )),
    }
}
