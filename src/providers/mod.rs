//! Provider adapters: one trait, three remote implementations, one canned mock.
//!
//! Adapters return the provider's raw answer untouched; turning it into
//! attributes is the normalizer's job. Timing covers the remote call only.

pub mod color;
pub mod gemini;
pub mod groq;
pub mod mock;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::acquire::ImagePayload;
use crate::attributes::{PerProvider, ProviderId};
use crate::config::{AnalyzerConfig, ProviderConfig};
use crate::error::ProviderError;

pub use color::CloudVisionProvider;
pub use gemini::GeminiProvider;
pub use groq::GroqLlamaProvider;
pub use mock::{FailingProvider, StaticProvider};

const USER_AGENT: &str = concat!("garment-analyzer/", env!("CARGO_PKG_VERSION"));

/// Env switch for local runs without provider credentials.
pub const ENV_PROVIDER_MODE: &str = "PROVIDER_TEST_MODE";

/// What the provider said, before any interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Text(String),
    Structured(Value),
}

/// Everything an adapter may look at. Shared read-only across the three adapters.
#[derive(Debug, Clone, Default)]
pub struct ProviderInput {
    /// Re-encoded JPEG payloads (may hold fewer than 4).
    pub images: Vec<ImagePayload>,
    /// The normalized source URLs, always 4 after validation.
    pub urls: Vec<String>,
}

/// A successful, timed adapter call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider: ProviderId,
    pub raw: RawOutput,
    pub elapsed_ms: f64,
}

#[async_trait]
pub trait AttributeProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Reported in `model_info`.
    fn model_name(&self) -> &str;

    /// One remote call, no retries.
    async fn call(&self, input: &ProviderInput) -> Result<RawOutput, ProviderError>;

    /// `call` plus wall-clock timing around it.
    async fn invoke(&self, input: &ProviderInput) -> Result<ProviderResult, ProviderError> {
        let started = Instant::now();
        let raw = self.call(input).await?;
        Ok(ProviderResult {
            provider: self.id(),
            raw,
            elapsed_ms: round_ms(started.elapsed()),
        })
    }
}

pub type DynProvider = Arc<dyn AttributeProvider>;

/// The three adapters, one slot each.
pub type ProviderSet = PerProvider<DynProvider>;

/// Milliseconds rounded to two decimals.
pub fn round_ms(d: Duration) -> f64 {
    (d.as_secs_f64() * 100_000.0).round() / 100.0
}

pub(crate) fn http_client(cfg: &ProviderConfig) -> anyhow::Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(cfg.connect_timeout_secs))
        .timeout(Duration::from_secs(cfg.timeout_secs))
        .build()?;
    Ok(client)
}

/// Turn a non-2xx response into `ProviderError::Status` with a short body excerpt.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        status: status.as_u16(),
        body: body.chars().take(300).collect(),
    })
}

/// Factory: build the adapters from config and environment.
///
/// * `PROVIDER_TEST_MODE=mock` → deterministic canned answers.
/// * otherwise the three real HTTP adapters.
pub fn build_providers(cfg: &AnalyzerConfig) -> anyhow::Result<ProviderSet> {
    let mock = std::env::var(ENV_PROVIDER_MODE)
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false);
    if mock {
        info!("provider mode: mock");
        return Ok(mock::mock_set());
    }

    for id in ProviderId::ALL {
        let p = cfg.provider(id);
        // Key length only; never log the key.
        info!(provider = %id, model = %p.model, key_len = p.api_key.len(), "provider configured");
    }

    Ok(PerProvider {
        gemini: Arc::new(GeminiProvider::new(cfg.gemini.clone())?),
        cloud: Arc::new(CloudVisionProvider::new(cfg.color.clone())?),
        llama: Arc::new(GroqLlamaProvider::new(cfg.llama.clone())?),
    })
}
