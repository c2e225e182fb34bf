// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod acquire;
pub mod api;
pub mod attributes;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod merge;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod store;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::attributes::{AttributeKey, CanonicalAttributes, PerProvider, ProviderId, UNKNOWN};
pub use crate::config::AnalyzerConfig;
pub use crate::error::{AnalyzeError, ProviderError, StoreError};
pub use crate::pipeline::{AnalysisRequest, AnalysisResponse, Analyzer};

use axum::Router;
use tracing::info;

/// Build the full application router from the default config sources
/// (`ANALYZER_CONFIG_PATH`, `config/analyzer.toml`, built-in defaults).
pub async fn app() -> anyhow::Result<Router> {
    let cfg = AnalyzerConfig::load_default()?;
    app_with_config(&cfg).await
}

pub async fn app_with_config(cfg: &AnalyzerConfig) -> anyhow::Result<Router> {
    let metrics = metrics::Metrics::init()?;
    let analyzer = Analyzer::from_config(cfg).await?;
    info!(
        max_image_bytes = cfg.max_image_bytes,
        download_timeout_secs = cfg.download_timeout_secs,
        "analyzer ready"
    );
    Ok(router(AppState::new(analyzer)).merge(metrics.router()))
}
