//! The Analyze operation: validate → acquire → dispatch → merge → persist → respond.

use metrics::counter;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};

use crate::acquire::acquire_images;
use crate::attributes::{CanonicalAttributes, PerProvider};
use crate::config::AnalyzerConfig;
use crate::coordinator::{dispatch, ProviderOutcomes};
use crate::error::{AnalyzeError, StoreError};
use crate::merge::{merge, model_info, ModelInfo, ProcessingMetrics};
use crate::metrics::record_request;
use crate::providers::{build_providers, ProviderInput, ProviderSet};
use crate::store::{open_store, AnalysisRecord, DynStore};
use crate::validate::validate;

const USER_AGENT: &str = concat!("garment-analyzer/", env!("CARGO_PKG_VERSION"));

/// One analyze call: request id plus the raw URL string as the client sent it.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub id: String,
    pub raw: String,
}

/// What the caller gets back. Serializes flat, e.g.
/// `{"status":200,"id":..,"attributes":..}` or `{"status":400,"id":..,"error":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Success {
        status: u16,
        id: String,
        attributes: CanonicalAttributes,
        model_info: PerProvider<ModelInfo>,
        processing: ProcessingMetrics,
    },
    Failure {
        status: u16,
        id: String,
        error: String,
    },
}

impl AnalysisResponse {
    pub fn status(&self) -> u16 {
        match self {
            AnalysisResponse::Success { status, .. } | AnalysisResponse::Failure { status, .. } => {
                *status
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            AnalysisResponse::Success { id, .. } | AnalysisResponse::Failure { id, .. } => id,
        }
    }

    fn from_record(record: AnalysisRecord) -> Self {
        AnalysisResponse::Success {
            status: record.processing.status_code,
            id: record.id,
            attributes: record.attributes,
            model_info: record.model_info,
            processing: record.processing,
        }
    }

    fn from_error(id: String, err: &AnalyzeError) -> Self {
        AnalysisResponse::Failure {
            status: err.status_code(),
            id,
            error: err.to_string(),
        }
    }
}

pub struct Analyzer {
    http: Client,
    max_image_bytes: u64,
    providers: ProviderSet,
    store: DynStore,
}

impl Analyzer {
    /// `http` is used for size checks and downloading product images only; each
    /// provider carries its own client.
    pub fn new(http: Client, max_image_bytes: u64, providers: ProviderSet, store: DynStore) -> Self {
        Self {
            http,
            max_image_bytes,
            providers,
            store,
        }
    }

    /// Build providers, image client and store from config.
    pub async fn from_config(cfg: &AnalyzerConfig) -> anyhow::Result<Self> {
        let providers = build_providers(cfg)?;
        let http = image_client(cfg.download_timeout_secs)?;
        let store = open_store(&cfg.database_url).await?;
        Ok(Self::new(http, cfg.max_image_bytes, providers, store))
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub async fn fetch(&self, id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        self.store.fetch(id).await
    }

    pub async fn analyze(&self, req: AnalysisRequest) -> AnalysisResponse {
        let span = info_span!("analyze", request_id = %req.id);
        let id = req.id.clone();
        let resp = match self.run(req).instrument(span).await {
            Ok(record) => AnalysisResponse::from_record(record),
            Err(e) => {
                match &e {
                    AnalyzeError::MalformedInput { found } => {
                        warn!(request_id = %id, found, "malformed URL set");
                    }
                    AnalyzeError::OversizedOrUnreachableImage { url, reason } => {
                        counter!("images_rejected_total").increment(1);
                        warn!(request_id = %id, %url, %reason, "image set rejected");
                    }
                    AnalyzeError::Persistence { source, .. } => {
                        counter!("persistence_errors_total").increment(1);
                        error!(request_id = %id, error = %source, "failed to store analysis result");
                    }
                }
                AnalysisResponse::from_error(id, &e)
            }
        };
        record_request(resp.status());
        resp
    }

    async fn run(&self, req: AnalysisRequest) -> Result<AnalysisRecord, AnalyzeError> {
        let set = validate(&self.http, &req.raw, self.max_image_bytes).await?;

        let images = acquire_images(&self.http, &set).await;
        if images.len() < set.urls().len() {
            warn!(acquired = images.len(), expected = set.urls().len(), "some images could not be acquired");
        }

        let input = Arc::new(ProviderInput {
            images,
            urls: set.to_strings(),
        });
        let outcomes = dispatch(&self.providers, input).await;

        let record = self.assemble(req.id, &outcomes);
        info!(
            unknown = record.attributes.unknown_keys().len(),
            total_latency_ms = record.processing.total_latency_ms,
            "analysis complete"
        );

        match self.store.insert(&record).await {
            Ok(()) => Ok(record),
            Err(source) => {
                // Not returned to the caller, so keep it in the log.
                error!(record = ?record, "unstored analysis result");
                Err(AnalyzeError::Persistence {
                    id: record.id,
                    source,
                })
            }
        }
    }

    fn assemble(&self, id: String, outcomes: &ProviderOutcomes) -> AnalysisRecord {
        let names = self.providers.map(|_, p| p.model_name().to_string());
        AnalysisRecord {
            id,
            attributes: merge(outcomes),
            model_info: model_info(&names, outcomes),
            processing: ProcessingMetrics::from_outcomes(outcomes),
        }
    }
}

/// Client for image size checks and downloads. Redirects are followed (reqwest default).
pub fn image_client(timeout_secs: u64) -> anyhow::Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}
