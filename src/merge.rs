//! Merge the per-provider partial maps into the canonical 13-key record, and
//! derive the model provenance + processing metrics that are stored with it.

use serde::{Deserialize, Serialize};

use crate::attributes::{AttributeKey, CanonicalAttributes, PartialAttributes, PerProvider, ProviderId};
use crate::coordinator::ProviderOutcomes;

/// Fill every key from its owner; everything else stays `"unknown"`.
///
/// A provider can only ever write its own keys, so the result does not depend
/// on the order in which partials arrive.
pub fn merge_partials<'a>(
    parts: impl IntoIterator<Item = (ProviderId, &'a PartialAttributes)>,
) -> CanonicalAttributes {
    let mut out = CanonicalAttributes::all_unknown();
    for (provider, partial) in parts {
        for key in provider.owned_keys() {
            if let Some(v) = partial.get(&key) {
                out.set(key, v.clone());
            }
        }
    }
    out
}

/// Failed providers contribute nothing.
pub fn merge(outcomes: &ProviderOutcomes) -> CanonicalAttributes {
    merge_partials(
        ProviderId::ALL
            .into_iter()
            .filter_map(|id| outcomes.get(id).partial().map(|p| (id, p))),
    )
}

/// Provenance of one provider's share of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_name: String,
    pub latency_ms: f64,
    pub attribute_keys_owned: Vec<AttributeKey>,
}

pub fn model_info(
    model_names: &PerProvider<String>,
    outcomes: &ProviderOutcomes,
) -> PerProvider<ModelInfo> {
    PerProvider::from_fn(|id| ModelInfo {
        model_name: model_names.get(id).clone(),
        latency_ms: outcomes.get(id).elapsed_ms(),
        attribute_keys_owned: id.owned_keys(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub status_code: u16,
    /// Sum of the provider latencies, not wall clock.
    pub total_latency_ms: f64,
    pub per_provider_latency_ms: PerProvider<f64>,
}

impl ProcessingMetrics {
    pub fn from_outcomes(outcomes: &ProviderOutcomes) -> Self {
        let per_provider_latency_ms = outcomes.map(|_, o| o.elapsed_ms());
        let sum = per_provider_latency_ms.gemini
            + per_provider_latency_ms.cloud
            + per_provider_latency_ms.llama;
        Self {
            status_code: 200,
            total_latency_ms: (sum * 100.0).round() / 100.0,
            per_provider_latency_ms,
        }
    }
}
