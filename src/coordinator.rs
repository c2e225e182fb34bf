//! Inference coordinator: run the three adapters concurrently and wait for all
//! of them.
//!
//! Each adapter gets its own task. A failure (error or panic) becomes
//! `ProviderOutcome::Failed` in that provider's slot and never touches the
//! other two. There is no outer timeout; every adapter's HTTP client carries
//! its own.

use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info};

use crate::attributes::{PartialAttributes, PerProvider, ProviderId};
use crate::metrics::{record_provider_failure, record_provider_success};
use crate::normalize::normalize;
use crate::providers::{DynProvider, ProviderInput, ProviderSet};

/// Terminal state of one adapter for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    /// The call returned. `partial` may still be empty if the output did not parse.
    Succeeded {
        partial: PartialAttributes,
        elapsed_ms: f64,
    },
    Failed {
        reason: String,
    },
}

impl ProviderOutcome {
    pub fn partial(&self) -> Option<&PartialAttributes> {
        match self {
            ProviderOutcome::Succeeded { partial, .. } => Some(partial),
            ProviderOutcome::Failed { .. } => None,
        }
    }

    /// Zero for failed providers.
    pub fn elapsed_ms(&self) -> f64 {
        match self {
            ProviderOutcome::Succeeded { elapsed_ms, .. } => *elapsed_ms,
            ProviderOutcome::Failed { .. } => 0.0,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, ProviderOutcome::Succeeded { .. })
    }
}

pub type ProviderOutcomes = PerProvider<ProviderOutcome>;

async fn run_one(slot: ProviderId, provider: DynProvider, input: Arc<ProviderInput>) -> ProviderOutcome {
    match provider.invoke(&input).await {
        Ok(result) => {
            let partial = normalize(slot, &result.raw);
            record_provider_success(slot, result.elapsed_ms);
            info!(
                provider = %slot,
                model = provider.model_name(),
                elapsed_ms = result.elapsed_ms,
                attributes = partial.len(),
                "provider finished"
            );
            ProviderOutcome::Succeeded {
                partial,
                elapsed_ms: result.elapsed_ms,
            }
        }
        Err(e) => {
            record_provider_failure(slot);
            error!(provider = %slot, model = provider.model_name(), error = %e, "provider failed");
            ProviderOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// Spawn all three adapters and join them (full barrier).
pub async fn dispatch(providers: &ProviderSet, input: Arc<ProviderInput>) -> ProviderOutcomes {
    let tasks = ProviderId::ALL.map(|slot| {
        let provider = Arc::clone(providers.get(slot));
        let input = Arc::clone(&input);
        tokio::spawn(run_one(slot, provider, input))
    });
    let joined = join_all(tasks).await;

    let mut outcomes = PerProvider::from_fn(|_| ProviderOutcome::Failed {
        reason: "not dispatched".to_string(),
    });
    for (slot, res) in ProviderId::ALL.into_iter().zip(joined) {
        *outcomes.get_mut(slot) = match res {
            Ok(outcome) => outcome,
            Err(e) => {
                record_provider_failure(slot);
                error!(provider = %slot, error = %e, "provider task aborted");
                ProviderOutcome::Failed {
                    reason: format!("task aborted: {e}"),
                }
            }
        };
    }
    outcomes
}
