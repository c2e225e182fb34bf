// src/config/provider.rs
use serde::Deserialize;
use std::env;

use crate::attributes::ProviderId;

/// Resolved settings for one provider adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Empty when no key could be resolved; the adapter then fails every call.
    pub api_key: String,
    /// Model identifier; also reported in `model_info`.
    pub model: String,
    /// API root without trailing slash.
    pub api_base: String,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    /// Gemini only: send re-encoded payloads instead of image URLs.
    pub inline_images: bool,
}

/// On-disk shape of a `[color]` / `[gemini]` / `[llama]` section.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ProviderFile {
    /// Literal key, or "ENV" to read it from the provider's env vars.
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    connect_timeout_secs: Option<u64>,
    timeout_secs: Option<u64>,
    inline_images: Option<bool>,
}

/// Env vars consulted for a key, first non-empty wins.
pub fn api_key_env_vars(id: ProviderId) -> &'static [&'static str] {
    match id {
        ProviderId::Cloud => &["GOOGLE_VISION_API_KEY"],
        ProviderId::Gemini => &["GEMINI_API_KEY", "GEMINI_API"],
        ProviderId::Llama => &["GROQ_API_KEY", "GROQ_API"],
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn key_from_env(id: ProviderId) -> String {
    api_key_env_vars(id)
        .iter()
        .find_map(|name| non_empty_env(name))
        .unwrap_or_default()
}

impl ProviderConfig {
    /// Built-in defaults; the API key comes from the environment.
    pub fn defaults_for(id: ProviderId) -> Self {
        let (model, api_base, timeout_secs) = match id {
            ProviderId::Cloud => ("Google Cloud Vision", "https://vision.googleapis.com/v1", 30),
            ProviderId::Gemini => (
                "gemini-2.5-flash",
                "https://generativelanguage.googleapis.com/v1beta",
                60,
            ),
            ProviderId::Llama => (
                "meta-llama/llama-4-scout-17b-16e-instruct",
                "https://api.groq.com/openai/v1",
                60,
            ),
        };
        Self {
            api_key: key_from_env(id),
            model: model.to_string(),
            api_base: api_base.to_string(),
            connect_timeout_secs: 4,
            timeout_secs,
            inline_images: false,
        }
    }
}

impl ProviderFile {
    pub(crate) fn resolve(self, id: ProviderId) -> ProviderConfig {
        let d = ProviderConfig::defaults_for(id);

        let api_key = match self.api_key {
            Some(k) if k.trim().eq_ignore_ascii_case("env") => d.api_key,
            Some(k) => k.trim().to_string(),
            None => d.api_key,
        };

        ProviderConfig {
            api_key,
            model: self
                .model
                .map(|m| m.trim().to_string())
                .filter(|m| !m.is_empty())
                .unwrap_or(d.model),
            api_base: self
                .api_base
                .map(|b| b.trim().trim_end_matches('/').to_string())
                .filter(|b| !b.is_empty())
                .unwrap_or(d.api_base),
            connect_timeout_secs: self
                .connect_timeout_secs
                .filter(|v| *v > 0)
                .unwrap_or(d.connect_timeout_secs),
            timeout_secs: self
                .timeout_secs
                .filter(|v| *v > 0)
                .unwrap_or(d.timeout_secs),
            inline_images: self.inline_images.unwrap_or(d.inline_images),
        }
    }
}
