// src/config/mod.rs
//! Analyzer configuration: TOML file + environment.
//!
//! Lookup order:
//! 1) $ANALYZER_CONFIG_PATH (must exist)
//! 2) config/analyzer.toml
//! 3) built-in defaults
//!
//! `DATABASE_URL` overrides `database_url` in every case.

pub mod provider;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub use provider::ProviderConfig;

use crate::attributes::ProviderId;
use provider::ProviderFile;

pub const DEFAULT_CONFIG_PATH: &str = "config/analyzer.toml";
pub const ENV_CONFIG_PATH: &str = "ANALYZER_CONFIG_PATH";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// 10 MiB.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DATABASE_URL: &str = "sqlite://analyzer.db?mode=rwc";

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Per-image size limit enforced by the validator.
    pub max_image_bytes: u64,
    /// Timeout for size checks and downloading product images.
    pub download_timeout_secs: u64,
    /// sqlx URL, or `"memory"` for the in-process store.
    pub database_url: String,
    pub color: ProviderConfig,
    pub gemini: ProviderConfig,
    pub llama: ProviderConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            color: ProviderConfig::defaults_for(ProviderId::Cloud),
            gemini: ProviderConfig::defaults_for(ProviderId::Gemini),
            llama: ProviderConfig::defaults_for(ProviderId::Llama),
        }
    }
}

/// On-disk shape; every field optional so partial files work.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    max_image_bytes: Option<u64>,
    download_timeout_secs: Option<u64>,
    database_url: Option<String>,
    #[serde(default)]
    color: ProviderFile,
    #[serde(default)]
    gemini: ProviderFile,
    #[serde(default)]
    llama: ProviderFile,
}

impl AnalyzerConfig {
    /// Parse a TOML document and resolve it against defaults + environment.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(s).context("parsing analyzer config")?;
        Ok(Self::resolve(file))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading analyzer config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            return Self::load_from(&pb);
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::load_from(&default_p);
        }
        Ok(Self::resolve(ConfigFile::default()))
    }

    fn resolve(file: ConfigFile) -> Self {
        let defaults = Self::default();

        // Zero limits would reject every image; treat them as unset.
        let max_image_bytes = file
            .max_image_bytes
            .filter(|v| *v > 0)
            .unwrap_or(defaults.max_image_bytes);
        let download_timeout_secs = file
            .download_timeout_secs
            .filter(|v| *v > 0)
            .unwrap_or(defaults.download_timeout_secs);

        let database_url = std::env::var(ENV_DATABASE_URL)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or(file.database_url)
            .unwrap_or(defaults.database_url);

        Self {
            max_image_bytes,
            download_timeout_secs,
            database_url,
            color: file.color.resolve(ProviderId::Cloud),
            gemini: file.gemini.resolve(ProviderId::Gemini),
            llama: file.llama.resolve(ProviderId::Llama),
        }
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::Cloud => &self.color,
            ProviderId::Gemini => &self.gemini,
            ProviderId::Llama => &self.llama,
        }
    }
}
