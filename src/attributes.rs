//! attributes.rs — canonical attribute keys, provider ids and field ownership.
//!
//! Every response carries exactly 13 attributes. Each key is owned by exactly one
//! provider; nobody else may write it. Anything the owner did not supply reads
//! `"unknown"`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder written for every attribute a provider did not supply.
pub const UNKNOWN: &str = "unknown";

/// The 13 canonical attribute keys, declared in response order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKey {
    Category,
    Brand,
    Color,
    Material,
    Condition,
    Style,
    Gender,
    Season,
    Pattern,
    SleeveLength,
    Neckline,
    ClosureType,
    Fit,
}

impl AttributeKey {
    pub const ALL: [AttributeKey; 13] = [
        AttributeKey::Category,
        AttributeKey::Brand,
        AttributeKey::Color,
        AttributeKey::Material,
        AttributeKey::Condition,
        AttributeKey::Style,
        AttributeKey::Gender,
        AttributeKey::Season,
        AttributeKey::Pattern,
        AttributeKey::SleeveLength,
        AttributeKey::Neckline,
        AttributeKey::ClosureType,
        AttributeKey::Fit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKey::Category => "category",
            AttributeKey::Brand => "brand",
            AttributeKey::Color => "color",
            AttributeKey::Material => "material",
            AttributeKey::Condition => "condition",
            AttributeKey::Style => "style",
            AttributeKey::Gender => "gender",
            AttributeKey::Season => "season",
            AttributeKey::Pattern => "pattern",
            AttributeKey::SleeveLength => "sleeve_length",
            AttributeKey::Neckline => "neckline",
            AttributeKey::ClosureType => "closure_type",
            AttributeKey::Fit => "fit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// The only provider allowed to fill this key.
    pub fn owner(self) -> ProviderId {
        match self {
            AttributeKey::Color => ProviderId::Cloud,
            AttributeKey::SleeveLength | AttributeKey::Neckline | AttributeKey::ClosureType => {
                ProviderId::Llama
            }
            _ => ProviderId::Gemini,
        }
    }
}

/// Identity of the three attribute providers. The serialized names are the keys
/// used in `model_info` and `per_provider_latency_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Multi-attribute vision-language model.
    Gemini,
    /// Dominant color detection.
    Cloud,
    /// Garment construction vision-language model.
    Llama,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Gemini, ProviderId::Cloud, ProviderId::Llama];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini",
            ProviderId::Cloud => "cloud",
            ProviderId::Llama => "llama",
        }
    }

    /// Keys this provider owns, in canonical order.
    pub fn owned_keys(self) -> Vec<AttributeKey> {
        AttributeKey::ALL
            .into_iter()
            .filter(|k| k.owner() == self)
            .collect()
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One value per provider. Serializes as `{"gemini": .., "cloud": .., "llama": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerProvider<T> {
    pub gemini: T,
    pub cloud: T,
    pub llama: T,
}

impl<T> PerProvider<T> {
    pub fn from_fn(mut f: impl FnMut(ProviderId) -> T) -> Self {
        Self {
            gemini: f(ProviderId::Gemini),
            cloud: f(ProviderId::Cloud),
            llama: f(ProviderId::Llama),
        }
    }

    pub fn get(&self, id: ProviderId) -> &T {
        match id {
            ProviderId::Gemini => &self.gemini,
            ProviderId::Cloud => &self.cloud,
            ProviderId::Llama => &self.llama,
        }
    }

    pub fn get_mut(&mut self, id: ProviderId) -> &mut T {
        match id {
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::Cloud => &mut self.cloud,
            ProviderId::Llama => &mut self.llama,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(ProviderId, &T) -> U) -> PerProvider<U> {
        PerProvider::from_fn(|id| f(id, self.get(id)))
    }
}

/// Attributes a single provider managed to supply. May be empty.
pub type PartialAttributes = BTreeMap<AttributeKey, String>;

/// The merged 13-key record. Always complete; serialized in canonical key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalAttributes(BTreeMap<AttributeKey, String>);

impl CanonicalAttributes {
    /// All 13 keys set to `"unknown"`.
    pub fn all_unknown() -> Self {
        Self(
            AttributeKey::ALL
                .into_iter()
                .map(|k| (k, UNKNOWN.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, key: AttributeKey) -> &str {
        self.0.get(&key).map(String::as_str).unwrap_or(UNKNOWN)
    }

    pub(crate) fn set(&mut self, key: AttributeKey, value: String) {
        self.0.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttributeKey, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Keys currently holding the sentinel.
    pub fn unknown_keys(&self) -> Vec<AttributeKey> {
        self.iter()
            .filter(|(_, v)| *v == UNKNOWN)
            .map(|(k, _)| k)
            .collect()
    }
}
