//! Error types for the analyzer.
//!
//! Request-level failures (`AnalyzeError`) end the request. Provider failures
//! (`ProviderError`) never leave the coordinator; they only turn the provider's
//! attributes into `"unknown"`.

use thiserror::Error;

/// Why an image failed the size/reachability check.
#[derive(Debug, Error)]
pub enum ImageRejection {
    #[error("not a valid http(s) URL")]
    InvalidUrl,

    #[error("unreachable: {0}")]
    Unreachable(String),

    #[error("declared size {0} bytes exceeds limit")]
    DeclaredTooLarge(u64),

    #[error("body exceeded limit after {0} bytes")]
    StreamTooLarge(u64),
}

/// Request-level failure of the Analyze operation.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// Wrong number of URLs in the input string (400).
    #[error("Expected 4 URLs, found {found}")]
    MalformedInput { found: usize },

    /// One image is oversized, unreachable or not an image URL at all (400).
    /// The message is user-facing; `url`/`reason` are for logs.
    #[error("One or more images exceed 10MB or are invalid.")]
    OversizedOrUnreachableImage { url: String, reason: ImageRejection },

    /// Inference succeeded but the result could not be stored (500).
    #[error("Failed to store analysis result.")]
    Persistence {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl AnalyzeError {
    pub fn status_code(&self) -> u16 {
        match self {
            AnalyzeError::MalformedInput { .. }
            | AnalyzeError::OversizedOrUnreachableImage { .. } => 400,
            AnalyzeError::Persistence { .. } => 500,
        }
    }
}

/// Failure of a single provider adapter.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing API key ({0})")]
    MissingApiKey(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("no images to analyze")]
    NoImages,

    #[error("no dominant colors detected")]
    NoColors,
}

/// Persistence gateway failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result {0} already stored")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
