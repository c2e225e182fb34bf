//! Attribute adapter: Gemini `generateContent` with a frozen 9-attribute prompt.
//!
//! By default the four source URLs go out as `fileData` parts. With
//! `inline_images = true` the re-encoded payloads are sent as `inlineData`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::{check_status, http_client, AttributeProvider, ProviderInput, RawOutput};
use crate::attributes::ProviderId;
use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub const ATTRIBUTE_PROMPT: &str = r#"You are a fashion attribute extractor.
Look at ALL 4 photos of the same clothing item together.
Return ONLY a valid JSON object with the following attributes:

{
  "category": "string",
  "brand": "string",
  "material": "short descriptive phrase",
  "condition": "new | like_new | good | fair | poor",
  "style": "short descriptive phrase",
  "gender": "male | female | unisex | kids",
  "season": "short descriptive phrase",
  "pattern": "short descriptive phrase",
  "fit": "slim | regular | loose | oversized | other"
}

Rules:
- Use evidence from ALL images before deciding.
- If an attribute is not visible, set it to "unknown".
- Do not add explanations or text outside the JSON.
- Ensure the JSON is valid and complete."#;

/// MIME type guessed from the URL path; JPEG unless it says PNG.
pub fn mime_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Prompt first, then one part per image.
pub fn build_parts(input: &ProviderInput, inline_images: bool) -> Vec<Value> {
    let mut parts = vec![json!({ "text": ATTRIBUTE_PROMPT })];
    if inline_images {
        for img in &input.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": img.mime_type,
                    "data": BASE64.encode(&img.data),
                }
            }));
        }
    } else {
        for url in &input.urls {
            parts.push(json!({
                "fileData": {
                    "mimeType": mime_for_url(url),
                    "fileUri": url,
                }
            }));
        }
    }
    parts
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

pub struct GeminiProvider {
    http: Client,
    cfg: ProviderConfig,
}

impl GeminiProvider {
    pub fn new(cfg: ProviderConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(&cfg)?,
            cfg,
        })
    }

    fn endpoint(&self) -> String {
        let model = self.cfg.model.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!("{}/{}:generateContent", self.cfg.api_base, model_path)
    }
}

#[async_trait]
impl AttributeProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    async fn call(&self, input: &ProviderInput) -> Result<RawOutput, ProviderError> {
        if self.cfg.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("GEMINI_API_KEY"));
        }
        if self.cfg.inline_images && input.images.is_empty() {
            return Err(ProviderError::NoImages);
        }

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": build_parts(input, self.cfg.inline_images),
            }]
        });

        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.cfg.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateResponse = check_status(resp).await?.json().await?;

        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(ProviderError::Response(format!("prompt blocked: {reason}")));
        }

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(ProviderError::Response("empty candidate text".into()));
        }
        info!(chars = text.len(), "gemini response received");
        Ok(RawOutput::Text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::ImagePayload;

    fn input() -> ProviderInput {
        ProviderInput {
            images: vec![ImagePayload {
                data: vec![1, 2, 3],
                mime_type: "image/jpeg",
            }],
            urls: vec![
                "http://a.com/1.jpg".into(),
                "http://a.com/2.PNG?w=1".into(),
                "http://a.com/3.jpg".into(),
                "http://a.com/4.jpg".into(),
            ],
        }
    }

    #[test]
    fn url_mode_sends_every_url() {
        let parts = build_parts(&input(), false);
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0]["text"], json!(ATTRIBUTE_PROMPT));
        assert_eq!(parts[2]["fileData"]["fileUri"], json!("http://a.com/2.PNG?w=1"));
        assert_eq!(parts[2]["fileData"]["mimeType"], json!("image/png"));
        assert_eq!(parts[1]["fileData"]["mimeType"], json!("image/jpeg"));
    }

    #[test]
    fn inline_mode_sends_payloads() {
        let parts = build_parts(&input(), true);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1]["inlineData"]["data"], json!(BASE64.encode([1u8, 2, 3])));
    }

    #[test]
    fn candidate_text_parts_are_joined() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"```json\n{\"fit\":"},{"text":"\"slim\"}\n```"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "```json\n{\"fit\":\"slim\"}\n```");
    }

    #[test]
    fn endpoint_accepts_prefixed_model() {
        let mut cfg = ProviderConfig::defaults_for(ProviderId::Gemini);
        cfg.api_base = "http://h/v1beta".into();
        cfg.model = "models/gemini-2.5-flash".into();
        let p = GeminiProvider::new(cfg).unwrap();
        assert_eq!(p.endpoint(), "http://h/v1beta/models/gemini-2.5-flash:generateContent");
    }
}
