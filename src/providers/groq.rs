//! Construction adapter: Llama vision on Groq's OpenAI-compatible chat
//! completions API. Asks for sleeve length, neckline and closure type.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{check_status, http_client, AttributeProvider, ProviderInput, RawOutput};
use crate::attributes::ProviderId;
use crate::config::ProviderConfig;
use crate::error::ProviderError;

pub const CONSTRUCTION_PROMPT: &str = r#"You are an expert fashion classifier.
Look at all 4 photos of the SAME clothing item.
Extract ONLY these attributes:
- Sleeve Length (short sleeve, long sleeve, sleeveless, half sleeve)
- Neckline (crew neck, v-neck, collared, round neck, polo, etc.)
- Closure Type (buttons, zipper, laces, slip-on, none)

Respond ONLY in JSON like this:
{
  "sleeve_length": "...",
  "neckline": "...",
  "closure_type": "..."
}"#;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize, PartialEq)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    #[serde(default)]
    content: Option<String>,
}

fn build_content(urls: &[String]) -> Vec<ContentPart<'_>> {
    let mut content = vec![ContentPart::Text {
        text: CONSTRUCTION_PROMPT,
    }];
    content.extend(urls.iter().map(|u| ContentPart::ImageUrl {
        image_url: ImageUrl { url: u },
    }));
    content
}

pub struct GroqLlamaProvider {
    http: Client,
    cfg: ProviderConfig,
}

impl GroqLlamaProvider {
    pub fn new(cfg: ProviderConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(&cfg)?,
            cfg,
        })
    }
}

#[async_trait]
impl AttributeProvider for GroqLlamaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Llama
    }

    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    async fn call(&self, input: &ProviderInput) -> Result<RawOutput, ProviderError> {
        if self.cfg.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("GROQ_API_KEY"));
        }

        let req = ChatRequest {
            model: &self.cfg.model,
            messages: vec![Message {
                role: "user",
                content: build_content(&input.urls),
            }],
            temperature: 0.0,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.cfg.api_base))
            .bearer_auth(&self.cfg.api_key)
            .json(&req)
            .send()
            .await?;
        let body: ChatResponse = check_status(resp).await?.json().await?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ProviderError::Response("empty completion".into()));
        }
        info!(response = %content, "llama vision response");
        Ok(RawOutput::Text(content))
    }
}
