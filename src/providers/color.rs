//! Color adapter: Google Cloud Vision `IMAGE_PROPERTIES` over all payloads.
//!
//! Per image the three highest-scoring dominant colors vote for their RGB
//! triple, weighted by score. The overall winner is mapped onto a six-label
//! palette. Votes are kept in first-seen order so ties always resolve the same way.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indexmap::IndexMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::{check_status, http_client, AttributeProvider, ProviderInput, RawOutput};
use crate::attributes::ProviderId;
use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Dominant colors considered per image.
pub const TOP_COLORS_PER_IMAGE: usize = 3;

pub type Rgb = (u8, u8, u8);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredColor {
    pub rgb: Rgb,
    pub score: f32,
}

/// Map an RGB triple onto red/green/blue/yellow/white/black.
pub fn rgb_to_basic_color(r: u8, g: u8, b: u8) -> &'static str {
    if r > 150 && g < 100 && b < 100 {
        "red"
    } else if g > 150 && r < 100 && b < 100 {
        "green"
    } else if b > 150 && r < 100 && g < 100 {
        "blue"
    } else if r > 100 && g > 100 && b < 100 {
        "yellow"
    } else if r > 100 && g > 100 && b > 100 {
        "white"
    } else {
        "black"
    }
}

/// Score-weighted vote across images. `None` when no image had any color.
pub fn vote_dominant_rgb(images: &[Vec<ScoredColor>]) -> Option<Rgb> {
    let mut votes: IndexMap<Rgb, f32> = IndexMap::new();
    for colors in images {
        let mut ranked = colors.clone();
        // Stable sort: equal scores keep the provider's order.
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        for c in ranked.into_iter().take(TOP_COLORS_PER_IMAGE) {
            *votes.entry(c.rgb).or_insert(0.0) += c.score;
        }
    }

    let mut best: Option<(Rgb, f32)> = None;
    for (rgb, score) in votes {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((rgb, score)),
        }
    }
    best.map(|(rgb, _)| rgb)
}

// --- Cloud Vision wire types ---

#[derive(Serialize)]
struct AnnotateRequest<'a> {
    requests: Vec<ImageRequest<'a>>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    image: ImageContent,
    features: [Feature<'a>; 1],
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    image_properties_annotation: Option<ImageProperties>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProperties {
    dominant_colors: Option<DominantColors>,
}

#[derive(Debug, Default, Deserialize)]
struct DominantColors {
    #[serde(default)]
    colors: Vec<ColorInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ColorInfo {
    #[serde(default)]
    color: WireColor,
    #[serde(default)]
    score: f32,
}

// Proto3 JSON omits zero channels.
#[derive(Debug, Default, Deserialize)]
struct WireColor {
    #[serde(default)]
    red: f32,
    #[serde(default)]
    green: f32,
    #[serde(default)]
    blue: f32,
}

#[derive(Debug, Default, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

fn channel(v: f32) -> u8 {
    v.clamp(0.0, 255.0) as u8
}

impl ImageResponse {
    fn scored_colors(self) -> Vec<ScoredColor> {
        self.image_properties_annotation
            .and_then(|p| p.dominant_colors)
            .map(|d| d.colors)
            .unwrap_or_default()
            .into_iter()
            .map(|c| ScoredColor {
                rgb: (channel(c.color.red), channel(c.color.green), channel(c.color.blue)),
                score: c.score,
            })
            .collect()
    }
}

pub struct CloudVisionProvider {
    http: Client,
    cfg: ProviderConfig,
}

impl CloudVisionProvider {
    pub fn new(cfg: ProviderConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(&cfg)?,
            cfg,
        })
    }
}

#[async_trait]
impl AttributeProvider for CloudVisionProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Cloud
    }

    fn model_name(&self) -> &str {
        &self.cfg.model
    }

    async fn call(&self, input: &ProviderInput) -> Result<RawOutput, ProviderError> {
        if self.cfg.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("GOOGLE_VISION_API_KEY"));
        }
        if input.images.is_empty() {
            return Err(ProviderError::NoImages);
        }

        let req = AnnotateRequest {
            requests: input
                .images
                .iter()
                .take(4)
                .map(|img| ImageRequest {
                    image: ImageContent {
                        content: BASE64.encode(&img.data),
                    },
                    features: [Feature {
                        kind: "IMAGE_PROPERTIES",
                    }],
                })
                .collect(),
        };

        let resp = self
            .http
            .post(format!("{}/images:annotate", self.cfg.api_base))
            .query(&[("key", self.cfg.api_key.as_str())])
            .json(&req)
            .send()
            .await?;
        let body: AnnotateResponse = check_status(resp).await?.json().await?;

        let mut per_image = Vec::with_capacity(body.responses.len());
        for (idx, r) in body.responses.into_iter().enumerate() {
            if let Some(err) = &r.error {
                warn!(image = idx, message = %err.message, "cloud vision image error");
                continue;
            }
            per_image.push(r.scored_colors());
        }

        let (r, g, b) = vote_dominant_rgb(&per_image).ok_or(ProviderError::NoColors)?;
        let name = rgb_to_basic_color(r, g, b);
        info!(color = name, rgb = ?(r, g, b), "detected dominant color");

        Ok(RawOutput::Structured(json!({
            "color": name,
            "rgb": [r, g, b],
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(r: u8, g: u8, b: u8, score: f32) -> ScoredColor {
        ScoredColor {
            rgb: (r, g, b),
            score,
        }
    }

    #[test]
    fn palette_rules() {
        assert_eq!(rgb_to_basic_color(200, 40, 30), "red");
        assert_eq!(rgb_to_basic_color(20, 200, 30), "green");
        assert_eq!(rgb_to_basic_color(20, 40, 230), "blue");
        assert_eq!(rgb_to_basic_color(220, 210, 40), "yellow");
        assert_eq!(rgb_to_basic_color(240, 240, 240), "white");
        assert_eq!(rgb_to_basic_color(30, 30, 30), "black");
        // Mid-tones that hit no rule fall through to black.
        assert_eq!(rgb_to_basic_color(120, 60, 60), "black");
    }

    #[test]
    fn votes_accumulate_across_images() {
        let images = vec![
            vec![c(200, 40, 30, 0.4), c(10, 10, 10, 0.5)],
            vec![c(200, 40, 30, 0.4), c(240, 240, 240, 0.1)],
        ];
        // red: 0.8 beats black: 0.5
        assert_eq!(vote_dominant_rgb(&images), Some((200, 40, 30)));
    }

    #[test]
    fn only_top_three_per_image_vote() {
        let images = vec![vec![
            c(1, 1, 1, 0.30),
            c(2, 2, 2, 0.25),
            c(3, 3, 3, 0.20),
            c(250, 0, 0, 0.10),
            c(250, 0, 0, 0.10),
            c(250, 0, 0, 0.10),
        ]];
        assert_eq!(vote_dominant_rgb(&images), Some((1, 1, 1)));
    }

    #[test]
    fn ties_go_to_first_seen() {
        let images = vec![vec![c(9, 9, 9, 0.5), c(200, 40, 30, 0.5)]];
        assert_eq!(vote_dominant_rgb(&images), Some((9, 9, 9)));
        assert_eq!(vote_dominant_rgb(&images), vote_dominant_rgb(&images));
    }

    #[test]
    fn no_colors_no_winner() {
        assert_eq!(vote_dominant_rgb(&[]), None);
        assert_eq!(vote_dominant_rgb(&[vec![], vec![]]), None);
    }

    #[test]
    fn wire_response_with_omitted_channels() {
        let body = r#"{"responses":[
            {"imagePropertiesAnnotation":{"dominantColors":{"colors":[
                {"color":{"red":200,"green":40,"blue":30},"score":0.7,"pixelFraction":0.3},
                {"color":{"green":255},"score":0.2}
            ]}}},
            {"error":{"code":3,"message":"Bad image data."}}
        ]}"#;
        let parsed: AnnotateResponse = serde_json::from_str(body).unwrap();
        let mut it = parsed.responses.into_iter();
        let first = it.next().unwrap().scored_colors();
        assert_eq!(first[0].rgb, (200, 40, 30));
        assert_eq!(first[1].rgb, (0, 255, 0));
        assert!(it.next().unwrap().error.is_some());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let mut cfg = ProviderConfig::defaults_for(ProviderId::Cloud);
        cfg.api_key.clear();
        let p = CloudVisionProvider::new(cfg).unwrap();
        let err = p.call(&ProviderInput::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }
}
