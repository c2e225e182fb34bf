// tests/common/mod.rs
//
// Local stand-ins for image hosts and the three provider APIs, served by axum
// on 127.0.0.1:0. Every test gets its own server and hit counters.
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use garment_analyzer::config::AnalyzerConfig;
use garment_analyzer::pipeline::{image_client, Analyzer};
use garment_analyzer::providers::build_providers;
use garment_analyzer::store::DynStore;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

pub const API_KEY: &str = "test-key";

/// 11 MB, above the 10 MiB default limit.
pub const OVERSIZED_BYTES: usize = 11_000_000;

#[derive(Default)]
pub struct Hits {
    pub images: AtomicUsize,
    pub gemini: AtomicUsize,
    pub gemini_inline: AtomicUsize,
    pub vision: AtomicUsize,
    /// Image count of the last Cloud Vision request.
    pub vision_images: AtomicUsize,
    pub groq: AtomicUsize,
}

impl Hits {
    pub fn providers(&self) -> usize {
        self.gemini.load(Ordering::SeqCst)
            + self.vision.load(Ordering::SeqCst)
            + self.groq.load(Ordering::SeqCst)
    }
}

pub struct Fixture {
    pub base: String,
    pub hits: Arc<Hits>,
}

impl Fixture {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Four good image URLs, space separated.
    pub fn four_images(&self) -> String {
        (1..=4)
            .map(|i| self.url(&format!("/img/{i}.png")))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Config pointing every provider at this server, with the in-memory store.
    pub fn config(&self) -> AnalyzerConfig {
        let mut cfg = AnalyzerConfig::default();
        cfg.database_url = "memory".into();
        cfg.download_timeout_secs = 5;
        cfg.gemini.api_base = self.url("/gemini/v1beta");
        cfg.gemini.api_key = API_KEY.into();
        cfg.color.api_base = self.url("/vision/v1");
        cfg.color.api_key = API_KEY.into();
        cfg.llama.api_base = self.url("/groq/openai/v1");
        cfg.llama.api_key = API_KEY.into();
        cfg
    }

    pub async fn analyzer(&self) -> Analyzer {
        Analyzer::from_config(&self.config())
            .await
            .expect("analyzer from fixture config")
    }

    pub fn analyzer_with_store(&self, cfg: &AnalyzerConfig, store: DynStore) -> Analyzer {
        Analyzer::new(
            image_client(cfg.download_timeout_secs).expect("image client"),
            cfg.max_image_bytes,
            build_providers(cfg).expect("providers"),
            store,
        )
    }
}

pub fn png_bytes(rgb: [u8; 3]) -> Vec<u8> {
    let img = RgbImage::from_pixel(8, 8, Rgb(rgb));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    buf.into_inner()
}

pub async fn spawn_fixture() -> Fixture {
    let hits = Arc::new(Hits::default());

    let app = Router::new()
        .route("/img/{name}", get(image))
        .route("/big.jpg", get(big))
        .route("/garbage.jpg", get(garbage))
        .route("/stream.jpg", get(stream))
        .route("/gemini/v1beta/{*rest}", post(gemini))
        .route("/vision/v1/{*rest}", post(vision))
        .route("/groq/openai/v1/chat/completions", post(groq))
        .route(
            "/broken/{*rest}",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") }),
        )
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Fixture {
        base: format!("http://{addr}"),
        hits,
    }
}

async fn image(State(hits): State<Arc<Hits>>) -> impl IntoResponse {
    hits.images.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "image/png")], png_bytes([200, 30, 20]))
}

// HEAD carries the full Content-Length.
async fn big() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], vec![0u8; OVERSIZED_BYTES])
}

// Small and reachable, so it passes the size check, but does not decode.
async fn garbage() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], "this is not a jpeg")
}

// No Content-Length; only the streamed GET reveals the size.
async fn stream() -> impl IntoResponse {
    let chunks = (0..11).map(|_| Ok::<_, std::io::Error>(Bytes::from(vec![0u8; 1_000_000])));
    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        Body::from_stream(futures::stream::iter(chunks)),
    )
}

fn authorized(headers: &HeaderMap, name: header::HeaderName, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

async fn gemini(
    State(hits): State<Arc<Hits>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    hits.gemini.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers, header::HeaderName::from_static("x-goog-api-key"), API_KEY) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    if body.to_string().contains("inlineData") {
        hits.gemini_inline.fetch_add(1, Ordering::SeqCst);
    }
    // Fenced, with a trailing comma, split across two parts.
    let text = "```json\n{\"category\":\"shirt\",\"brand\":\"Acme\",\"material\":\"cotton\",\"condition\":\"good\",\"style\":\"casual\",";
    let rest = "\"gender\":\"male\",\"season\":\"summer\",\"pattern\":\"plaid\",\"fit\":\"regular\",}\n```";
    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{ "content": { "parts": [{ "text": text }, { "text": rest }] } }]
        })),
    )
}

async fn vision(State(hits): State<Arc<Hits>>, Json(body): Json<Value>) -> impl IntoResponse {
    hits.vision.fetch_add(1, Ordering::SeqCst);
    let n = body["requests"].as_array().map(Vec::len).unwrap_or(0);
    hits.vision_images.store(n, Ordering::SeqCst);
    let one = json!({
        "imagePropertiesAnnotation": { "dominantColors": { "colors": [
            { "color": { "red": 200, "green": 30, "blue": 20 }, "score": 0.7 },
            { "color": { "red": 240, "green": 240, "blue": 240 }, "score": 0.2 }
        ] } }
    });
    Json(json!({ "responses": vec![one; n] }))
}

async fn groq(State(hits): State<Arc<Hits>>, headers: HeaderMap) -> impl IntoResponse {
    hits.groq.fetch_add(1, Ordering::SeqCst);
    let expected = format!("Bearer {API_KEY}");
    if !authorized(&headers, header::AUTHORIZATION, &expected) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad key"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": "{\"sleeve_length\": \"short sleeve\", \"neckline\": \"collared\", \"closure_type\": \"buttons\"}"
            } }]
        })),
    )
}
