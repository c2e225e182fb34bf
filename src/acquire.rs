//! Image acquisition: download the validated URLs concurrently and re-encode
//! every image to JPEG so all providers see the same format.
//!
//! One attempt per URL. A failed download is logged and simply missing from
//! the result; it never fails the siblings.

use anyhow::{Context, Result};
use futures::future::join_all;
use image::ImageFormat;
use metrics::counter;
use reqwest::Client;
use std::io::Cursor;
use tracing::{error, info};

use crate::validate::ImageUrlSet;

pub const JPEG_MIME: &str = "image/jpeg";

/// One downloaded, re-encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

/// Decode any supported format and write it back as baseline RGB JPEG.
pub fn reencode_jpeg(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("decoding image")?;
    let rgb = image::DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .context("encoding jpeg")?;
    Ok(out.into_inner())
}

async fn download_one(client: Client, url: String) -> Result<ImagePayload> {
    let resp = client
        .get(&url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .with_context(|| format!("downloading {url}"))?;
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;
    let data = reencode_jpeg(&bytes).with_context(|| format!("re-encoding {url}"))?;
    Ok(ImagePayload {
        data,
        mime_type: JPEG_MIME,
    })
}

/// Download every URL on its own task and wait for all of them.
/// Successful payloads keep the input order.
pub async fn acquire_images(client: &Client, set: &ImageUrlSet) -> Vec<ImagePayload> {
    let urls = set.urls();
    let tasks = urls
        .iter()
        .map(|url| tokio::spawn(download_one(client.clone(), url.clone())));
    let joined = join_all(tasks).await;

    let mut out = Vec::with_capacity(joined.len());
    for (url, res) in urls.iter().zip(joined) {
        match res {
            Ok(Ok(payload)) => {
                info!(%url, bytes = payload.data.len(), "image acquired");
                counter!("images_acquired_total").increment(1);
                out.push(payload);
            }
            Ok(Err(e)) => error!(%url, error = ?e, "image download failed"),
            Err(e) => error!(%url, error = %e, "image download task aborted"),
        }
    }
    out
}
