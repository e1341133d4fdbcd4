//! Promotional image pipeline: fetch, badge, compose, encode.

pub mod badge;
pub mod faces;
pub mod fonts;
pub mod pool;
pub mod scene;

use crate::config::Config;
use crate::media::MediaRecord;
use faces::{FaceDetector, SeetaFaceDetector};
use fonts::Fonts;
use image::{ImageFormat, RgbaImage};
use pool::{CancelFlag, RenderPool};
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("record has no poster")]
    NoPoster,
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("image encode failed: {0}")]
    Encode(String),
    #[error("render job cancelled")]
    Cancelled,
    #[error("render job timed out after {0:?}")]
    TimedOut(Duration),
    #[error("render worker crashed: {0}")]
    Worker(String),
    #[error("render pool closed")]
    PoolClosed,
}

pub async fn fetch_image_bytes(client: &Client, url: &str) -> Result<Vec<u8>, ComposeError> {
    let fail = |reason: String| ComposeError::Fetch {
        url: url.to_string(),
        reason,
    };
    let resp = client.get(url).send().await.map_err(|e| fail(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(fail(format!("HTTP {}", resp.status().as_u16())));
    }
    let bytes = resp.bytes().await.map_err(|e| fail(e.to_string()))?;
    Ok(bytes.to_vec())
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage, ComposeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| ComposeError::Decode(e.to_string()))
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ComposeError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ComposeError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Fonts, face detector and worker pool shared by every render.
#[derive(Clone)]
pub struct Compositor {
    fonts: Arc<Fonts>,
    detector: Arc<dyn FaceDetector>,
    pool: RenderPool,
}

impl Compositor {
    pub fn new(fonts: Fonts, detector: Arc<dyn FaceDetector>, pool: RenderPool) -> Self {
        Self {
            fonts: Arc::new(fonts),
            detector,
            pool,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            Fonts::load(&cfg.font_bold, &cfg.font_regular),
            Arc::new(SeetaFaceDetector::new(&cfg.face_model)),
            RenderPool::new(cfg.render_workers, cfg.render_timeout()),
        )
    }

    /// Decodes, composes and encodes on the worker pool.
    pub async fn render_bytes(
        &self,
        record: &MediaRecord,
        poster: Vec<u8>,
        backdrop: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ComposeError> {
        let record = record.clone();
        let fonts = Arc::clone(&self.fonts);
        let detector = Arc::clone(&self.detector);
        self.pool
            .run(move |cancel: &CancelFlag| {
                let poster = decode_image(&poster)?;
                let backdrop = backdrop.as_deref().map(decode_image).transpose()?;
                cancel.check()?;
                let canvas =
                    scene::compose_scene(&record, poster, backdrop, &fonts, detector.as_ref(), cancel)?;
                encode_png(&canvas)
            })
            .await
    }

    /// Full pipeline for a record: any fetch or decode failure fails the
    /// whole image.
    pub async fn render_post_image(
        &self,
        client: &Client,
        record: &MediaRecord,
    ) -> Result<Vec<u8>, ComposeError> {
        let poster_url = record.poster_url().ok_or(ComposeError::NoPoster)?;
        let poster = fetch_image_bytes(client, &poster_url).await?;
        let backdrop = match record.backdrop_url() {
            Some(url) => Some(fetch_image_bytes(client, &url).await?),
            None => None,
        };
        debug!(
            poster_bytes = poster.len(),
            has_backdrop = backdrop.is_some(),
            "fetched artwork for {}",
            record.display_title()
        );
        self.render_bytes(record, poster, backdrop).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poster::badge::tests::FixedFaces;
    use image::Rgba;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn compositor() -> Compositor {
        Compositor::new(
            Fonts::fallback(),
            Arc::new(FixedFaces(vec![])),
            RenderPool::new(1, Duration::from_secs(30)),
        )
    }

    fn png(color: Rgba<u8>, w: u32, h: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(w, h, color)).unwrap()
    }

    #[tokio::test]
    async fn renders_a_full_size_png_from_a_poster_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/poster.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(Rgba([200, 0, 0, 255]), 50, 75)))
            .mount(&server)
            .await;

        let mut record = MediaRecord::manual("Red");
        record.manual_poster_url = Some(format!("{}/poster.png", server.uri()));

        let bytes = compositor()
            .render_post_image(&Client::new(), &record)
            .await
            .unwrap();
        let image = decode_image(&bytes).unwrap();
        assert_eq!(image.dimensions(), (1280, 720));
    }

    #[tokio::test]
    async fn missing_poster_fails_the_whole_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut record = MediaRecord::manual("Gone");
        record.manual_poster_url = Some(format!("{}/gone.png", server.uri()));
        let err = compositor()
            .render_post_image(&Client::new(), &record)
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Fetch { .. }));

        let err = compositor()
            .render_post_image(&Client::new(), &MediaRecord::manual("No art"))
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::NoPoster));
    }

    #[tokio::test]
    async fn undecodable_bytes_fail_the_whole_image() {
        let err = compositor()
            .render_bytes(&MediaRecord::manual("Junk"), b"<html>nope</html>".to_vec(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ComposeError::Decode(_)));
    }
}
