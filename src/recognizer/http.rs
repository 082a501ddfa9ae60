//! HttpClassifier - Inference Sidecar Adapter
//!
//! Sends a JPEG-encoded frame to a face-classification service and parses
//! the detections it returns. The service owns the embedding model; this
//! adapter only speaks its wire format.

use crate::error::{Error, Result};
use crate::frame::{Frame, Rect};
use crate::recognizer::{FaceCandidate, FaceClassifier};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;

/// One detection as returned by the sidecar
#[derive(Debug, Clone, Deserialize)]
pub struct WireDetection {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub identity: String,
    pub confidence: f32,
}

/// Classification response body
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    #[serde(default)]
    pub faces: Vec<WireDetection>,
}

/// HTTP-backed face classifier
pub struct HttpClassifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClassifier {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, 85);
        encoder
            .write_image(
                &frame.data,
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| Error::Model(format!("JPEG encode failed: {}", e)))?;
        Ok(jpeg)
    }
}

#[async_trait]
impl FaceClassifier for HttpClassifier {
    async fn classify(&self, frame: &Frame) -> Result<Vec<FaceCandidate>> {
        let url = format!("{}/v1/classify", self.base_url);
        let jpeg = Self::encode_jpeg(frame)?;

        let form = Form::new()
            .part(
                "frame",
                Part::bytes(jpeg)
                    .file_name("frame.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("captured_at", frame.captured_at.to_rfc3339());

        let resp = self.client.post(&url).multipart(form).send().await?;

        if !resp.status().is_success() {
            return Err(Error::Model(format!(
                "Classifier returned {}",
                resp.status()
            )));
        }

        let body: ClassifyResponse = resp.json().await?;

        Ok(body
            .faces
            .into_iter()
            .map(|d| FaceCandidate {
                bounds: Rect::new(d.x, d.y, d.width, d.height),
                identity: d.identity,
                confidence: d.confidence,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/healthz", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}
