//! HTTP client for the OCR collaborator.
//!
//! `POST {base}/ocr` takes one multipart `image` part; `POST {base}/ocr-batch`
//! takes repeated `images` parts in reading order. Both answer
//! `{"text": "..."}`, or `{"error": "...", "details": "..."}` on failure.

use super::OcrService;
use crate::convert::EncodedImage;
use crate::error::OcrError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::{Duration, Instant};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct OcrReply {
    text: Option<String>,
    error: Option<String>,
    details: Option<String>,
}

pub struct HttpOcrClient {
    base: String,
    client: reqwest::Client,
}

impl HttpOcrClient {
    /// `base` is the collaborator address without a trailing slash.
    pub fn new(base: impl Into<String>) -> Result<Self, OcrError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn post(&self, path: &str, form: Form, count: usize) -> Result<String, OcrError> {
        let url = format!("{}{}", self.base, path);
        let start = Instant::now();
        log::info!("[OCR] POST {} ({} image(s))", url, count);

        let response = self.client.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        log::info!(
            "[OCR] {} in {}ms, {} bytes",
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        let reply: Option<OcrReply> = serde_json::from_str(&body).ok();
        if !status.is_success() {
            let (error, details) = reply.map(|r| (r.error, r.details)).unwrap_or((None, None));
            return Err(OcrError::from_body(status.as_u16(), error, details));
        }

        match reply {
            Some(OcrReply { text: Some(text), .. }) => Ok(text),
            Some(OcrReply { error: Some(error), details, .. }) => {
                Err(OcrError::from_body(status.as_u16(), Some(error), details))
            }
            _ => Err(OcrError::InvalidResponse(crate::discovery::truncate(&body, 200))),
        }
    }
}

fn image_part(image: EncodedImage, file_name: String) -> Result<Part, OcrError> {
    Ok(Part::bytes(image.bytes)
        .file_name(file_name)
        .mime_str(&image.mime_type)?)
}

#[async_trait]
impl OcrService for HttpOcrClient {
    async fn recognize(&self, image: EncodedImage) -> Result<String, OcrError> {
        let form = Form::new().part("image", image_part(image, "comic_image.jpg".to_string())?);
        self.post("/ocr", form, 1).await
    }

    async fn recognize_batch(&self, images: Vec<EncodedImage>) -> Result<String, OcrError> {
        let count = images.len();
        let mut form = Form::new();
        for (i, image) in images.into_iter().enumerate() {
            form = form.part("images", image_part(image, format!("comic_image_{}.jpg", i))?);
        }
        self.post("/ocr-batch", form, count).await
    }
}
