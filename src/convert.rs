//! Image-to-bytes conversion for OCR upload.
//!
//! Same-origin images that are already rendered are re-encoded from their
//! pixels as high-quality JPEG. Cross-origin images, and anything that
//! fails to render or encode, are retrieved directly as raw bytes. Images
//! that haven't finished loading are loaded off-page first.

use crate::discovery::ImageCandidate;
use crate::error::ConversionError;
use crate::page::Page;
use async_trait::async_trait;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

/// JPEG quality for re-encoded panels.
pub const JPEG_QUALITY: u8 = 95;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// An encoded image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl EncodedImage {
    /// Wrap raw bytes, sniffing the MIME type from the content.
    pub fn sniffed(bytes: Vec<u8>) -> Self {
        let mime_type = image::guess_format(&bytes)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Self { bytes, mime_type }
    }
}

/// Direct byte retrieval for a source locator.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, ConversionError>;
}

/// Fetches over HTTP(S). `data:` URIs are decoded in place and `file:`
/// URLs read from disk.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("[CONVERT] Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, ConversionError> {
        if locator.starts_with("data:") {
            return decode_data_uri(locator);
        }
        if locator.starts_with("file:") {
            return read_file_url(locator);
        }
        let fetch_err = |e: reqwest::Error| ConversionError::Fetch {
            url: locator.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(locator).send().await.map_err(fetch_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::HttpStatus {
                url: locator.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(fetch_err)?;
        Ok(bytes.to_vec())
    }
}

/// Decode a base64 `data:` URI into its payload.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ConversionError> {
    let rest = uri.strip_prefix("data:").ok_or(ConversionError::InvalidDataUri)?;
    let (meta, payload) = rest.split_once(',').ok_or(ConversionError::InvalidDataUri)?;
    if !meta.ends_with(";base64") {
        return Err(ConversionError::InvalidDataUri);
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| ConversionError::InvalidDataUri)
}

fn read_file_url(locator: &str) -> Result<Vec<u8>, ConversionError> {
    let fetch_err = |message: String| ConversionError::Fetch {
        url: locator.to_string(),
        message,
    };
    let path = Url::parse(locator)
        .ok()
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| fetch_err("not a local file path".to_string()))?;
    std::fs::read(&path).map_err(|e| fetch_err(e.to_string()))
}

/// Encode pixels as JPEG at `JPEG_QUALITY`.
pub fn encode_jpeg(pixels: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let rgb = pixels.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

/// Turns queue candidates into uploadable bytes.
#[derive(Clone)]
pub struct ImageConverter {
    page: Arc<dyn Page>,
    fetcher: Arc<dyn ImageFetcher>,
}

impl ImageConverter {
    pub fn new(page: Arc<dyn Page>, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self { page, fetcher }
    }

    pub async fn to_bytes(&self, candidate: &ImageCandidate) -> Result<EncodedImage, ConversionError> {
        let source = candidate.source.trim();
        if source.is_empty() {
            return Err(ConversionError::NoSource);
        }

        if !self.page.is_loaded(candidate.node) {
            log::debug!("[CONVERT] Not loaded, loading off-page: {}", source);
            return self.load_off_page(source).await;
        }

        if self.is_cross_origin(source) {
            log::debug!("[CONVERT] Cross-origin, fetching directly: {}", source);
            return self.fetch_raw(source).await;
        }

        match self.page.render_pixels(candidate.node) {
            Some(pixels) => match encode_jpeg(&pixels) {
                Ok(bytes) => {
                    log::debug!("[CONVERT] Encoded {} bytes from page pixels", bytes.len());
                    Ok(EncodedImage {
                        bytes,
                        mime_type: "image/jpeg".to_string(),
                    })
                }
                Err(e) => {
                    log::warn!("[CONVERT] JPEG encode failed ({}), fetching directly", e);
                    self.fetch_raw(source).await
                }
            },
            None => self.fetch_raw(source).await,
        }
    }

    /// Retrieve, decode, re-encode. Raw bytes if decoding fails or the
    /// image is cross-origin.
    async fn load_off_page(&self, source: &str) -> Result<EncodedImage, ConversionError> {
        let bytes = self.fetcher.fetch(source).await?;
        if self.is_cross_origin(source) {
            return Ok(EncodedImage::sniffed(bytes));
        }
        let decoded = image::load_from_memory(&bytes).map_err(|e| e.to_string());
        match decoded.and_then(|img| encode_jpeg(&img).map_err(|e| e.to_string())) {
            Ok(jpeg) => Ok(EncodedImage {
                bytes: jpeg,
                mime_type: "image/jpeg".to_string(),
            }),
            Err(e) => {
                log::warn!("[CONVERT] Off-page load failed ({}), using raw bytes", e);
                Ok(EncodedImage::sniffed(bytes))
            }
        }
    }

    async fn fetch_raw(&self, source: &str) -> Result<EncodedImage, ConversionError> {
        let bytes = self.fetcher.fetch(source).await?;
        Ok(EncodedImage::sniffed(bytes))
    }

    /// `data:` URIs are local. Unknown page origin counts as cross-origin.
    fn is_cross_origin(&self, source: &str) -> bool {
        if source.starts_with("data:") {
            return false;
        }
        let Ok(url) = Url::parse(source) else {
            return false;
        };
        match self.page.base_url() {
            Some(base) => base.origin() != url.origin(),
            None => true,
        }
    }
}
