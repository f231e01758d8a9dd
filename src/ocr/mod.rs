//! OCR domain: public API.
//!
//! Recognition runs in a remote collaborator reached over HTTP. External
//! code talks to it only through the `OcrService` trait, so the session
//! can be driven by a fake in tests.

mod batch_text;
mod http;

pub use batch_text::parse_batch_text;
pub use http::HttpOcrClient;

use crate::convert::EncodedImage;
use crate::error::OcrError;
use async_trait::async_trait;

/// Text the OCR collaborator returns when an image holds no text.
pub const NO_TEXT_SENTINEL: &str = "No text detected in this image.";

/// A remote text-recognition service.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Recognize a single image. Returns the extracted text, possibly empty.
    async fn recognize(&self, image: EncodedImage) -> Result<String, OcrError>;

    /// Recognize several images in one request.
    ///
    /// The combined result labels each image with an `IMAGE <n>:` marker;
    /// see `parse_batch_text`.
    async fn recognize_batch(&self, images: Vec<EncodedImage>) -> Result<String, OcrError>;
}

/// True when the text is empty or the no-text sentinel.
pub fn is_no_text(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || text == NO_TEXT_SENTINEL
}
