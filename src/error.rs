//! Error taxonomy for the reading pipeline.
//!
//! None of these are fatal to the host: the session logs them and skips
//! the affected batch, image, or utterance. Only `SettingsError` is
//! surfaced to the caller, and only before a session starts.

use thiserror::Error;

/// The page yielded no usable panel images.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("no comic images found on this page")]
    NoImagesFound,
}

/// An OCR request (batch or single image) failed.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("OCR server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("OCR response was not understood: {0}")]
    InvalidResponse(String),
}

impl OcrError {
    /// Build a server error from the collaborator's `{error, details}` body.
    pub fn from_body(status: u16, error: Option<String>, details: Option<String>) -> Self {
        let mut message = error.unwrap_or_else(|| format!("Server returned {}", status));
        if let Some(details) = details {
            message.push_str(": ");
            message.push_str(&details);
        }
        OcrError::Server { status, message }
    }
}

/// An image could not be rendered or retrieved as bytes.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("image has no usable source")]
    NoSource,

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("failed to fetch {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("malformed data URI")]
    InvalidDataUri,
}

/// The speech engine reported an error or was interrupted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NarrationError {
    #[error("speech engine error: {0}")]
    Engine(String),

    #[error("narration interrupted")]
    Interrupted,
}

/// Settings failed validation or could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("OCR endpoint is required")]
    MissingEndpoint,

    #[error("invalid OCR endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by the session command surface.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("no async runtime available to run the session")]
    NoRuntime,
}

/// Failures of the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load page {source_name}: {message}")]
    Page { source_name: String, message: String },

    #[error("failed to read {path}: {error}")]
    Read {
        path: String,
        error: std::io::Error,
    },

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}
