//! In-process fakes for driving a `ReaderSession` without network or audio.

use async_trait::async_trait;
use comic_narrator_lib::convert::{EncodedImage, ImageFetcher};
use comic_narrator_lib::error::{ConversionError, NarrationError, OcrError};
use comic_narrator_lib::ocr::{OcrService, NO_TEXT_SENTINEL};
use comic_narrator_lib::page::{NodeId, Page, StaticPage, StyleProperty};
use comic_narrator_lib::playback::ReaderSession;
use comic_narrator_lib::speech::{SpeechEngine, Utterance};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// A page with one `<img>` per source, in document order.
pub fn comic_page(sources: &[&str]) -> Arc<StaticPage> {
    let html: String = sources
        .iter()
        .map(|s| format!(r#"<div class="comic-page"><img src="{}"></div>"#, s))
        .collect();
    Arc::new(StaticPage::from_html(&html, None))
}

/// Returns the locator itself as the image bytes, so OCR fakes can tell
/// images apart.
#[derive(Default)]
pub struct EchoFetcher {
    pub broken: HashSet<String>,
}

#[async_trait]
impl ImageFetcher for EchoFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, ConversionError> {
        if self.broken.contains(locator) {
            return Err(ConversionError::HttpStatus {
                url: locator.to_string(),
                status: 404,
            });
        }
        Ok(locator.as_bytes().to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OcrRequest {
    Single(String),
    Batch(Vec<String>),
}

/// OCR keyed by image locator. Unknown images get the no-text sentinel.
#[derive(Default)]
pub struct ScriptedOcr {
    texts: HashMap<String, String>,
    /// Batch requests containing this image fail.
    fail_batch_with: Option<String>,
    requests: Mutex<Vec<OcrRequest>>,
}

impl ScriptedOcr {
    pub fn new(texts: &[(&str, &str)]) -> Self {
        Self {
            texts: texts
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing_batch_with(mut self, source: &str) -> Self {
        self.fail_batch_with = Some(source.to_string());
        self
    }

    pub fn requests(&self) -> Vec<OcrRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn text_for(&self, id: &str) -> String {
        self.texts
            .get(id)
            .cloned()
            .unwrap_or_else(|| NO_TEXT_SENTINEL.to_string())
    }
}

fn image_id(image: &EncodedImage) -> String {
    String::from_utf8_lossy(&image.bytes).into_owned()
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn recognize(&self, image: EncodedImage) -> Result<String, OcrError> {
        let id = image_id(&image);
        self.requests
            .lock()
            .unwrap()
            .push(OcrRequest::Single(id.clone()));
        Ok(self.text_for(&id))
    }

    async fn recognize_batch(&self, images: Vec<EncodedImage>) -> Result<String, OcrError> {
        let ids: Vec<String> = images.iter().map(image_id).collect();
        self.requests
            .lock()
            .unwrap()
            .push(OcrRequest::Batch(ids.clone()));
        if let Some(bad) = &self.fail_batch_with {
            if ids.contains(bad) {
                return Err(OcrError::from_body(
                    500,
                    Some("Failed to process images".to_string()),
                    None,
                ));
            }
        }
        Ok(ids
            .iter()
            .enumerate()
            .map(|(i, id)| format!("IMAGE {}: {}\n", i + 1, self.text_for(id)))
            .collect())
    }
}

/// What the speech engine heard, and which image was highlighted at the time.
#[derive(Debug, Clone, PartialEq)]
pub struct Spoken {
    pub utterance: Utterance,
    pub highlighted: Option<NodeId>,
    /// Session's current index when the utterance began, if watching.
    pub current_index: Option<usize>,
}

#[derive(Default)]
pub struct RecordingSpeech {
    page: Option<Arc<StaticPage>>,
    hold: bool,
    /// Utterances with this text fail with an engine error.
    failing: HashSet<String>,
    session: Mutex<Option<ReaderSession>>,
    spoken: Mutex<Vec<Spoken>>,
    pub started: Notify,
    release: Notify,
    cancels: Mutex<usize>,
}

impl RecordingSpeech {
    pub fn new(page: Arc<StaticPage>) -> Self {
        Self {
            page: Some(page),
            ..Self::default()
        }
    }

    /// Every utterance blocks until `cancel()`.
    pub fn holding(page: Arc<StaticPage>) -> Self {
        Self {
            hold: true,
            ..Self::new(page)
        }
    }

    pub fn failing_on(mut self, text: &str) -> Self {
        self.failing.insert(text.to_string());
        self
    }

    /// Record the session's current index with every utterance.
    pub fn watch(&self, session: &ReaderSession) {
        *self.session.lock().unwrap() = Some(session.clone());
    }

    pub fn current_indices(&self) -> Vec<Option<usize>> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.current_index)
            .collect()
    }

    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.utterance.text.clone())
            .collect()
    }

    pub fn spoken(&self) -> Vec<Spoken> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn cancel_count(&self) -> usize {
        *self.cancels.lock().unwrap()
    }
}

/// The node currently wearing the highlight outline, if any.
pub fn highlighted_node(page: &StaticPage) -> Option<NodeId> {
    page.nodes()
        .into_iter()
        .find(|&n| page.style(n, StyleProperty::Outline) == "4px solid #4285f4")
}

#[async_trait]
impl SpeechEngine for RecordingSpeech {
    async fn speak(&self, utterance: Utterance) -> Result<(), NarrationError> {
        let highlighted = self.page.as_deref().and_then(highlighted_node);
        let current_index = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|s| s.snapshot().current_index);
        let fails = self.failing.contains(&utterance.text);
        let released = self.release.notified();
        self.spoken.lock().unwrap().push(Spoken {
            utterance,
            highlighted,
            current_index,
        });
        self.started.notify_one();
        if self.hold {
            released.await;
            return Err(NarrationError::Interrupted);
        }
        if fails {
            return Err(NarrationError::Engine("synthesis failed".to_string()));
        }
        Ok(())
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
        self.release.notify_waiters();
    }
}
