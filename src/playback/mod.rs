//! Playback domain: public API.
//!
//! `ReaderSession` owns one reading run at a time: discovery, the
//! lazy-render pass, batched OCR, then image-by-image narration with the
//! current panel highlighted. The run executes as a tokio task; `stop()`
//! cancels it cooperatively and puts the session back to Idle.

mod highlight;

pub use highlight::Highlighter;

use crate::batch::{Batch, BatchResultMap, BatchScheduler};
use crate::convert::{ImageConverter, ImageFetcher};
use crate::discovery::{DiscoveryEngine, ImageCandidate};
use crate::error::{DiscoveryError, NarrationError, SessionError};
use crate::lazy_render::force_render;
use crate::ocr::{is_no_text, HttpOcrClient, OcrService};
use crate::page::{NodeId, Page};
use crate::settings::{Pacing, Settings};
use crate::speech::{SpeechEngine, Utterance};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const NO_IMAGES_NOTICE: &str =
    "No comic images found on this page. Try scrolling down to load more images.";
pub const NOTHING_EXTRACTED_NOTICE: &str = "No text could be extracted from the comic images.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyReading,
}

/// Text waiting to be narrated, tied to the queue index it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextQueueItem {
    pub index: usize,
    pub text: String,
}

/// Point-in-time view of the session, for callers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub settings: Settings,
    pub image_queue: Vec<ImageCandidate>,
    pub text_queue_len: usize,
    pub current_index: Option<usize>,
    pub batch_cursor: usize,
    pub batches: Vec<Batch>,
    /// Images their batch answered for, including no-text answers.
    pub mapped: usize,
    pub processed: HashSet<String>,
    /// Queue indices whose text was handed to the speech engine, in order.
    pub narrated: Vec<usize>,
    pub highlighted: Option<NodeId>,
}

struct SessionState {
    status: SessionStatus,
    /// Bumped on every start; a task whose id is stale must not write.
    run_id: u64,
    cancel: CancellationToken,
    settings: Settings,
    image_queue: Vec<ImageCandidate>,
    text_queue: VecDeque<TextQueueItem>,
    results: BatchResultMap,
    batches: Vec<Batch>,
    current_index: Option<usize>,
    batch_cursor: usize,
    processed: HashSet<String>,
    narrated: Vec<usize>,
    highlighter: Highlighter,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: SessionStatus::Idle,
            run_id: 0,
            cancel: CancellationToken::new(),
            settings: Settings::default(),
            image_queue: Vec::new(),
            text_queue: VecDeque::new(),
            results: BatchResultMap::default(),
            batches: Vec::new(),
            current_index: None,
            batch_cursor: 0,
            processed: HashSet::new(),
            narrated: Vec::new(),
            highlighter: Highlighter::default(),
        }
    }
}

struct Shared {
    page: Arc<dyn Page>,
    fetcher: Arc<dyn ImageFetcher>,
    speech: Arc<dyn SpeechEngine>,
    ocr_override: Option<Arc<dyn OcrService>>,
    pacing: Pacing,
    discovery: DiscoveryEngine,
    state: Mutex<SessionState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` on the state if `run_id` is still the live run.
    fn update<R>(&self, run_id: u64, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let mut state = self.lock();
        if state.run_id != run_id || state.status != SessionStatus::Reading {
            return None;
        }
        Some(f(&mut state))
    }
}

/// A reading session bound to one page. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReaderSession {
    shared: Arc<Shared>,
}

impl ReaderSession {
    pub fn create(
        page: Arc<dyn Page>,
        fetcher: Arc<dyn ImageFetcher>,
        speech: Arc<dyn SpeechEngine>,
        pacing: Pacing,
    ) -> Self {
        Self::build(page, fetcher, speech, None, pacing)
    }

    /// Like `create`, but OCR goes to `ocr` instead of an HTTP client built
    /// from the configured endpoint.
    pub fn with_ocr(
        page: Arc<dyn Page>,
        fetcher: Arc<dyn ImageFetcher>,
        speech: Arc<dyn SpeechEngine>,
        ocr: Arc<dyn OcrService>,
        pacing: Pacing,
    ) -> Self {
        Self::build(page, fetcher, speech, Some(ocr), pacing)
    }

    fn build(
        page: Arc<dyn Page>,
        fetcher: Arc<dyn ImageFetcher>,
        speech: Arc<dyn SpeechEngine>,
        ocr_override: Option<Arc<dyn OcrService>>,
        pacing: Pacing,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                page,
                fetcher,
                speech,
                ocr_override,
                pacing,
                discovery: DiscoveryEngine::default(),
                state: Mutex::new(SessionState::default()),
                task: Mutex::new(None),
            }),
        }
    }

    /// Begin a run with `settings`. Validation happens before any work.
    pub fn start(&self, settings: Settings) -> Result<StartOutcome, SessionError> {
        settings.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        if self.status() == SessionStatus::Reading {
            log::info!("[PLAYBACK] Already reading");
            return Ok(StartOutcome::AlreadyReading);
        }

        let ocr: Arc<dyn OcrService> = match &self.shared.ocr_override {
            Some(ocr) => ocr.clone(),
            None => Arc::new(HttpOcrClient::new(settings.endpoint_base())?),
        };

        let (run_id, cancel) = {
            let mut state = self.shared.lock();
            if state.status == SessionStatus::Reading {
                return Ok(StartOutcome::AlreadyReading);
            }
            let run_id = state.run_id + 1;
            *state = SessionState {
                status: SessionStatus::Reading,
                run_id,
                settings: settings.clone(),
                ..SessionState::default()
            };
            (run_id, state.cancel.clone())
        };

        log::info!(
            "[PLAYBACK] Starting run {} (batch size {}, rate {}, voice {})",
            run_id,
            settings.batch_size,
            settings.rate,
            settings.voice_index
        );
        let shared = self.shared.clone();
        let handle = runtime.spawn(async move {
            run_session(&shared, run_id, &cancel, ocr, &settings).await;
            finish(&shared, run_id);
        });
        *self.shared.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(StartOutcome::Started)
    }

    /// Stop reading immediately. Safe to call in any state, any number of times.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        state.cancel.cancel();
        self.shared.speech.cancel();
        state.text_queue.clear();
        state.image_queue.clear();
        state.current_index = None;
        state.highlighter.clear(self.shared.page.as_ref());
        if state.status == SessionStatus::Reading {
            log::info!("[PLAYBACK] Stopped");
        }
        state.status = SessionStatus::Idle;
    }

    /// Wait for the current run's task, if any, to finish.
    pub async fn wait(&self) {
        let handle = self.shared.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    log::error!("[PLAYBACK] Session task failed: {}", e);
                }
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.lock().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.shared.lock();
        SessionSnapshot {
            status: state.status,
            settings: state.settings.clone(),
            image_queue: state.image_queue.clone(),
            text_queue_len: state.text_queue.len(),
            current_index: state.current_index,
            batch_cursor: state.batch_cursor,
            batches: state.batches.clone(),
            mapped: state.results.len(),
            processed: state.processed.clone(),
            narrated: state.narrated.clone(),
            highlighted: state.highlighter.current(),
        }
    }

    /// Stop and tear down the background task.
    pub fn dispose(&self) {
        self.stop();
        if let Some(handle) = self.shared.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }
}

/// Return to Idle at the natural end of a run.
fn finish(shared: &Shared, run_id: u64) {
    let page = shared.page.clone();
    shared.update(run_id, |state| {
        state.highlighter.clear(page.as_ref());
        state.current_index = None;
        state.text_queue.clear();
        state.status = SessionStatus::Idle;
        log::info!(
            "[PLAYBACK] Run {} finished, narrated {} of {} images",
            run_id,
            state.narrated.len(),
            state.image_queue.len()
        );
    });
}

async fn run_session(
    shared: &Shared,
    run_id: u64,
    cancel: &CancellationToken,
    ocr: Arc<dyn OcrService>,
    settings: &Settings,
) {
    let page = shared.page.as_ref();

    match shared.discovery.discover(page, &HashSet::new()) {
        Ok(found) => log::info!("[PLAYBACK] Initial pass found {} images", found.len()),
        Err(DiscoveryError::NoImagesFound) => {
            log::info!("[PLAYBACK] Nothing on the first pass, forcing lazy content")
        }
    }

    force_render(page, &shared.pacing, cancel).await;
    if cancel.is_cancelled() {
        return;
    }

    let processed = shared.update(run_id, |s| s.processed.clone()).unwrap_or_default();
    let queue = match shared.discovery.discover(page, &processed) {
        Ok(queue) => queue,
        Err(e) => {
            log::info!("[PLAYBACK] {}", e);
            announce(shared, cancel, NO_IMAGES_NOTICE, settings).await;
            return;
        }
    };
    if shared
        .update(run_id, |s| s.image_queue = queue.clone())
        .is_none()
    {
        return;
    }

    let converter = ImageConverter::new(shared.page.clone(), shared.fetcher.clone());
    let scheduler = BatchScheduler::new(ocr.clone(), converter.clone());
    let run = scheduler
        .run(&queue, settings.batch_size, cancel, |batch| {
            shared.update(run_id, |s| s.batch_cursor = batch.range.end);
        })
        .await;
    if cancel.is_cancelled() {
        return;
    }
    log::info!(
        "[PLAYBACK] Batches mapped {} of {} images",
        run.results.len(),
        queue.len()
    );
    let results = run.results;
    if shared
        .update(run_id, |s| {
            s.batches = run.batches;
            s.results = results.clone();
        })
        .is_none()
    {
        return;
    }

    for (index, candidate) in queue.iter().enumerate() {
        let started = shared.update(run_id, |s| {
            s.processed.insert(candidate.source.clone());
            if let Some(c) = s.image_queue.get_mut(index) {
                c.processed = true;
            }
            s.current_index = Some(index);
            s.highlighter.apply(page, candidate.node);
            page.scroll_into_view(candidate.node);
        });
        if started.is_none() || cancel.is_cancelled() {
            return;
        }

        let text = match results.get(index) {
            Some(text) => Some(text.to_string()),
            None => recognize_single(&converter, ocr.as_ref(), candidate, index, cancel).await,
        };
        if cancel.is_cancelled() {
            return;
        }

        let text = match text {
            Some(text) if !is_no_text(&text) => text,
            _ => {
                log::info!("[PLAYBACK] No text for image {}, skipping", index + 1);
                shared.update(run_id, |s| s.highlighter.clear(page));
                continue;
            }
        };

        let queued = shared.update(run_id, |s| {
            s.text_queue.push_back(TextQueueItem {
                index,
                text: text.trim().to_string(),
            });
            s.text_queue.len() == 1
        });
        match queued {
            Some(true) => {
                if !narrate_queue(shared, run_id, cancel, settings).await {
                    return;
                }
            }
            Some(false) => {}
            None => return,
        }
    }

    let narrated_any = shared
        .update(run_id, |s| !s.narrated.is_empty())
        .unwrap_or(true);
    if !narrated_any {
        announce(shared, cancel, NOTHING_EXTRACTED_NOTICE, settings).await;
    }
}

/// Per-image fallback when the batch left an image unmapped.
async fn recognize_single(
    converter: &ImageConverter,
    ocr: &dyn OcrService,
    candidate: &ImageCandidate,
    index: usize,
    cancel: &CancellationToken,
) -> Option<String> {
    log::info!("[PLAYBACK] Image {} not mapped by its batch, single OCR", index + 1);
    let image = tokio::select! {
        _ = cancel.cancelled() => return None,
        converted = converter.to_bytes(candidate) => converted,
    };
    let image = match image {
        Ok(image) => image,
        Err(e) => {
            log::warn!("[PLAYBACK] Could not convert image {}: {}", index + 1, e);
            return None;
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => None,
        result = ocr.recognize(image) => match result {
            Ok(text) => Some(text),
            Err(e) => {
                log::warn!("[PLAYBACK] Single OCR failed for image {}: {}", index + 1, e);
                None
            }
        },
    }
}

/// Drain the text queue, one utterance at a time. Returns false if the run
/// was cancelled or superseded.
async fn narrate_queue(
    shared: &Shared,
    run_id: u64,
    cancel: &CancellationToken,
    settings: &Settings,
) -> bool {
    let page = shared.page.as_ref();
    loop {
        let next = shared.update(run_id, |s| {
            let item = s.text_queue.front().cloned()?;
            if let Some(candidate) = s.image_queue.get(item.index) {
                s.highlighter.apply(page, candidate.node);
            }
            s.narrated.push(item.index);
            Some(item)
        });
        let item = match next {
            Some(Some(item)) => item,
            Some(None) => return true,
            None => return false,
        };

        log::info!(
            "[PLAYBACK] Narrating image {}: {}",
            item.index + 1,
            crate::discovery::truncate(&item.text, 60)
        );
        let spoken = tokio::select! {
            _ = cancel.cancelled() => return false,
            res = shared.speech.speak(Utterance::new(item.text, settings)) => res,
        };
        if cancel.is_cancelled() {
            return false;
        }
        let engine_failed = match spoken {
            Ok(()) => false,
            Err(NarrationError::Interrupted) => {
                log::info!("[PLAYBACK] Narration interrupted");
                true
            }
            Err(e) => {
                log::warn!("[PLAYBACK] {}, moving on", e);
                true
            }
        };

        let more = shared.update(run_id, |s| {
            s.text_queue.pop_front();
            let more = !s.text_queue.is_empty();
            if !more {
                s.highlighter.clear(page);
            }
            more
        });
        match more {
            Some(true) => {
                if !engine_failed && !pause(shared.pacing.utterance_pause, cancel).await {
                    return false;
                }
            }
            Some(false) => return true,
            None => return false,
        }
    }
}

/// Speak a fixed notice. Errors are logged and ignored.
async fn announce(shared: &Shared, cancel: &CancellationToken, text: &str, settings: &Settings) {
    log::info!("[PLAYBACK] Notice: {}", text);
    tokio::select! {
        _ = cancel.cancelled() => {}
        res = shared.speech.speak(Utterance::new(text, settings)) => {
            if let Err(e) = res {
                log::warn!("[PLAYBACK] Notice not spoken: {}", e);
            }
        }
    }
}

async fn pause(delay: std::time::Duration, cancel: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
