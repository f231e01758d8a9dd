//! Speech engine seam.
//!
//! The session hands one utterance at a time to a `SpeechEngine` and waits
//! for it to finish. Voice selection beyond the engine's catalogue is the
//! engine's concern.

use crate::error::NarrationError;
use crate::settings::Settings;
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::sync::Notify;

/// One piece of text to speak with the session's voice settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub voice_index: u32,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, settings: &Settings) -> Self {
        Self {
            text: text.into(),
            voice_index: settings.voice_index,
            rate: settings.rate,
            pitch: settings.pitch,
            volume: settings.volume,
        }
    }
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Speak and resolve when the utterance ends or errors.
    async fn speak(&self, utterance: Utterance) -> Result<(), NarrationError>;

    /// Cut off whatever is being spoken. Safe to call when idle.
    fn cancel(&self);
}

/// Average words per second at rate 1.0.
const WORDS_PER_SECOND: f32 = 2.5;

/// Writes utterances to stdout and waits roughly as long as speaking them
/// would take.
#[derive(Default)]
pub struct ConsoleSpeech {
    interrupt: Notify,
}

impl ConsoleSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn estimated_duration(utterance: &Utterance) -> Duration {
        let words = utterance.text.split_whitespace().count() as f32;
        let rate = utterance.rate.max(0.1);
        Duration::from_secs_f32(words / (WORDS_PER_SECOND * rate))
    }
}

#[async_trait]
impl SpeechEngine for ConsoleSpeech {
    async fn speak(&self, utterance: Utterance) -> Result<(), NarrationError> {
        {
            let mut out = std::io::stdout().lock();
            writeln!(out, "{}", utterance.text)
                .and_then(|_| out.flush())
                .map_err(|e| NarrationError::Engine(e.to_string()))?;
        }

        let interrupted = self.interrupt.notified();
        tokio::select! {
            _ = interrupted => Err(NarrationError::Interrupted),
            _ = tokio::time::sleep(Self::estimated_duration(&utterance)) => Ok(()),
        }
    }

    fn cancel(&self) {
        self.interrupt.notify_waiters();
    }
}
