//! Command handlers for the session.
//!
//! Thin wrappers that turn a host message into a session call and an `Ack`.
//! Messages arrive as JSON, e.g. `{"action": "startReading", "settings": {...}}`.

use crate::playback::{ReaderSession, StartOutcome};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    StartReading {
        #[serde(default)]
        settings: Settings,
    },
    StopReading,
}

/// Reply to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Start reading with `settings`. Invalid settings fail before any work.
pub fn start_reading(session: &ReaderSession, settings: Settings) -> Ack {
    match session.start(settings) {
        Ok(StartOutcome::Started) => Ack::ok(),
        Ok(StartOutcome::AlreadyReading) => Ack {
            message: Some("Already reading".to_string()),
            ..Ack::ok()
        },
        Err(e) => {
            log::error!("[PLAYBACK] Start rejected: {}", e);
            Ack::failed(e.to_string())
        }
    }
}

pub fn stop_reading(session: &ReaderSession) -> Ack {
    session.stop();
    Ack::ok()
}

pub fn dispatch(session: &ReaderSession, command: Command) -> Ack {
    match command {
        Command::StartReading { settings } => start_reading(session, settings),
        Command::StopReading => stop_reading(session),
    }
}

/// Parse and dispatch a JSON message.
pub fn dispatch_json(session: &ReaderSession, message: &str) -> Ack {
    match serde_json::from_str::<Command>(message) {
        Ok(command) => dispatch(session, command),
        Err(e) => Ack::failed(format!("Invalid command: {}", e)),
    }
}
