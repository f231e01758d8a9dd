//! Reading settings and pipeline pacing.
//!
//! Settings are read once per session start. They come from
//! `~/.config/comic-narrator/settings.json` (defaults if missing), with the
//! OCR endpoint overridable through `COMIC_NARRATOR_OCR_URL`, and finally
//! from whatever the caller passes to `start_reading`.

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Env var that overrides the configured OCR endpoint.
pub const OCR_URL_ENV: &str = "COMIC_NARRATOR_OCR_URL";

pub const RATE_RANGE: (f32, f32) = (0.1, 10.0);
pub const PITCH_RANGE: (f32, f32) = (0.0, 2.0);
pub const VOLUME_RANGE: (f32, f32) = (0.0, 1.0);
pub const BATCH_SIZE_RANGE: (usize, usize) = (1, 20);

/// User-facing narration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub voice_index: u32,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub batch_size: usize,
    /// Base address of the OCR collaborator, e.g. `http://localhost:3000`.
    pub ocr_endpoint: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_index: 0,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            batch_size: 5,
            ocr_endpoint: None,
        }
    }
}

impl Settings {
    /// Check every field against its allowed range.
    ///
    /// The endpoint is required: a session cannot start without one.
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_range("rate", self.rate as f64, RATE_RANGE)?;
        check_range("pitch", self.pitch as f64, PITCH_RANGE)?;
        check_range("volume", self.volume as f64, VOLUME_RANGE)?;
        check_range(
            "batchSize",
            self.batch_size as f64,
            (BATCH_SIZE_RANGE.0 as f64, BATCH_SIZE_RANGE.1 as f64),
        )?;

        let endpoint = match self.ocr_endpoint.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => e,
            _ => return Err(SettingsError::MissingEndpoint),
        };
        match reqwest::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(SettingsError::InvalidEndpoint(endpoint.to_string())),
        }
    }

    /// The endpoint with any trailing slash removed.
    ///
    /// Only meaningful after `validate` succeeded.
    pub fn endpoint_base(&self) -> &str {
        self.ocr_endpoint
            .as_deref()
            .map(|e| e.trim().trim_end_matches('/'))
            .unwrap_or_default()
    }

    /// Apply environment overrides on top of the loaded settings.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(OCR_URL_ENV) {
            if !url.trim().is_empty() {
                log::info!("[SETTINGS] OCR endpoint overridden by {}", OCR_URL_ENV);
                self.ocr_endpoint = Some(url);
            }
        }
        self
    }
}

fn check_range<T: Into<f64> + Copy>(
    field: &'static str,
    value: f64,
    (min, max): (T, T),
) -> Result<(), SettingsError> {
    let (min, max) = (min.into(), max.into());
    if value.is_nan() || value < min || value > max {
        return Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Directory where settings are stored.
fn settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("comic-narrator")
}

/// Full path to the settings file.
pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

/// Load settings from disk.
///
/// Returns defaults if the file doesn't exist or is invalid.
pub fn load_settings() -> Settings {
    load_settings_from(&settings_path())
}

pub fn load_settings_from(path: &std::path::Path) -> Settings {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("[SETTINGS] Ignoring invalid {}: {}", path.display(), e);
                Settings::default()
            }
        },
        Err(_) => Settings::default(),
    }
}

/// Persist settings, creating the config directory if needed.
pub fn save_settings_to(path: &std::path::Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    log::info!("[SETTINGS] Saved settings to {}", path.display());
    Ok(())
}

/// Fixed delays and budgets used by the pipeline.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Pause between consecutive utterances.
    pub utterance_pause: Duration,
    /// Delay after each lazy-render scroll step.
    pub scroll_step: Duration,
    /// Settle time after the initial jump to the bottom of the page.
    pub bottom_settle: Duration,
    /// Settle time after all lazy-render nudges.
    pub final_settle: Duration,
    /// Hard cap on the whole lazy-render routine.
    pub render_budget: Duration,
    pub max_scroll_steps: usize,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            utterance_pause: Duration::from_millis(500),
            scroll_step: Duration::from_millis(100),
            bottom_settle: Duration::from_millis(200),
            final_settle: Duration::from_millis(500),
            render_budget: Duration::from_secs(5),
            max_scroll_steps: 40,
        }
    }
}

impl Pacing {
    /// No delays at all. Used by tests and dry runs.
    pub fn instant() -> Self {
        Self {
            utterance_pause: Duration::ZERO,
            scroll_step: Duration::ZERO,
            bottom_settle: Duration::ZERO,
            final_settle: Duration::ZERO,
            render_budget: Duration::from_secs(5),
            max_scroll_steps: 40,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        Settings {
            ocr_endpoint: Some("http://localhost:3000/".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn missing_endpoint_is_rejected() {
        let err = Settings::default().validate().unwrap_err();
        assert!(matches!(err, SettingsError::MissingEndpoint));

        let blank = Settings {
            ocr_endpoint: Some("   ".to_string()),
            ..Settings::default()
        };
        assert!(matches!(blank.validate(), Err(SettingsError::MissingEndpoint)));
    }

    #[test]
    fn non_http_endpoint_is_rejected() {
        let s = Settings {
            ocr_endpoint: Some("ftp://example.com".to_string()),
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(SettingsError::InvalidEndpoint(_))));
    }

    #[test]
    fn ranges_are_enforced() {
        assert!(valid().validate().is_ok());

        let fast = Settings { rate: 11.0, ..valid() };
        assert!(matches!(
            fast.validate(),
            Err(SettingsError::OutOfRange { field: "rate", .. })
        ));

        let zero_batch = Settings { batch_size: 0, ..valid() };
        assert!(matches!(
            zero_batch.validate(),
            Err(SettingsError::OutOfRange { field: "batchSize", .. })
        ));

        let loud = Settings { volume: 1.5, ..valid() };
        assert!(loud.validate().is_err());
    }

    #[test]
    fn endpoint_base_strips_trailing_slash() {
        assert_eq!(valid().endpoint_base(), "http://localhost:3000");
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"batchSize": 3, "ocrEndpoint": "http://x"}"#).unwrap();
        assert_eq!(s.batch_size, 3);
        assert_eq!(s.rate, 1.0);
        assert_eq!(s.ocr_endpoint.as_deref(), Some("http://x"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let path = std::env::temp_dir()
            .join("comic-narrator-settings-test")
            .join("settings.json");
        let settings = Settings { voice_index: 2, pitch: 1.5, ..valid() };
        save_settings_to(&path, &settings).unwrap();
        assert_eq!(load_settings_from(&path), settings);

        // Cleanup
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join("comic-narrator-does-not-exist.json");
        assert_eq!(load_settings_from(&path), Settings::default());
    }
}
