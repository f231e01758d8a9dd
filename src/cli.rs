//! Command-line front end.
//!
//! `read` narrates a page to the terminal, `discover` prints the panel
//! queue a page would produce, and `parse` splits a saved batch OCR
//! response into its per-image segments.

use crate::commands;
use crate::convert::HttpFetcher;
use crate::discovery::DiscoveryEngine;
use crate::error::CliError;
use crate::ocr::parse_batch_text;
use crate::page::{Page, StaticPage};
use crate::playback::ReaderSession;
use crate::settings::{self, Pacing, Settings};
use crate::speech::ConsoleSpeech;
use clap::{Args, Parser, Subcommand};
use reqwest::Url;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "comic-narrator")]
#[command(version, about = "Reads web comics aloud: panel discovery, batched OCR, narration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Narrate the comic on a page
    Read {
        /// Page URL or local HTML file
        source: String,

        #[command(flatten)]
        overrides: SettingsArgs,

        /// Write the effective settings back to the settings file
        #[arg(long)]
        save: bool,
    },

    /// Print the panels found on a page, in reading order
    Discover {
        /// Page URL or local HTML file
        source: String,
    },

    /// Split a saved batch OCR response into per-image segments
    Parse {
        /// File holding the response text
        file: PathBuf,
    },
}

/// Per-run overrides on top of the settings file.
#[derive(Args, Debug, Default)]
struct SettingsArgs {
    /// OCR service base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Index into the speech engine's voice list
    #[arg(long)]
    voice: Option<u32>,

    /// Speech rate (0.1-10)
    #[arg(long)]
    rate: Option<f32>,

    /// Speech pitch (0-2)
    #[arg(long)]
    pitch: Option<f32>,

    /// Speech volume (0-1)
    #[arg(long)]
    volume: Option<f32>,

    /// Images per OCR request (1-20)
    #[arg(long)]
    batch_size: Option<usize>,
}

impl SettingsArgs {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(endpoint) = self.endpoint {
            settings.ocr_endpoint = Some(endpoint);
        }
        if let Some(voice) = self.voice {
            settings.voice_index = voice;
        }
        if let Some(rate) = self.rate {
            settings.rate = rate;
        }
        if let Some(pitch) = self.pitch {
            settings.pitch = pitch;
        }
        if let Some(volume) = self.volume {
            settings.volume = volume;
        }
        if let Some(batch_size) = self.batch_size {
            settings.batch_size = batch_size;
        }
        settings
    }
}

pub async fn execute(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Read {
            source,
            overrides,
            save,
        } => read(&source, overrides, save).await,
        Commands::Discover { source } => discover(&source).await,
        Commands::Parse { file } => parse(file),
    }
}

async fn read(source: &str, overrides: SettingsArgs, save: bool) -> Result<(), CliError> {
    let settings = overrides.apply(settings::load_settings().with_env_overrides());
    if save {
        settings.validate()?;
        settings::save_settings_to(&settings::settings_path(), &settings)?;
    }

    let page: Arc<dyn Page> = Arc::new(load_page(source).await?);
    let session = ReaderSession::create(
        page,
        Arc::new(HttpFetcher::new()),
        Arc::new(ConsoleSpeech::new()),
        Pacing::default(),
    );

    let ack = commands::start_reading(&session, settings);
    if !ack.success {
        return Err(CliError::Rejected(ack.error.unwrap_or_default()));
    }

    tokio::select! {
        _ = session.wait() => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("[CLI] Interrupted, stopping");
            commands::stop_reading(&session);
        }
    }
    session.dispose();
    Ok(())
}

async fn discover(source: &str) -> Result<(), CliError> {
    let page = load_page(source).await?;
    let queue = DiscoveryEngine::default().discover(&page, &HashSet::new())?;
    for (i, candidate) in queue.iter().enumerate() {
        let size = candidate
            .natural_size
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "?".to_string());
        println!("{:>3}  y={:<8} {:<9} {}", i + 1, candidate.top, size, candidate.source);
    }
    Ok(())
}

fn parse(file: PathBuf) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&file).map_err(|error| CliError::Read {
        path: file.display().to_string(),
        error,
    })?;
    for (i, segment) in parse_batch_text(&text).iter().enumerate() {
        println!("IMAGE {}: {}", i + 1, segment);
    }
    Ok(())
}

/// Build a page from a URL or a local HTML file.
async fn load_page(source: &str) -> Result<StaticPage, CliError> {
    let page_err = |message: String| CliError::Page {
        source_name: source.to_string(),
        message,
    };

    if source.starts_with("http://") || source.starts_with("https://") {
        let url = Url::parse(source).map_err(|e| page_err(e.to_string()))?;
        let response = reqwest::get(url.clone())
            .await
            .map_err(|e| page_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(page_err(format!("HTTP {}", response.status())));
        }
        let html = response.text().await.map_err(|e| page_err(e.to_string()))?;
        log::info!("[CLI] Loaded {} ({} bytes)", url, html.len());
        return Ok(StaticPage::from_html(&html, Some(url)));
    }

    let path = std::fs::canonicalize(source).map_err(|e| page_err(e.to_string()))?;
    let html = std::fs::read_to_string(&path).map_err(|error| CliError::Read {
        path: path.display().to_string(),
        error,
    })?;
    Ok(StaticPage::from_html(&html, Url::from_file_path(&path).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_given_fields() {
        let args = SettingsArgs {
            rate: Some(2.0),
            batch_size: Some(3),
            ..SettingsArgs::default()
        };
        let settings = args.apply(Settings::default());
        assert_eq!(settings.rate, 2.0);
        assert_eq!(settings.batch_size, 3);
        assert_eq!(settings.pitch, 1.0);
        assert_eq!(settings.ocr_endpoint, None);
    }

    #[test]
    fn read_subcommand_parses_flags() {
        let cli = Cli::try_parse_from([
            "comic-narrator",
            "read",
            "https://comics.example/ch/1",
            "--endpoint",
            "http://localhost:3000",
            "--batch-size",
            "4",
        ])
        .unwrap();
        match cli.command {
            Commands::Read {
                source, overrides, ..
            } => {
                assert_eq!(source, "https://comics.example/ch/1");
                assert_eq!(overrides.batch_size, Some(4));
                assert_eq!(overrides.endpoint.as_deref(), Some("http://localhost:3000"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
