//! Comic Narrator: reads web comics aloud.
//!
//! Wires the domains together: the page model, panel discovery, the
//! lazy-render pass, image conversion, batched OCR and the playback
//! session. No business logic lives here.
//!
//! Modules:
//!   - page / discovery / lazy_render - finding panels in reading order
//!   - convert / ocr / batch         - turning panels into text
//!   - playback / speech             - narration state machine
//!   - commands / cli                - host messages and the terminal front end

pub mod batch;
mod cli;
pub mod commands;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod lazy_render;
pub mod ocr;
pub mod page;
pub mod playback;
pub mod settings;
pub mod speech;

use clap::Parser;
use std::process::ExitCode;

/// Entry point for the binary.
pub fn run() -> ExitCode {
    // Load .env.local, then .env, from the working directory, first one wins.
    for env_file in [".env.local", ".env"] {
        let path = std::path::Path::new(env_file);
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => eprintln!("[STARTUP] Loaded {}", path.display()),
                Err(e) => eprintln!("[STARTUP] Failed to load {}: {}", path.display(), e),
            }
            break;
        }
    }

    env_logger::init();

    let cli = cli::Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", error::CliError::Runtime(e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::execute(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[CLI] {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
