mod config;
mod db;
mod error;
mod models;
mod orchestrator;
mod scheduler;
mod schema;
mod services;
mod shrink;
mod sidecar;
mod store;
mod watcher;

use crate::config::{AppPaths, Settings};
use crate::error::{Error, Result};
use crate::orchestrator::Collaborators;
use crate::services::{ExecTranslator, ExecVisionLabeler};
use clap::{Parser, Subcommand};
use crossbeam_channel::{bounded, unbounded};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;

#[derive(Parser)]
#[command(name = "photo-sidecar", version, about = "Photo keyword sidecar pipeline")]
struct Cli {
    /// Path to the JSON settings file; defaults apply when omitted.
    #[arg(long, global = true, env = "PHOTO_SIDECAR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Watch the upload tree and drain the backlog on schedule.
    Run {
        /// Drain as soon as work appears instead of waiting for the trigger.
        #[arg(long)]
        immediate: bool,
    },
    /// Enqueue every existing photo under the watch root once.
    Rescan {
        /// Also reprocess photos that already finished or capped out.
        #[arg(long)]
        force: bool,
    },
    /// Run a single drain now.
    Drain {
        /// Ask a running daemon to drain instead of draining in-process.
        #[arg(long)]
        request: bool,
    },
    /// Toggle immediate mode on a running daemon.
    SetImmediate {
        /// Turn immediate mode off instead of on.
        #[arg(long)]
        off: bool,
    },
    /// Ask a running daemon to shut down cleanly.
    Stop,
    /// Print per-state counts and a sample of failed records as JSON.
    Status {
        #[arg(long, default_value_t = 5)]
        failed_samples: usize,
    },
    /// Move FAILED records back into the drainable set.
    ResetFailed {
        /// Reset a single record; omit to reset all failed records.
        #[arg(long)]
        identity: Option<String>,
    },
}

fn build_collaborators(settings: &Settings) -> Result<Collaborators> {
    let vision = settings
        .vision_command
        .clone()
        .ok_or_else(|| Error::Init("vision_command is not configured".into()))?;
    let translate = settings
        .translate_command
        .clone()
        .ok_or_else(|| Error::Init("translate_command is not configured".into()))?;
    Ok(Collaborators {
        vision: Arc::new(ExecVisionLabeler::new(vision, settings.call_timeout_ms)),
        translator: Arc::new(ExecTranslator::new(translate, settings.call_timeout_ms)),
    })
}

/// Drops a command into the control mailbox for a running daemon to pick up
/// on its next tick.
fn enqueue_command(settings: &Settings, command: scheduler::Command) -> Result<()> {
    let paths = AppPaths::discover(settings)?;
    let pool = db::init_database(&paths.db_path)?;
    let conn = pool.get()?;
    store::enqueue_control(&conn, command.as_wire())?;
    log::info!("Queued control command {}", command.as_wire());
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        CliCommand::Run { immediate } => {
            if immediate {
                settings.immediate = true;
            }
            let paths = AppPaths::discover(&settings)?;
            let pool = db::init_database(&paths.db_path)?;
            let collaborators = build_collaborators(&settings)?;
            let cancel = Arc::new(AtomicBool::new(false));

            let (event_tx, event_rx) = bounded(256);
            let shrink_handle = {
                let pool = pool.clone();
                let staging = paths.staging_dir.clone();
                let settings = settings.clone();
                let cancel = cancel.clone();
                thread::spawn(move || {
                    shrink::run_shrink_stage(event_rx, pool, staging, settings, cancel)
                })
            };
            let watch_handle = {
                let settings = settings.clone();
                let cancel = cancel.clone();
                thread::spawn(move || watcher::scan_loop(settings, event_tx, cancel))
            };

            // The in-process channel stays open for the daemon's lifetime;
            // operator commands arrive through the control mailbox and are
            // polled by the scheduler each tick.
            let (_cmd_tx, cmd_rx) = unbounded();
            log::info!(
                "Watching {} (immediate mode: {})",
                settings.watch_root.display(),
                settings.immediate
            );
            scheduler::run_scheduler(pool, collaborators, settings, cmd_rx, cancel.clone());

            let _ = watch_handle.join();
            let _ = shrink_handle.join();
        }
        CliCommand::Rescan { force } => {
            let paths = AppPaths::discover(&settings)?;
            let pool = db::init_database(&paths.db_path)?;
            let cancel = Arc::new(AtomicBool::new(false));

            let (event_tx, event_rx) = bounded(256);
            let mut handles = Vec::new();
            for _ in 0..2 {
                let rx = event_rx.clone();
                let pool = pool.clone();
                let staging = paths.staging_dir.clone();
                let settings = settings.clone();
                let cancel = cancel.clone();
                handles.push(thread::spawn(move || {
                    shrink::run_shrink_stage(rx, pool, staging, settings, cancel)
                }));
            }

            let sent = watcher::scan_once(&settings, &event_tx, force)?;
            drop(event_tx);
            for handle in handles {
                let _ = handle.join();
            }
            log::info!("Rescan enqueued {sent} photos");
        }
        CliCommand::Drain { request } => {
            if request {
                enqueue_command(&settings, scheduler::Command::DrainNow)?;
            } else {
                let paths = AppPaths::discover(&settings)?;
                let pool = db::init_database(&paths.db_path)?;
                let collaborators = build_collaborators(&settings)?;
                let cancel = Arc::new(AtomicBool::new(false));
                let outcome = orchestrator::run_drain(&pool, &collaborators, &settings, &cancel)?;
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            }
        }
        CliCommand::SetImmediate { off } => {
            enqueue_command(&settings, scheduler::Command::SetImmediate(!off))?;
        }
        CliCommand::Stop => {
            enqueue_command(&settings, scheduler::Command::Stop)?;
        }
        CliCommand::Status { failed_samples } => {
            let paths = AppPaths::discover(&settings)?;
            let pool = db::init_database(&paths.db_path)?;
            let conn = pool.get()?;
            let report = store::status_report(&conn, failed_samples)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        CliCommand::ResetFailed { identity } => {
            let paths = AppPaths::discover(&settings)?;
            let pool = db::init_database(&paths.db_path)?;
            let conn = pool.get()?;
            let reset = store::reset_failed(&conn, identity.as_deref())?;
            log::info!("Requeued {reset} failed records");
        }
    }
    Ok(())
}
