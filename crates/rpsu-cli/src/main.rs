//! `rpsu` – RPSU telemetry monitor
//!
//! This binary polls every registered RPSU console on a fixed interval. It:
//!
//! 1. Loads `~/.rpsu/config.toml` (writing defaults on first run) and the
//!    device list.
//! 2. Restores each device's last journaled values so the status board is
//!    not blank until the first cycle.
//! 3. Starts one poller per device and prints every poll result.
//! 4. Drops the operator into an **interactive REPL** for managing devices
//!    and settings (`/help` lists the commands).
//! 5. Intercepts **Ctrl-C** to stop all pollers and exit cleanly.

mod config;
mod presenter;
mod registry;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use rpsu_console::TelnetConnector;
use rpsu_journal::CsvJournal;
use rpsu_middleware::{EventBus, Topic};
use rpsu_runtime::{PollingSupervisor, init_tracing};
use rpsu_types::EngineProfile;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::presenter::{StatusBoard, render_values};
use crate::registry::DeviceRegistry;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // Logs go to stderr so they do not interleave with the poll lines.
    let _tracing = init_tracing("rpsu");

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);

    let profile = EngineProfile::for_kind(cfg.profile);
    info!(profile = %cfg.profile, interval_minutes = cfg.poll_interval_minutes, "starting");

    // ── Device list ───────────────────────────────────────────────────────
    let registry = match DeviceRegistry::load(&cfg.registry_path, profile.max_devices) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "cannot load device list");
            println!("{}: {}", "Device list error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // ── Last known values ─────────────────────────────────────────────────
    let journal = CsvJournal::new(&cfg.journal_dir, profile.read_temperature);
    let board = StatusBoard::default();
    println!(
        "  Journal files in {}",
        journal.dir().display().to_string().bold()
    );
    println!();
    if registry.devices().is_empty() {
        println!(
            "  No devices registered in {}.",
            registry.path().display().to_string().bold()
        );
    }
    for device in registry.devices() {
        let last = journal.last_record(&device.name).unwrap_or_else(|e| {
            warn!(device = %device.name, error = %e, "cannot restore last values");
            None
        });
        match &last {
            Some(reading) => println!(
                "  {} {}",
                device.name.bold(),
                render_values(reading, reading.temperature_alert())
            ),
            None => println!("  {} {}", device.name.bold(), "no data".dimmed()),
        }
        board.seed(&device.name, last);
    }

    // ── Polling ───────────────────────────────────────────────────────────
    let bus = EventBus::default();
    let presenter = tokio::spawn(presenter::run(
        bus.subscribe_to(Topic::DeviceStatus),
        board.clone(),
    ));

    let mut supervisor = PollingSupervisor::new(
        profile,
        Arc::new(TelnetConnector::new()),
        Arc::new(journal.clone()),
        bus,
        cfg.poll_settings(),
    )
    .with_connect_timeout(Duration::from_secs(cfg.connect_timeout_secs));
    let report = supervisor.reconcile(registry.devices());
    info!(started = report.started.len(), skipped = report.skipped.len(), "pollers started");

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let on_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping pollers …".yellow().bold());
        on_ctrlc.cancel();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use /quit to exit");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let mut shell = repl::Shell::new(cfg, registry, supervisor, board, journal);
    repl::run(&mut shell, repl::spawn_stdin_reader(), shutdown).await;

    // The supervisor holds the last bus sender; once it is gone the
    // presenter drains and returns.
    shell.into_supervisor().shutdown().await;
    if let Err(e) = presenter.await {
        warn!(error = %e, "presenter task failed");
    }
    println!("{}", "  ✓ All pollers stopped.".green());
    ExitCode::SUCCESS
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___  ___  ___ _   _ "#.bold().cyan());
    println!("{}", r#"  | _ \| _ \/ __| | | |"#.bold().cyan());
    println!("{}", r#"  |   /|  _/\__ \ |_| |"#.bold().cyan());
    println!("{}", r#"  |_|_\|_|  |___/\___/ "#.bold().cyan());
    println!();
    println!("  {}", "Remote power supply telemetry monitor".dimmed());
    println!();
}
