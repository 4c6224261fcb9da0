//! `stepctl` – interactive stepper-motor shell
//!
//! This binary:
//!
//! 1. Loads `~/.stepctl/config.toml`, writing a default one on first run.
//! 2. Binds the configured (simulated) stepper devices.
//! 3. Drops the user into an **interactive REPL** where stepper commands are
//!    dispatched; motion completion is reported asynchronously by a
//!    background listener.
//! 4. On Ctrl-C, EOF or `quit`, disables every device before exiting.

mod commands;
mod config;
mod notifier;
mod output;
mod parse;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use stepctl_hal::{DeviceRegistry, SimRegistry, SimStepper};

use crate::commands::Dispatcher;
use crate::config::Config;
use crate::notifier::Notifier;
use crate::output::{OutputSink, TerminalSink};

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "warn" so log lines do not
    // interleave with the prompt).  STEPCTL_LOG_FORMAT=json switches to
    // newline-delimited JSON.  Logs go to stderr; command output to stdout.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    if std::env::var("STEPCTL_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .init();
    }

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
            let cfg = Config::default();
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
            Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    info!(?cfg, "configuration resolved");

    // ── Devices ───────────────────────────────────────────────────────────
    let registry = Arc::new(build_registry(&cfg));
    if registry.is_empty() {
        println!("  {}", "No stepper devices configured.".yellow());
    } else {
        let names: Vec<&str> = registry.device_names().collect();
        println!("  Devices: {}", names.join(", ").bold());
    }
    if !cfg.async_notifications {
        println!("  {}", "Asynchronous completion reports are disabled.".dimmed());
    }

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    println!();
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    let notifier = Notifier::global(cfg.listener_stack_size);
    let dispatcher = Dispatcher::new(&registry, notifier, cfg.async_notifications);
    let sink: Arc<dyn OutputSink> = Arc::new(TerminalSink);

    if let Err(e) = repl::run(Arc::clone(&registry), &dispatcher, &sink, shutdown) {
        println!("{}: {}", "Shell error".red(), e);
    }

    info!(listener_running = notifier.is_running(), "shell exiting");
    disable_all(&registry);
}

/// Bind one simulated stepper per configured device.
fn build_registry(cfg: &Config) -> DeviceRegistry {
    cfg.devices
        .iter()
        .fold(SimRegistry::new(), |builder, device| {
            builder.with_device(
                SimStepper::new(device.name.clone())
                    .with_max_velocity(device.max_velocity)
                    .with_resolution(device.micro_step_res),
            )
        })
        .build()
}

/// De-energise every device on the way out.
fn disable_all(registry: &DeviceRegistry) {
    for device in registry.iter() {
        if let Err(e) = device.enable(false) {
            warn!(device = device.name(), code = e.code(), "failed to disable stepper on exit");
        }
    }
    println!("{}", "  ✓ All steppers disabled.".green());
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "stepctl".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Stepper motor control shell");
    println!();
}
