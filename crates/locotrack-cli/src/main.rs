//! `locotrack` – operator front-end for the locomotion tracking bridge.
//!
//! This binary:
//!
//! 1. Loads `~/.locotrack/config.toml`, writing the defaults there on first
//!    run.
//! 2. Starts a [`BridgeClosedLoop`], which binds the state socket and spawns
//!    `locotrack-bridge` aimed at it.
//! 3. Prints the newest pose at most `print_hz` times per second, as text or
//!    JSON lines.
//! 4. Accepts `r`/`reset` and `q`/`quit` on stdin.
//! 5. On quit, stdin EOF or Ctrl-C closes the adapter, which stops the
//!    bridge (SIGTERM, then SIGKILL after `close_timeout_secs`).

mod config;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use locotrack_controller::{BridgeClosedLoop, ShutdownOutcome, ZeroOptions};
use locotrack_types::PoseUpdate;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Config, OutputFormat};
use crate::repl::Command;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); LOCOTRACK_LOG_FORMAT=json switches
    // to JSON lines.  Logs go to stderr so stdout carries only pose output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("LOCOTRACK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    print_banner();

    let cfg = load_config();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    // The bridge lives in its own process group, so Ctrl-C only reaches us;
    // the adapter then shuts the bridge down in order.
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – closing bridge …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; the bridge may outlive an interrupted CLI");
    }

    let mut adapter = BridgeClosedLoop::new(cfg.adapter_config());
    if let Err(e) = adapter.start().await {
        println!("{}: {}", "Failed to start bridge".red(), e);
        return ExitCode::FAILURE;
    }
    println!(
        "  Listening on {} – bridge pid {}",
        adapter
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default()
            .bold(),
        adapter
            .supervisor()
            .pid()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "?".to_string())
            .bold()
    );
    println!("  Type {} for commands.\n", "help".bold().cyan());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut stdin_open = match repl::spawn_stdin_reader(tx) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "stdin reader not started; operator commands disabled");
            false
        }
    };

    let mut ticker = tokio::time::interval(cfg.print_period());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while !shutdown.load(Ordering::SeqCst) {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(update) = adapter.poll_update() {
                    print_update(&update, cfg.output);
                }
            }
            cmd = rx.recv(), if stdin_open => match cmd {
                Some(Command::Reset) => {
                    adapter.set_pose_zero(ZeroOptions::default()).await;
                    println!("{}", "  ✓ Pose zeroed.".green());
                }
                Some(Command::Status) => print_status(&adapter),
                Some(Command::Help) => repl::print_help(),
                Some(Command::Quit) => break,
                Some(Command::Unknown(other)) => {
                    println!(
                        "{} '{}'. Type {} for available commands.",
                        "Unknown command:".red(),
                        other.yellow(),
                        "help".bold()
                    );
                }
                None => {
                    info!("stdin closed; running until Ctrl-C");
                    stdin_open = false;
                }
            },
        }
    }

    match adapter.close().await {
        ShutdownOutcome::Killed => {
            println!("{}", "  ✓ Bridge did not exit in time and was killed.".yellow())
        }
        _ => println!("{}", "  ✓ Bridge closed.".green()),
    }
    ExitCode::SUCCESS
}

fn load_config() -> Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn print_update(update: &PoseUpdate, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!(
            "  {} x={:+.4} y={:+.4} z={:+.4}  θ={:+.2}° φ={:+.2}° roll={:+.2}°",
            format!("[{:.3}]", update.timestamp).dimmed(),
            update.x,
            update.y,
            update.z,
            update.theta,
            update.phi,
            update.roll,
        ),
        OutputFormat::Json => match serde_json::to_string(update) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode pose update"),
        },
    }
}

fn print_status(adapter: &BridgeClosedLoop) {
    let sup = adapter.supervisor();
    println!(
        "  bridge: {}  pid: {}  device: {} @ {} baud",
        if sup.is_started() { "running".green() } else { "stopped".red() },
        sup.pid().map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        sup.config().device_path,
        sup.config().baud_rate,
    );
    println!(
        "  listening: {}",
        adapter
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
}

fn print_banner() {
    println!();
    println!("  {} {}",
        "locotrack".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Locomotion tracking bridge controller");
    println!();
}
