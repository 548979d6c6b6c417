//! Headless photo booth kiosk.
//!
//! Button presses arrive on stdin, one word per line:
//! `photo`, `print`, `frame`, `reset`, `quit`. Every screen change is logged.

use std::path::PathBuf;

use anyhow::{Context, Result};
use boothconf::BoothConfig;
use clap::{Parser, Subcommand};
use photobooth::{build_services, Controller, ControllerHandle, Screen, Session, Timings};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Photo booth kiosk
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to load instead of ./photobooth.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the kiosk (default)
    Run,
    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = BoothConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => {
            for file in &sources.files {
                println!("# file: {}", file.display());
            }
            for var in &sources.env_overrides {
                println!("# env: {}", var);
            }
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: BoothConfig) -> Result<()> {
    init_tracing(&config.telemetry.log_level);
    tracing::info!("photobooth {} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        webcam = config.camera.webcam_id,
        printer = %config.printer.name,
        "kiosk devices"
    );

    let services = build_services(&config)
        .await
        .context("Failed to start the booth")?;

    let session = Session::new(Timings::from_config(&config.session));
    let controller = Controller::new(session, services);
    let handle = controller.handle();
    let screens = controller.subscribe_screen();

    let shutdown = CancellationToken::new();
    tokio::spawn(log_screens(screens));
    tokio::spawn(read_buttons(handle, shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received SIGINT (Ctrl+C), shutting down");
        }
        signal_token.cancel();
    });

    let stop = shutdown.clone();
    let final_state = controller.run(async move { stop.cancelled().await }).await;

    tracing::info!(state = final_state.name(), "Shutdown complete");
    Ok(())
}

async fn log_screens(mut screens: watch::Receiver<Screen>) {
    while screens.changed().await.is_ok() {
        let screen = screens.borrow_and_update().clone();
        tracing::info!(
            ?screen,
            title = screen.title(),
            photo = screen.photo_button_enabled(),
            print = screen.print_button_enabled(),
            preview = screen.camera_preview_visible(),
            "screen"
        );
    }
}

async fn read_buttons(handle: ControllerHandle, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin closed");
                break;
            }
        };

        let sent = match line.trim() {
            "" => continue,
            "photo" => handle.photo(),
            "print" => handle.print(),
            "frame" => handle.change_frame(),
            "reset" => handle.reset(),
            "quit" => {
                shutdown.cancel();
                break;
            }
            other => {
                tracing::warn!(command = other, "unknown command");
                continue;
            }
        };

        if !sent {
            break;
        }
    }
}
