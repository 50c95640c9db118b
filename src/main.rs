//! voice-dialog: a spoken conversation between a user and an AI assistant.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use voice_dialog::audio::list_devices;
use voice_dialog::config::{load_settings, paths};
use voice_dialog::logger;
use voice_dialog::service::DialogService;

#[derive(Parser)]
#[command(name = "voice-dialog", about = "Voice dialog with an AI assistant", version)]
struct Cli {
    /// Settings file layered over the defaults and the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dialog until interrupted.
    Serve,
    /// List audio input devices and exit.
    ListMics,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logger::try_init(&paths::get_log_dir()) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logger::init_console();
            warn!("File logging unavailable: {:#}", e);
            None
        }
    };

    let result = match cli.command {
        Command::Serve => serve(cli.config.as_deref()).await,
        Command::ListMics => list_mics(cli.config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn serve(config: Option<&Path>) -> anyhow::Result<()> {
    let settings = load_settings(config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                on_interrupt.cancel();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    });

    let service = match DialogService::from_settings(&settings, &cancel).await {
        Ok(service) => service,
        Err(_) if cancel.is_cancelled() => return Ok(()),
        Err(e) => return Err(e),
    };
    service.run(cancel).await?;
    Ok(())
}

fn list_mics(config: Option<&Path>) -> anyhow::Result<()> {
    let configured = match load_settings(config) {
        Ok(settings) => settings.microphone_device,
        Err(e) => {
            warn!("Settings not loaded: {}", e);
            None
        }
    };

    let devices = list_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found.");
    }
    for device in &devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{:>3}: {}{}", device.index, device.name, marker);
    }

    match configured {
        Some(name) if devices.iter().any(|d| d.name == name) => println!("\nMICROPHONE_DEVICE: {name}"),
        Some(name) => println!("\nMICROPHONE_DEVICE {name:?} is not connected"),
        None => println!("\nMICROPHONE_DEVICE not set, using the default device"),
    }
    Ok(())
}
