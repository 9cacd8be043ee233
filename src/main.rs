//! Device simulator entry point
//!
//! Connects one simulated device to a hub, echoes direct methods,
//! acknowledges desired-property patches as reported properties and emits
//! periodic telemetry until a signal or a session drop stops it.

use aziot_device::protocol::ack_payload;
use aziot_device::{observability, DeviceClient, DeviceConfig, SessionState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

/// Simulated hub device over MQTT
#[derive(Parser)]
#[command(name = "aziot-device")]
#[command(about = "Simulated IoT hub device: twin sync, direct methods, telemetry")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and run the simulated device
    Run {
        /// Seconds between telemetry messages
        #[arg(long, default_value_t = 10)]
        telemetry_interval: u64,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    observability::init_default_logging();

    info!("Starting device simulator v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { telemetry_interval } => run_device(config, telemetry_interval).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Simulator shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(DeviceConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["device.toml", "config/device.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(DeviceConfig::load_from_file(&path)?);
                }
            }

            error!(
                "No configuration file found. Provide one with -c/--config or create device.toml"
            );
            process::exit(1);
        }
    }
}

async fn run_device(
    config: DeviceConfig,
    telemetry_interval: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let device_id = config.device.device_id.clone();
    info!(%device_id, "Simulator starting");

    let mut client = DeviceClient::new(config);

    let (method_tx, mut method_rx) = mpsc::channel(16);
    let (desired_tx, mut desired_rx) = mpsc::channel(16);
    client.set_method_sender(method_tx).await;
    client.set_desired_sender(desired_tx).await;

    client.connect().await?;

    let twin = client.get_twin().await?;
    info!(
        desired_version = ?twin.desired_version(),
        "Twin synchronized at startup"
    );

    let mut state_rx = client.subscribe_state();
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut telemetry_tick = interval(Duration::from_secs(telemetry_interval.max(1)));
    let mut sequence: u64 = 0;

    info!("Device is running; waiting for twin patches and method calls...");

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let SessionState::Disconnected { reason } = &*state_rx.borrow_and_update() {
                    error!(?reason, "Session dropped, shutting down");
                    return Err(format!(
                        "connection lost: {}",
                        reason.as_deref().unwrap_or("unknown reason")
                    )
                    .into());
                }
            }
            Some(patch) = desired_rx.recv() => {
                info!(version = patch.version, "Acknowledging desired-property patch");
                let ack = ack_payload(&patch.properties, 200, patch.version);
                let body = serde_json::to_string(&ack)?;
                match client.update_twin(&body).await {
                    Ok(status) => info!(status, "Patch acknowledged"),
                    Err(e) => warn!("Failed to acknowledge patch: {}", e),
                }
            }
            Some(invocation) = method_rx.recv() => {
                info!(method = %invocation.method_name, "Echoing direct method");
                if let Err(e) = client
                    .respond_to_method(
                        &invocation.method_name,
                        &invocation.payload,
                        invocation.request_id,
                        200,
                    )
                    .await
                {
                    warn!("Failed to answer method: {}", e);
                }
            }
            _ = telemetry_tick.tick() => {
                sequence += 1;
                let payload = serde_json::json!({
                    "deviceId": device_id,
                    "sequence": sequence,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })
                .to_string();
                if let Err(e) = client.send_telemetry(&payload).await {
                    warn!("Failed to send telemetry: {}", e);
                }
            }
        }
    }

    client.disconnect().await?;
    Ok(())
}

fn handle_config_command(
    config: DeviceConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current device configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
    }

    config.validate()?;
    println!("Configuration is valid");
    Ok(())
}
