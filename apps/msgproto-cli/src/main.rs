use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use msgproto_client::{Notification, ProtocolClient};
use msgproto_codec::payload::SecurityType;
use msgproto_sim::SimulatedChannel;
use msgproto_transport::channel::NotificationChannel;
use tracing::debug;

mod config;

use crate::config::{CliConfig, TransportKind};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the device's Wi-Fi connection
    Status,
    /// List networks visible to the device
    Scan,
    /// Send new network credentials to the device
    AddNetwork {
        #[arg(long)]
        ssid: String,
        #[arg(long, value_enum)]
        security: SecurityArg,
        /// Pre-shared key, required for WPA2
        #[arg(long, env = "MSGPROTO_PSK", hide_env_values = true)]
        psk: Option<String>,
    },
    /// Read or change the device LED
    Led {
        #[command(subcommand)]
        action: LedCommands,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum LedCommands {
    /// Ask the device for its LED state
    Get,
    /// Switch the LED on or off
    Set {
        #[arg(value_enum)]
        state: LedState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SecurityArg {
    Open,
    Wpa2,
}

impl From<SecurityArg> for SecurityType {
    fn from(value: SecurityArg) -> Self {
        match value {
            SecurityArg::Open => SecurityType::Open,
            SecurityArg::Wpa2 => SecurityType::Wpa2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LedState {
    On,
    Off,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Status => "status",
            Commands::Scan => "scan",
            Commands::AddNetwork { .. } => "add-network",
            Commands::Led {
                action: LedCommands::Get,
            } => "led get",
            Commands::Led {
                action: LedCommands::Set { .. },
            } => "led set",
            Commands::Config => "config",
        }
    }
}

fn main() -> Result<()> {
    let filter = std::env::var("MSGPROTO_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = CliConfig::new(cli.config.clone()).context("failed to load configuration")?;

    if let Commands::Config = cli.command {
        let rendered = toml::to_string_pretty(&config).context("failed to render configuration")?;
        print!("{rendered}");
        return Ok(());
    }

    let notifications = match config.transport {
        TransportKind::Sim => {
            let channel = SimulatedChannel::new(config.sim_device()?);
            execute(
                ProtocolClient::new(channel, config.client_config()),
                &cli.command,
                &config,
            )?
        }
        TransportKind::Ble => run_ble(&cli.command, &config)?,
    };

    for notification in notifications {
        println!("{notification}");
    }
    Ok(())
}

#[cfg(feature = "ble-btleplug")]
fn run_ble(command: &Commands, config: &CliConfig) -> Result<Vec<Notification>> {
    use msgproto_transport_ble::btleplug_backend::{BtleplugGattLink, BtleplugLinkConfig};
    use msgproto_transport_ble::GattChannel;

    let link = BtleplugGattLink::spawn(BtleplugLinkConfig {
        scan_interval: config.ble_scan_interval,
        connect_timeout: config.ble_connect_timeout,
        device_filter: config.device.clone(),
        ..BtleplugLinkConfig::default()
    })
    .context("failed to start BLE worker")?;
    link.wait_connected()
        .context("no message protocol peripheral connected")?;
    tracing::info!(filter = ?config.device, "connected to peripheral");
    execute(
        ProtocolClient::new(GattChannel::new(link), config.client_config()),
        command,
        config,
    )
}

#[cfg(not(feature = "ble-btleplug"))]
fn run_ble(_command: &Commands, _config: &CliConfig) -> Result<Vec<Notification>> {
    anyhow::bail!("transport \"ble\" requires building with the ble-btleplug feature")
}

/// Runs one exchange to completion and returns what the device reported.
fn execute<C: NotificationChannel>(
    mut client: ProtocolClient<C>,
    command: &Commands,
    config: &CliConfig,
) -> Result<Vec<Notification>> {
    match command {
        Commands::Status => client.start_wifi_status(),
        Commands::Scan => client.start_scan(),
        Commands::AddNetwork {
            ssid,
            security,
            psk,
        } => client.start_add_network(ssid.as_bytes(), (*security).into(), psk.as_deref()),
        Commands::Led {
            action: LedCommands::Get,
        } => client.start_get_led(),
        Commands::Led {
            action: LedCommands::Set { state },
        } => client.start_set_led(*state == LedState::On),
        Commands::Config => return Ok(Vec::new()),
    }
    .with_context(|| format!("failed to start {}", command.name()))?;

    let notifications = client
        .run_until_idle(config.exchange_timeout, config.poll_interval)
        .with_context(|| format!("{} exchange failed", command.name()))?;
    debug!(
        stats = ?client.machine().stats(),
        health = ?client.health_snapshot(),
        "exchange finished"
    );
    Ok(notifications)
}
