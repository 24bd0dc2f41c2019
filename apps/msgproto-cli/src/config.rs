use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use config::{Config, ConfigError, Environment, File};
use msgproto_client::ClientConfig;
use msgproto_codec::payload::{SecurityType, StatusRevision};
use msgproto_sim::{SimNetwork, SimulatedDevice};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Sim,
    Ble,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CliConfig {
    pub transport: TransportKind,
    /// BLE name or address filter.
    pub device: Option<String>,
    #[serde(with = "humantime_serde")]
    pub exchange_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub status_revision: StatusRevision,
    #[serde(with = "humantime_serde")]
    pub ble_scan_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub ble_connect_timeout: Duration,
    /// `ssid:security:rssi` entries seeding the simulated radio.
    #[serde(deserialize_with = "deserialize_list")]
    pub sim_networks: Vec<String>,
    pub sim_connected_ssid: Option<String>,
    pub sim_led_on: bool,
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ListVisitor;

    impl<'de> Visitor<'de> for ListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(split_list(value))
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(element) = seq.next_element()? {
                vec.push(element);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(ListVisitor)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c| c == ',' || c == ';')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses one `ssid:security:rssi` entry. The SSID may itself contain `:`.
pub fn parse_sim_network(entry: &str) -> anyhow::Result<SimNetwork> {
    let mut parts = entry.rsplitn(3, ':');
    let (Some(rssi), Some(security), Some(ssid)) = (parts.next(), parts.next(), parts.next())
    else {
        bail!("expected ssid:security:rssi, got {entry:?}");
    };
    let security = match security.trim().to_ascii_lowercase().as_str() {
        "open" => SecurityType::Open,
        "wpa2" => SecurityType::Wpa2,
        "unknown" => SecurityType::Unknown,
        other => bail!("unknown security type {other:?} in {entry:?}"),
    };
    let rssi = rssi
        .trim()
        .parse::<i16>()
        .with_context(|| format!("invalid rssi in {entry:?}"))?;
    Ok(SimNetwork::new(ssid, security, rssi))
}

impl CliConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("transport", "sim")?
            .set_default("device", None::<String>)?
            .set_default("exchange_timeout", "10s")?
            .set_default("poll_interval", "20ms")?
            .set_default("status_revision", "current")?
            .set_default("ble_scan_interval", "2s")?
            .set_default("ble_connect_timeout", "6s")?
            .set_default(
                "sim_networks",
                vec!["home-net:wpa2:-48".to_string(), "cafe:open:-71".to_string()],
            )?
            .set_default("sim_connected_ssid", "home-net")?
            .set_default("sim_led_on", false)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("MSGPROTO").try_parsing(true));

        builder.build()?.try_deserialize()
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            status_revision: self.status_revision,
            ..ClientConfig::default()
        }
    }

    pub fn sim_device(&self) -> anyhow::Result<SimulatedDevice> {
        let mut device = SimulatedDevice::with_random_sequence();
        for entry in &self.sim_networks {
            device.add_visible_network(parse_sim_network(entry)?);
        }
        device.set_connected(self.sim_connected_ssid.as_deref().map(str::as_bytes));
        device.set_led(self.sim_led_on);
        Ok(device)
    }
}
