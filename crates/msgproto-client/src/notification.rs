use std::fmt;

use msgproto_codec::payload::{WifiOperationError, WifiScanResultRequest, WifiStatusRequest};

/// Outcome surfaced to the caller by a completed step of an exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    WifiStatus(WifiStatusRequest),
    /// The scan finished and found nothing.
    ScanEmpty,
    /// One scan result; `index` is 1-based.
    ScanProgress {
        network: WifiScanResultRequest,
        index: u8,
        total: u8,
    },
    AddNetworkResult { outcome: WifiOperationError },
    /// LED state reported by the device.
    LedStatus { on: bool },
    /// The device fetched the desired LED state.
    DesiredLedDelivered { on: bool },
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::WifiStatus(status) => {
                if !status.wifi_connected {
                    return f.write_str("wifi: not connected");
                }
                write!(
                    f,
                    "wifi: connected to {} ({}, {}dB, {} MHz, bssid {}), internet: {}",
                    String::from_utf8_lossy(&status.ssid),
                    status.security,
                    status.rssi,
                    status.frequency_mhz,
                    status.bssid_hex(),
                    if status.internet_connected { "yes" } else { "no" },
                )?;
                if let Some(ip) = status.ip_address_acquired {
                    write!(f, ", ip acquired: {}", if ip { "yes" } else { "no" })?;
                }
                Ok(())
            }
            Notification::ScanEmpty => f.write_str("no networks found"),
            Notification::ScanProgress {
                network,
                index,
                total,
            } => write!(f, "[{index}/{total}] {network}"),
            Notification::AddNetworkResult { outcome } => match outcome {
                WifiOperationError::Success => f.write_str("network added"),
                WifiOperationError::NetworkExists => f.write_str("network already exists"),
                WifiOperationError::Other(code) => {
                    write!(f, "adding network failed with error code {code}")
                }
            },
            Notification::LedStatus { on } => write!(f, "led is {}", on_off(*on)),
            Notification::DesiredLedDelivered { on } => {
                write!(f, "device accepted led {}", on_off(*on))
            }
        }
    }
}
