//! Fixed-layout request and response payloads.
//!
//! Every payload has an exact byte length; decoding a payload of any other
//! length fails with `CodecError::PayloadLength`. Multi-byte integers are
//! little-endian, strings are raw UTF-8 bytes with a separate length byte.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytes::{
    read_bytes, read_delimited_hex, read_lsb_u32, read_signed_byte, write_bytes, write_lsb_u32,
};
use crate::error::CodecError;
use crate::ids::{Category, DeviceControlRequestId, RequestKind, WifiRequestId};

/// Maximum SSID length in bytes.
pub const MAX_SSID_LEN: usize = 32;
/// Accepted WPA2 passphrase length range, in characters.
pub const MIN_PSK_CHARS: usize = 8;
pub const MAX_PSK_CHARS: usize = 63;
/// Width of the PSK field in the new-details payload.
pub const PSK_FIELD_LEN: usize = 64;

/// Connectivity bits at offset 0 of the status payload.
pub const STATUS_WIFI_CONNECTED: u8 = 0x01;
pub const STATUS_INTERNET_CONNECTED: u8 = 0x02;
/// Only defined by the current status revision.
pub const STATUS_IP_ADDRESS_ACQUIRED: u8 = 0x04;

/// Wi-Fi security type shared by status, scan, and new-details payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SecurityType {
    Unknown = 0x00,
    Open = 0x01,
    Wpa2 = 0x02,
}

impl SecurityType {
    /// Maps a wire byte; values the protocol does not define read as `Unknown`.
    pub fn from_wire(value: u8) -> Self {
        match value {
            0x01 => SecurityType::Open,
            0x02 => SecurityType::Wpa2,
            _ => SecurityType::Unknown,
        }
    }
}

impl fmt::Display for SecurityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityType::Unknown => f.write_str("Unknown"),
            SecurityType::Open => f.write_str("Open"),
            SecurityType::Wpa2 => f.write_str("WPA2"),
        }
    }
}

/// Revision of the `SetWifiStatus` payload to decode.
///
/// `Legacy` peers only define the Wi-Fi and internet bits; the IP-acquired bit
/// is reported as `None` for them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusRevision {
    #[default]
    Current,
    Legacy,
}

/// Outcome carried by `SetWifiOperationResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiOperationError {
    Success,
    NetworkExists,
    Other(u8),
}

impl WifiOperationError {
    pub const NETWORK_EXISTS_CODE: u8 = 17;

    pub fn from_code(code: u8) -> Self {
        match code {
            0 => WifiOperationError::Success,
            Self::NETWORK_EXISTS_CODE => WifiOperationError::NetworkExists,
            other => WifiOperationError::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            WifiOperationError::Success => 0,
            WifiOperationError::NetworkExists => Self::NETWORK_EXISTS_CODE,
            WifiOperationError::Other(code) => code,
        }
    }
}

fn expect_len(name: &'static str, expected: usize, payload: &[u8]) -> Result<(), CodecError> {
    if payload.len() != expected {
        return Err(CodecError::PayloadLength {
            name,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn read_ssid(payload: &[u8], len_offset: usize, ssid_offset: usize) -> Result<Vec<u8>, CodecError> {
    let len = usize::from(payload[len_offset]);
    if len > MAX_SSID_LEN {
        return Err(CodecError::InvalidField("ssid length exceeds 32 bytes"));
    }
    read_bytes(payload, ssid_offset, len)
}

fn check_ssid(ssid: &[u8]) -> Result<u8, CodecError> {
    if ssid.len() > MAX_SSID_LEN {
        return Err(CodecError::InvalidField("ssid must not be more than 32 bytes"));
    }
    Ok(ssid.len() as u8)
}

fn rssi_byte(rssi: i16) -> Result<u8, CodecError> {
    i8::try_from(rssi)
        .map(|v| v as u8)
        .map_err(|_| CodecError::InvalidField("rssi does not fit a signed byte"))
}

fn led_byte(payload: &[u8]) -> Result<bool, CodecError> {
    match payload[0] {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(CodecError::InvalidField("led status must be 0 or 1")),
    }
}

/// Current connection state reported by the device (`SetWifiStatus`).
///
/// Layout (48 bytes): `0` connectivity bits, `1` signed RSSI, `2` security
/// type, `3` SSID length, `4..36` SSID, `36..40` frequency MHz, `40..46`
/// BSSID, `46..48` reserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiStatusRequest {
    pub wifi_connected: bool,
    pub internet_connected: bool,
    pub ip_address_acquired: Option<bool>,
    pub rssi: i16,
    pub security: SecurityType,
    pub ssid: Vec<u8>,
    pub frequency_mhz: u32,
    pub bssid: [u8; 6],
}

impl WifiStatusRequest {
    pub const PAYLOAD_LEN: usize = 48;

    pub fn decode(payload: &[u8], revision: StatusRevision) -> Result<Self, CodecError> {
        expect_len("WifiStatus", Self::PAYLOAD_LEN, payload)?;
        let flags = payload[0];
        let ip_address_acquired = match revision {
            StatusRevision::Current => Some(flags & STATUS_IP_ADDRESS_ACQUIRED != 0),
            StatusRevision::Legacy => None,
        };
        let mut bssid = [0_u8; 6];
        bssid.copy_from_slice(&read_bytes(payload, 40, 6)?);
        Ok(Self {
            wifi_connected: flags & STATUS_WIFI_CONNECTED != 0,
            internet_connected: flags & STATUS_INTERNET_CONNECTED != 0,
            ip_address_acquired,
            rssi: read_signed_byte(payload, 1)?,
            security: SecurityType::from_wire(payload[2]),
            ssid: read_ssid(payload, 3, 4)?,
            frequency_mhz: read_lsb_u32(payload, 36)?,
            bssid,
        })
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        let mut flags = 0_u8;
        if self.wifi_connected {
            flags |= STATUS_WIFI_CONNECTED;
        }
        if self.internet_connected {
            flags |= STATUS_INTERNET_CONNECTED;
        }
        if self.ip_address_acquired == Some(true) {
            flags |= STATUS_IP_ADDRESS_ACQUIRED;
        }
        payload[0] = flags;
        payload[1] = rssi_byte(self.rssi)?;
        payload[2] = self.security as u8;
        payload[3] = check_ssid(&self.ssid)?;
        write_bytes(&self.ssid, &mut payload, 4)?;
        write_lsb_u32(self.frequency_mhz, &mut payload, 36)?;
        write_bytes(&self.bssid, &mut payload, 40)?;
        Ok(payload)
    }

    /// BSSID as colon-separated uppercase hex.
    pub fn bssid_hex(&self) -> String {
        read_delimited_hex(&self.bssid, 0, self.bssid.len(), Some(':')).unwrap_or_default()
    }
}

/// Scan header sent before the individual results (`SetWifiScanResultsSummary`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiScanSummaryRequest {
    /// 0 on success, otherwise the device's scan error.
    pub error_code: u8,
    pub network_count: u8,
    /// Bytes the device needs for all results; informational only.
    pub total_results_size: u32,
}

impl WifiScanSummaryRequest {
    pub const PAYLOAD_LEN: usize = 8;

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("WifiScanSummary", Self::PAYLOAD_LEN, payload)?;
        Ok(Self {
            error_code: payload[0],
            network_count: payload[1],
            total_results_size: read_lsb_u32(payload, 4)?,
        })
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = self.error_code;
        payload[1] = self.network_count;
        write_lsb_u32(self.total_results_size, &mut payload, 4)?;
        Ok(payload)
    }
}

/// One visible network (`SetNextWifiScanResult`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiScanResultRequest {
    pub security: SecurityType,
    pub rssi: i16,
    pub ssid: Vec<u8>,
}

impl WifiScanResultRequest {
    pub const PAYLOAD_LEN: usize = 36;

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("WifiScanResult", Self::PAYLOAD_LEN, payload)?;
        Ok(Self {
            security: SecurityType::from_wire(payload[0]),
            rssi: read_signed_byte(payload, 1)?,
            ssid: read_ssid(payload, 2, 4)?,
        })
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = self.security as u8;
        payload[1] = rssi_byte(self.rssi)?;
        payload[2] = check_ssid(&self.ssid)?;
        write_bytes(&self.ssid, &mut payload, 4)?;
        Ok(payload)
    }
}

impl fmt::Display for WifiScanResultRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({}dB)",
            String::from_utf8_lossy(&self.ssid),
            self.security,
            self.rssi
        )
    }
}

/// Result of applying new network details (`SetWifiOperationResult`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiSetRequest {
    pub error_code: u8,
}

impl WifiSetRequest {
    pub const PAYLOAD_LEN: usize = 4;

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("WifiSetResult", Self::PAYLOAD_LEN, payload)?;
        Ok(Self {
            error_code: payload[0],
        })
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = self.error_code;
        Ok(payload)
    }

    pub fn outcome(&self) -> WifiOperationError {
        WifiOperationError::from_code(self.error_code)
    }
}

/// LED state pushed by the device (`ReportLedStatus`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLedStatusRequest {
    pub led_on: bool,
}

impl ReportLedStatusRequest {
    pub const PAYLOAD_LEN: usize = 4;

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("ReportLedStatus", Self::PAYLOAD_LEN, payload)?;
        Ok(Self {
            led_on: led_byte(payload)?,
        })
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = u8::from(self.led_on);
        Ok(payload)
    }
}

/// Typed request body, keyed by `(category, request id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPayload {
    WifiStatus(WifiStatusRequest),
    WifiScanSummary(WifiScanSummaryRequest),
    WifiScanResult(WifiScanResultRequest),
    WifiSetResult(WifiSetRequest),
    WifiGetNewDetails,
    GetDesiredLedStatus,
    ReportLedStatus(ReportLedStatusRequest),
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::WifiStatus(_) => RequestKind::Wifi(WifiRequestId::SetWifiStatus),
            RequestPayload::WifiScanSummary(_) => {
                RequestKind::Wifi(WifiRequestId::SetWifiScanResultsSummary)
            }
            RequestPayload::WifiScanResult(_) => {
                RequestKind::Wifi(WifiRequestId::SetNextWifiScanResult)
            }
            RequestPayload::WifiSetResult(_) => {
                RequestKind::Wifi(WifiRequestId::SetWifiOperationResult)
            }
            RequestPayload::WifiGetNewDetails => RequestKind::Wifi(WifiRequestId::GetNewWifiDetails),
            RequestPayload::GetDesiredLedStatus => {
                RequestKind::DeviceControl(DeviceControlRequestId::GetDesiredLedStatus)
            }
            RequestPayload::ReportLedStatus(_) => {
                RequestKind::DeviceControl(DeviceControlRequestId::ReportLedStatus)
            }
        }
    }

    /// Decodes `payload` as the fixed layout for `kind`.
    pub fn decode(
        kind: RequestKind,
        payload: &[u8],
        revision: StatusRevision,
    ) -> Result<Self, CodecError> {
        match kind {
            RequestKind::Wifi(WifiRequestId::SetWifiStatus) => Ok(RequestPayload::WifiStatus(
                WifiStatusRequest::decode(payload, revision)?,
            )),
            RequestKind::Wifi(WifiRequestId::SetWifiScanResultsSummary) => Ok(
                RequestPayload::WifiScanSummary(WifiScanSummaryRequest::decode(payload)?),
            ),
            RequestKind::Wifi(WifiRequestId::SetNextWifiScanResult) => Ok(
                RequestPayload::WifiScanResult(WifiScanResultRequest::decode(payload)?),
            ),
            RequestKind::Wifi(WifiRequestId::SetWifiOperationResult) => Ok(
                RequestPayload::WifiSetResult(WifiSetRequest::decode(payload)?),
            ),
            RequestKind::Wifi(WifiRequestId::GetNewWifiDetails) => {
                expect_len("WifiGetNewDetails", 0, payload)?;
                Ok(RequestPayload::WifiGetNewDetails)
            }
            RequestKind::DeviceControl(DeviceControlRequestId::GetDesiredLedStatus) => {
                expect_len("GetDesiredLedStatus", 0, payload)?;
                Ok(RequestPayload::GetDesiredLedStatus)
            }
            RequestKind::DeviceControl(DeviceControlRequestId::ReportLedStatus) => Ok(
                RequestPayload::ReportLedStatus(ReportLedStatusRequest::decode(payload)?),
            ),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            RequestPayload::WifiStatus(req) => req.to_payload(),
            RequestPayload::WifiScanSummary(req) => req.to_payload(),
            RequestPayload::WifiScanResult(req) => req.to_payload(),
            RequestPayload::WifiSetResult(req) => req.to_payload(),
            RequestPayload::WifiGetNewDetails | RequestPayload::GetDesiredLedStatus => {
                Ok(Vec::new())
            }
            RequestPayload::ReportLedStatus(req) => req.to_payload(),
        }
    }
}

/// A parsed inbound request with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub sequence_id: u16,
    pub payload: RequestPayload,
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn category(&self) -> Category {
        self.kind().category()
    }

    pub fn request_id(&self) -> u16 {
        self.kind().raw()
    }
}

/// Details of a network to add, answered to `GetNewWifiDetails`.
///
/// Layout (104 bytes): `0` security type, `1` SSID length, `2..4` reserved,
/// `4..36` SSID, `36` PSK length, `37..40` reserved, `40..104` PSK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiGetNewDetailsResponse {
    security: SecurityType,
    ssid: Vec<u8>,
    psk: Option<String>,
}

impl WifiGetNewDetailsResponse {
    pub const PAYLOAD_LEN: usize = 104;

    /// Validates and builds the response. The PSK is kept only for WPA2.
    pub fn new(
        ssid: impl Into<Vec<u8>>,
        security: SecurityType,
        psk: Option<&str>,
    ) -> Result<Self, CodecError> {
        let ssid = ssid.into();
        check_ssid(&ssid)?;
        let psk = match security {
            SecurityType::Unknown => {
                return Err(CodecError::InvalidField("security type must not be Unknown"));
            }
            SecurityType::Open => None,
            SecurityType::Wpa2 => {
                let psk = psk
                    .filter(|p| !p.trim().is_empty())
                    .ok_or(CodecError::InvalidField("WPA2 network requires a PSK"))?;
                let chars = psk.chars().count();
                if !(MIN_PSK_CHARS..=MAX_PSK_CHARS).contains(&chars) {
                    return Err(CodecError::InvalidField("PSK must be between 8 and 63 characters"));
                }
                if psk.len() > PSK_FIELD_LEN {
                    return Err(CodecError::InvalidField("PSK does not fit in 64 bytes"));
                }
                Some(psk.to_string())
            }
        };
        Ok(Self {
            security,
            ssid,
            psk,
        })
    }

    pub fn security(&self) -> SecurityType {
        self.security
    }

    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    pub fn psk(&self) -> Option<&str> {
        self.psk.as_deref()
    }

    pub fn payload(&self) -> Result<Vec<u8>, CodecError> {
        let psk = self.psk.as_deref().unwrap_or_default().as_bytes();
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = self.security as u8;
        payload[1] = check_ssid(&self.ssid)?;
        write_bytes(&self.ssid, &mut payload, 4)?;
        payload[36] = psk.len() as u8;
        write_bytes(psk, &mut payload, 40)?;
        Ok(payload)
    }

    /// Device-side decode; applies the same validation as [`Self::new`].
    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("WifiGetNewDetails", Self::PAYLOAD_LEN, payload)?;
        let security = SecurityType::from_wire(payload[0]);
        let ssid = read_ssid(payload, 1, 4)?;
        let psk_len = usize::from(payload[36]);
        if psk_len > PSK_FIELD_LEN {
            return Err(CodecError::InvalidField("psk length exceeds 64 bytes"));
        }
        let psk = if psk_len == 0 {
            None
        } else {
            Some(
                String::from_utf8(read_bytes(payload, 40, psk_len)?)
                    .map_err(|_| CodecError::InvalidField("psk is not valid UTF-8"))?,
            )
        };
        Self::new(ssid, security, psk.as_deref())
    }
}

/// Desired LED state answered to `GetDesiredLedStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesiredLedStatusResponse {
    pub led_on: bool,
}

impl DesiredLedStatusResponse {
    pub const PAYLOAD_LEN: usize = 4;

    pub fn payload(&self) -> Result<Vec<u8>, CodecError> {
        let mut payload = vec![0_u8; Self::PAYLOAD_LEN];
        payload[0] = u8::from(self.led_on);
        Ok(payload)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, CodecError> {
        expect_len("DesiredLedStatus", Self::PAYLOAD_LEN, payload)?;
        Ok(Self {
            led_on: led_byte(payload)?,
        })
    }
}

/// Outbound response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    WifiGetNewDetails(WifiGetNewDetailsResponse),
    DesiredLedStatus(DesiredLedStatusResponse),
}

impl Response {
    pub fn payload(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Response::WifiGetNewDetails(details) => details.payload(),
            Response::DesiredLedStatus(led) => led.payload(),
        }
    }
}
