use std::collections::VecDeque;

use msgproto_codec::frame::{
    encode_request_frame, parse_event_frame, parse_response_frame, FrameHeader, ResponseFrame,
};
use msgproto_codec::ids::{
    DeviceControlEventId, DeviceControlRequestId, EventId, RequestKind, WifiEventId, WifiRequestId,
};
use msgproto_codec::payload::{
    DesiredLedStatusResponse, ReportLedStatusRequest, Request, RequestPayload, SecurityType,
    WifiGetNewDetailsResponse, WifiOperationError, WifiScanResultRequest, WifiScanSummaryRequest,
    WifiSetRequest, WifiStatusRequest,
};
use msgproto_codec::{CodecError, MessageType};
use tracing::{debug, info, warn};

/// Scan results reported per scan; the rest are dropped.
pub const MAX_SCAN_RESULTS: usize = 20;
const SIM_FREQUENCY_MHZ: u32 = 2_437;

/// A network visible to the simulated radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimNetwork {
    pub ssid: Vec<u8>,
    pub security: SecurityType,
    pub rssi: i16,
}

impl SimNetwork {
    pub fn new(ssid: impl Into<Vec<u8>>, security: SecurityType, rssi: i16) -> Self {
        Self {
            ssid: ssid.into(),
            security,
            rssi,
        }
    }

    fn bssid(&self) -> [u8; 6] {
        let mut bssid = [0x02, 0x00, 0x00, 0x00, 0x00, 0x00];
        for (i, byte) in self.ssid.iter().enumerate() {
            bssid[2 + i % 4] ^= byte.rotate_left(i as u32 % 8);
        }
        bssid
    }
}

/// A network added through the add-network exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNetwork {
    pub ssid: Vec<u8>,
    pub security: SecurityType,
    pub psk: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    kind: RequestKind,
    sequence_id: u16,
}

/// Device half of the protocol: answers events with requests and applies
/// the client's responses.
///
/// Only one request is outstanding at a time. A new event replaces any
/// request the client never answered.
#[derive(Debug)]
pub struct SimulatedDevice {
    visible: Vec<SimNetwork>,
    stored: Vec<StoredNetwork>,
    connected: Option<Vec<u8>>,
    internet: bool,
    led_on: bool,
    scan_error: u8,
    next_sequence: u16,
    pending: Option<Pending>,
    scan_queue: VecDeque<WifiScanResultRequest>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::with_sequence_start(1)
    }
}

impl SimulatedDevice {
    pub fn with_sequence_start(next_sequence: u16) -> Self {
        Self {
            visible: Vec::new(),
            stored: Vec::new(),
            connected: None,
            internet: true,
            led_on: false,
            scan_error: 0,
            next_sequence,
            pending: None,
            scan_queue: VecDeque::new(),
        }
    }

    /// Starts from a random sequence id, like a freshly booted device.
    pub fn with_random_sequence() -> Self {
        Self::with_sequence_start(rand::random())
    }

    pub fn add_visible_network(&mut self, network: SimNetwork) {
        self.visible.push(network);
    }

    /// Connects to `ssid`. The network does not need to be visible.
    pub fn set_connected(&mut self, ssid: Option<&[u8]>) {
        self.connected = ssid.map(<[u8]>::to_vec);
    }

    pub fn set_internet(&mut self, internet: bool) {
        self.internet = internet;
    }

    /// Non-zero makes the next scans report this error in their summary.
    pub fn set_scan_error(&mut self, scan_error: u8) {
        self.scan_error = scan_error;
    }

    pub fn set_led(&mut self, on: bool) {
        self.led_on = on;
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    pub fn stored_networks(&self) -> &[StoredNetwork] {
        &self.stored
    }

    /// Whether a request is waiting for the client's response.
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Handles one frame written by the client and returns the frames the
    /// device notifies in reply.
    pub fn handle_frame(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
        let header = FrameHeader::peek(bytes)?;
        match header.message_type {
            MessageType::Event => {
                let event = parse_event_frame(bytes)?;
                self.on_event(event)
            }
            MessageType::Response => {
                let response = parse_response_frame(bytes)?;
                self.on_response(response)
            }
            MessageType::Request => {
                debug!("device ignores request frames");
                Ok(Vec::new())
            }
        }
    }

    /// Toggles the LED locally and returns the `ReportLedStatus` request the
    /// device pushes for it.
    pub fn toggle_led(&mut self) -> Result<Vec<u8>, CodecError> {
        self.led_on = !self.led_on;
        self.abandon_pending();
        self.request(RequestPayload::ReportLedStatus(ReportLedStatusRequest {
            led_on: self.led_on,
        }))
    }

    fn abandon_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(kind = %pending.kind, "dropping unanswered request");
        }
        self.scan_queue.clear();
    }

    fn send(&mut self, payload: RequestPayload) -> Result<Vec<Vec<u8>>, CodecError> {
        self.request(payload).map(|frame| vec![frame])
    }

    fn request(&mut self, payload: RequestPayload) -> Result<Vec<u8>, CodecError> {
        let request = Request {
            sequence_id: self.next_sequence,
            payload,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let frame = encode_request_frame(&request)?;
        debug!(kind = %request.kind(), sequence_id = request.sequence_id, "device request");
        self.pending = Some(Pending {
            kind: request.kind(),
            sequence_id: request.sequence_id,
        });
        Ok(frame)
    }

    fn on_event(&mut self, event: EventId) -> Result<Vec<Vec<u8>>, CodecError> {
        info!(?event, "device handling event");
        self.abandon_pending();
        match event {
            EventId::Wifi(WifiEventId::WifiStatusNeeded) => {
                let status = self.status();
                self.send(RequestPayload::WifiStatus(status))
            }
            EventId::Wifi(WifiEventId::WifiScanNeeded) => {
                let summary = self.scan();
                self.send(RequestPayload::WifiScanSummary(summary))
            }
            EventId::Wifi(WifiEventId::NewWifiDetailsAvailable) => {
                self.send(RequestPayload::WifiGetNewDetails)
            }
            EventId::DeviceControl(DeviceControlEventId::LedStatusNeeded) => {
                self.send(RequestPayload::ReportLedStatus(ReportLedStatusRequest {
                    led_on: self.led_on,
                }))
            }
            EventId::DeviceControl(DeviceControlEventId::DesiredLedStatusAvailable) => {
                self.send(RequestPayload::GetDesiredLedStatus)
            }
        }
    }

    fn on_response(&mut self, response: ResponseFrame) -> Result<Vec<Vec<u8>>, CodecError> {
        let Some(pending) = self.pending else {
            debug!(kind = %response.kind, "ignoring response with nothing pending");
            return Ok(Vec::new());
        };
        if pending.kind != response.kind || pending.sequence_id != response.sequence_id {
            debug!(
                kind = %response.kind,
                sequence_id = response.sequence_id,
                "ignoring uncorrelated response"
            );
            return Ok(Vec::new());
        }
        self.pending = None;

        // The operation result is acked with its own code.
        let echoes_code = response.kind == RequestKind::Wifi(WifiRequestId::SetWifiOperationResult);
        if response.error_code != 0 && !echoes_code {
            warn!(kind = %response.kind, error_code = response.error_code, "client rejected request");
            self.scan_queue.clear();
            return Ok(Vec::new());
        }

        match response.kind {
            RequestKind::Wifi(WifiRequestId::SetWifiScanResultsSummary)
            | RequestKind::Wifi(WifiRequestId::SetNextWifiScanResult) => {
                match self.scan_queue.pop_front() {
                    Some(next) => self.send(RequestPayload::WifiScanResult(next)),
                    None => Ok(Vec::new()),
                }
            }
            RequestKind::Wifi(WifiRequestId::GetNewWifiDetails) => {
                let details = WifiGetNewDetailsResponse::decode(&response.payload)?;
                let outcome = self.store(&details);
                self.send(RequestPayload::WifiSetResult(WifiSetRequest {
                    error_code: outcome.code(),
                }))
            }
            RequestKind::DeviceControl(DeviceControlRequestId::GetDesiredLedStatus) => {
                let desired = DesiredLedStatusResponse::decode(&response.payload)?;
                self.led_on = desired.led_on;
                self.send(RequestPayload::ReportLedStatus(ReportLedStatusRequest {
                    led_on: self.led_on,
                }))
            }
            _ => Ok(Vec::new()),
        }
    }

    fn status(&self) -> WifiStatusRequest {
        let Some(ssid) = &self.connected else {
            return WifiStatusRequest {
                wifi_connected: false,
                internet_connected: false,
                ip_address_acquired: Some(false),
                rssi: 0,
                security: SecurityType::Unknown,
                ssid: Vec::new(),
                frequency_mhz: 0,
                bssid: [0; 6],
            };
        };
        let network = self
            .visible
            .iter()
            .find(|n| &n.ssid == ssid)
            .cloned()
            .unwrap_or_else(|| {
                let security = self
                    .stored
                    .iter()
                    .find(|n| &n.ssid == ssid)
                    .map_or(SecurityType::Unknown, |n| n.security);
                SimNetwork::new(ssid.clone(), security, -70)
            });
        WifiStatusRequest {
            wifi_connected: true,
            internet_connected: self.internet,
            ip_address_acquired: Some(self.internet),
            rssi: network.rssi,
            security: network.security,
            ssid: network.ssid.clone(),
            frequency_mhz: SIM_FREQUENCY_MHZ,
            bssid: network.bssid(),
        }
    }

    fn scan(&mut self) -> WifiScanSummaryRequest {
        self.scan_queue.clear();
        if self.scan_error != 0 {
            return WifiScanSummaryRequest {
                error_code: self.scan_error,
                network_count: 0,
                total_results_size: 0,
            };
        }
        for network in &self.visible {
            let seen = self
                .scan_queue
                .iter()
                .any(|r| r.ssid == network.ssid && r.security == network.security);
            if seen {
                continue;
            }
            if self.scan_queue.len() >= MAX_SCAN_RESULTS {
                debug!(max = MAX_SCAN_RESULTS, "scan result list truncated");
                break;
            }
            self.scan_queue.push_back(WifiScanResultRequest {
                security: network.security,
                rssi: network.rssi,
                ssid: network.ssid.clone(),
            });
        }
        let count = self.scan_queue.len();
        WifiScanSummaryRequest {
            error_code: 0,
            network_count: count as u8,
            total_results_size: (count * WifiScanResultRequest::PAYLOAD_LEN) as u32,
        }
    }

    fn store(&mut self, details: &WifiGetNewDetailsResponse) -> WifiOperationError {
        if self.stored.iter().any(|n| n.ssid == details.ssid()) {
            info!(ssid = %String::from_utf8_lossy(details.ssid()), "network already stored");
            return WifiOperationError::NetworkExists;
        }
        info!(ssid = %String::from_utf8_lossy(details.ssid()), "storing network");
        self.stored.push(StoredNetwork {
            ssid: details.ssid().to_vec(),
            security: details.security(),
            psk: details.psk().map(str::to_string),
        });
        WifiOperationError::Success
    }
}
