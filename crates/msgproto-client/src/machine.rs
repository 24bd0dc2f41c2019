//! Exchange state machine.
//!
//! Each operation writes one event and then answers the device's requests
//! until it is done. The machine only sees bytes: `begin_*` returns the event
//! frame to write, `handle_inbound` returns the responses to write and the
//! notifications to surface. Progress counters live inside `ExchangeState`, so
//! a transition is a pure function of the current state and one request.

use msgproto_codec::frame::{
    create_event_message, create_response_message, split_request_frame, FrameHeader,
};
use msgproto_codec::ids::{
    DeviceControlEventId, DeviceControlRequestId, EventId, RequestKind, WifiEventId, WifiRequestId,
};
use msgproto_codec::payload::{
    DesiredLedStatusResponse, Request, RequestPayload, Response, WifiGetNewDetailsResponse,
};
use msgproto_codec::MessageType;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ProtocolError;
use crate::notification::Notification;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeState {
    #[default]
    Idle,
    AwaitingWifiStatus,
    AwaitingScanSummary,
    AwaitingScanResult {
        received: u8,
        expected: u8,
    },
    AwaitingGetNewDetails {
        details: WifiGetNewDetailsResponse,
    },
    AwaitingSetResult,
    AwaitingGetDesiredLed {
        desired: bool,
    },
    AwaitingLedReport,
}

impl ExchangeState {
    pub fn is_idle(&self) -> bool {
        matches!(self, ExchangeState::Idle)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExchangeState::Idle => "idle",
            ExchangeState::AwaitingWifiStatus => "awaiting wifi status",
            ExchangeState::AwaitingScanSummary => "awaiting scan summary",
            ExchangeState::AwaitingScanResult { .. } => "awaiting scan result",
            ExchangeState::AwaitingGetNewDetails { .. } => "awaiting new details request",
            ExchangeState::AwaitingSetResult => "awaiting add network result",
            ExchangeState::AwaitingGetDesiredLed { .. } => "awaiting desired led request",
            ExchangeState::AwaitingLedReport => "awaiting led report",
        }
    }

    /// The one request kind this state answers.
    pub fn expected_request(&self) -> Option<RequestKind> {
        let kind = match self {
            ExchangeState::Idle => return None,
            ExchangeState::AwaitingWifiStatus => RequestKind::Wifi(WifiRequestId::SetWifiStatus),
            ExchangeState::AwaitingScanSummary => {
                RequestKind::Wifi(WifiRequestId::SetWifiScanResultsSummary)
            }
            ExchangeState::AwaitingScanResult { .. } => {
                RequestKind::Wifi(WifiRequestId::SetNextWifiScanResult)
            }
            ExchangeState::AwaitingGetNewDetails { .. } => {
                RequestKind::Wifi(WifiRequestId::GetNewWifiDetails)
            }
            ExchangeState::AwaitingSetResult => {
                RequestKind::Wifi(WifiRequestId::SetWifiOperationResult)
            }
            ExchangeState::AwaitingGetDesiredLed { .. } => {
                RequestKind::DeviceControl(DeviceControlRequestId::GetDesiredLedStatus)
            }
            ExchangeState::AwaitingLedReport => {
                RequestKind::DeviceControl(DeviceControlRequestId::ReportLedStatus)
            }
        };
        Some(kind)
    }
}

/// Frames to write, in order, and notifications produced by one inbound frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Step {
    pub outbound: Vec<Vec<u8>>,
    pub notifications: Vec<Notification>,
}

impl Step {
    fn respond(mut self, frame: Vec<u8>) -> Self {
        self.outbound.push(frame);
        self
    }

    fn notify(mut self, notification: Notification) -> Self {
        self.notifications.push(notification);
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MachineStats {
    /// Inbound frames handed to `handle_inbound`.
    pub frames_received: u64,
    /// Well-formed frames that did not match the expected request.
    pub frames_ignored: u64,
    /// Frames that failed framing, shape, or id validation.
    pub frames_rejected: u64,
    /// Response frames produced.
    pub responses_sent: u64,
    /// Exchanges that returned to idle without error.
    pub exchanges_completed: u64,
}

#[derive(Debug, Default)]
pub struct ProtocolStateMachine {
    state: ExchangeState,
    config: ClientConfig,
    stats: MachineStats,
}

fn ack(request: &Request, error_code: u8) -> Result<Vec<u8>, ProtocolError> {
    respond(request, error_code, None)
}

fn respond(
    request: &Request,
    error_code: u8,
    response: Option<&Response>,
) -> Result<Vec<u8>, ProtocolError> {
    Ok(create_response_message(
        request.category(),
        request.request_id(),
        request.sequence_id,
        error_code,
        response,
    )?)
}

/// Advances `state` with a request that already matched it.
fn transition(
    state: ExchangeState,
    request: &Request,
) -> Result<(ExchangeState, Step), ProtocolError> {
    let step = Step::default();
    match (state, &request.payload) {
        (ExchangeState::AwaitingWifiStatus, RequestPayload::WifiStatus(status)) => Ok((
            ExchangeState::Idle,
            step.respond(ack(request, 0)?)
                .notify(Notification::WifiStatus(status.clone())),
        )),
        (ExchangeState::AwaitingScanSummary, RequestPayload::WifiScanSummary(summary)) => {
            if summary.error_code != 0 {
                return Err(ProtocolError::ScanFailed {
                    error_code: summary.error_code,
                });
            }
            let step = step.respond(ack(request, 0)?);
            if summary.network_count == 0 {
                return Ok((ExchangeState::Idle, step.notify(Notification::ScanEmpty)));
            }
            Ok((
                ExchangeState::AwaitingScanResult {
                    received: 0,
                    expected: summary.network_count,
                },
                step,
            ))
        }
        (
            ExchangeState::AwaitingScanResult { received, expected },
            RequestPayload::WifiScanResult(network),
        ) => {
            let index = received.saturating_add(1);
            let step = step.respond(ack(request, 0)?).notify(Notification::ScanProgress {
                network: network.clone(),
                index,
                total: expected,
            });
            let next = if index >= expected {
                ExchangeState::Idle
            } else {
                ExchangeState::AwaitingScanResult {
                    received: index,
                    expected,
                }
            };
            Ok((next, step))
        }
        (ExchangeState::AwaitingGetNewDetails { details }, RequestPayload::WifiGetNewDetails) => {
            let response = Response::WifiGetNewDetails(details);
            Ok((
                ExchangeState::AwaitingSetResult,
                step.respond(respond(request, 0, Some(&response))?),
            ))
        }
        (ExchangeState::AwaitingSetResult, RequestPayload::WifiSetResult(result)) => Ok((
            ExchangeState::Idle,
            step.respond(ack(request, result.error_code)?)
                .notify(Notification::AddNetworkResult {
                    outcome: result.outcome(),
                }),
        )),
        (ExchangeState::AwaitingGetDesiredLed { desired }, RequestPayload::GetDesiredLedStatus) => {
            let response = Response::DesiredLedStatus(DesiredLedStatusResponse { led_on: desired });
            Ok((
                ExchangeState::Idle,
                step.respond(respond(request, 0, Some(&response))?)
                    .notify(Notification::DesiredLedDelivered { on: desired }),
            ))
        }
        (ExchangeState::AwaitingLedReport, RequestPayload::ReportLedStatus(report))
        | (ExchangeState::Idle, RequestPayload::ReportLedStatus(report)) => Ok((
            ExchangeState::Idle,
            step.respond(ack(request, 0)?)
                .notify(Notification::LedStatus { on: report.led_on }),
        )),
        (state, _) => Ok((state, step)),
    }
}

impl ProtocolStateMachine {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            state: ExchangeState::Idle,
            config,
            stats: MachineStats::default(),
        }
    }

    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> MachineStats {
        self.stats
    }

    /// Drops any in-flight exchange.
    pub fn reset(&mut self) {
        if !self.state.is_idle() {
            debug!(state = self.state.name(), "resetting exchange");
        }
        self.state = ExchangeState::Idle;
    }

    fn begin(&mut self, event: EventId, next: ExchangeState) -> Result<Vec<u8>, ProtocolError> {
        if !self.state.is_idle() {
            return Err(ProtocolError::Busy {
                state: self.state.name(),
            });
        }
        let frame = create_event_message(event)?;
        info!(?event, awaiting = next.name(), "starting exchange");
        self.state = next;
        Ok(frame)
    }

    /// Returns the `WifiStatusNeeded` event frame.
    pub fn begin_wifi_status(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.begin(
            EventId::Wifi(WifiEventId::WifiStatusNeeded),
            ExchangeState::AwaitingWifiStatus,
        )
    }

    /// Returns the `WifiScanNeeded` event frame.
    pub fn begin_scan(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.begin(
            EventId::Wifi(WifiEventId::WifiScanNeeded),
            ExchangeState::AwaitingScanSummary,
        )
    }

    /// Returns the `NewWifiDetailsAvailable` event frame; `details` is sent
    /// when the device asks for it.
    pub fn begin_add_network(
        &mut self,
        details: WifiGetNewDetailsResponse,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.begin(
            EventId::Wifi(WifiEventId::NewWifiDetailsAvailable),
            ExchangeState::AwaitingGetNewDetails { details },
        )
    }

    /// Returns the `LedStatusNeeded` event frame.
    pub fn begin_get_led(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.begin(
            EventId::DeviceControl(DeviceControlEventId::LedStatusNeeded),
            ExchangeState::AwaitingLedReport,
        )
    }

    /// Returns the `DesiredLedStatusAvailable` event frame.
    pub fn begin_set_led(&mut self, on: bool) -> Result<Vec<u8>, ProtocolError> {
        self.begin(
            EventId::DeviceControl(DeviceControlEventId::DesiredLedStatusAvailable),
            ExchangeState::AwaitingGetDesiredLed { desired: on },
        )
    }

    fn accepts(&self, kind: RequestKind) -> bool {
        if self.state.expected_request() == Some(kind) {
            return true;
        }
        self.state.is_idle()
            && self.config.accept_unsolicited_led_reports
            && kind == RequestKind::DeviceControl(DeviceControlRequestId::ReportLedStatus)
    }

    /// Handles one inbound notification.
    ///
    /// Events, responses, and requests other than the expected one are
    /// ignored. Malformed frames and unknown ids abort the exchange and leave
    /// the machine idle; while idle they are counted and dropped.
    pub fn handle_inbound(&mut self, bytes: &[u8]) -> Result<Step, ProtocolError> {
        self.stats.frames_received += 1;
        let was_idle = self.state.is_idle();
        match self.handle_frame(bytes) {
            Ok(step) => Ok(step),
            Err(err) if was_idle => {
                // Nothing in flight to abort.
                self.stats.frames_rejected += 1;
                warn!(%err, len = bytes.len(), "dropping malformed frame while idle");
                Ok(Step::default())
            }
            Err(err) => {
                self.stats.frames_rejected += 1;
                warn!(%err, state = self.state.name(), "aborting exchange");
                self.state = ExchangeState::Idle;
                Err(err)
            }
        }
    }

    fn handle_frame(&mut self, bytes: &[u8]) -> Result<Step, ProtocolError> {
        let header = FrameHeader::peek(bytes)?;
        if header.message_type != MessageType::Request {
            self.stats.frames_ignored += 1;
            debug!(kind = header.message_type.as_str(), "ignoring non-request frame");
            return Ok(Step::default());
        }
        let raw = split_request_frame(bytes)?;
        let kind = raw.kind;
        if !self.accepts(kind) {
            self.stats.frames_ignored += 1;
            debug!(%kind, state = self.state.name(), "ignoring unexpected request");
            return Ok(Step::default());
        }

        let request = raw.decode(self.config.status_revision)?;
        debug!(%kind, sequence_id = request.sequence_id, "handling request");
        let was_idle = self.state.is_idle();
        let (next, step) = transition(std::mem::take(&mut self.state), &request)?;
        self.state = next;
        self.stats.responses_sent += step.outbound.len() as u64;
        if !was_idle && self.state.is_idle() {
            self.stats.exchanges_completed += 1;
            info!(%kind, "exchange complete");
        }
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use msgproto_codec::frame::{encode_request_frame, parse_response_frame, HEADER_LEN};
    use msgproto_codec::payload::{
        ReportLedStatusRequest, SecurityType, WifiScanResultRequest, WifiScanSummaryRequest,
        WifiSetRequest, WifiStatusRequest,
    };

    use super::*;

    fn frame(sequence_id: u16, payload: RequestPayload) -> Vec<u8> {
        encode_request_frame(&Request {
            sequence_id,
            payload,
        })
        .expect("request should encode")
    }

    fn summary(error_code: u8, network_count: u8) -> RequestPayload {
        RequestPayload::WifiScanSummary(WifiScanSummaryRequest {
            error_code,
            network_count,
            total_results_size: u32::from(network_count) * 8,
        })
    }

    fn result(ssid: &str) -> RequestPayload {
        RequestPayload::WifiScanResult(WifiScanResultRequest {
            security: SecurityType::Wpa2,
            rssi: -50,
            ssid: ssid.as_bytes().to_vec(),
        })
    }

    #[test]
    fn second_exchange_is_rejected_while_busy() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_scan().expect("scan should start");
        let err = machine.begin_get_led().expect_err("busy machine must refuse");
        assert!(err.to_string().contains("awaiting scan summary"));
        assert_eq!(machine.state(), &ExchangeState::AwaitingScanSummary);
    }

    #[test]
    fn wifi_status_is_acked_and_surfaced() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_wifi_status().expect("status should start");
        let status = WifiStatusRequest {
            wifi_connected: true,
            internet_connected: true,
            ip_address_acquired: Some(true),
            rssi: -40,
            security: SecurityType::Wpa2,
            ssid: b"home".to_vec(),
            frequency_mhz: 2_437,
            bssid: [0; 6],
        };
        let step = machine
            .handle_inbound(&frame(3, RequestPayload::WifiStatus(status.clone())))
            .expect("status should be handled");
        assert!(machine.is_idle());
        assert_eq!(step.notifications, vec![Notification::WifiStatus(status)]);
        let ack = parse_response_frame(&step.outbound[0]).expect("ack should parse");
        assert_eq!(ack.sequence_id, 3);
        assert_eq!(ack.error_code, 0);
        assert_eq!(machine.stats().exchanges_completed, 1);
    }

    #[test]
    fn empty_scan_returns_to_idle_with_one_notification() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_scan().expect("scan should start");
        let step = machine
            .handle_inbound(&frame(1, summary(0, 0)))
            .expect("summary should be handled");
        assert!(machine.is_idle());
        assert_eq!(step.notifications, vec![Notification::ScanEmpty]);
        assert_eq!(step.outbound.len(), 1);
    }

    #[test]
    fn scan_results_are_counted_through_state() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_scan().expect("scan should start");
        machine
            .handle_inbound(&frame(1, summary(0, 2)))
            .expect("summary should be handled");
        assert_eq!(
            machine.state(),
            &ExchangeState::AwaitingScanResult {
                received: 0,
                expected: 2
            }
        );

        let first = machine
            .handle_inbound(&frame(2, result("one")))
            .expect("first result should be handled");
        assert!(matches!(
            first.notifications.as_slice(),
            [Notification::ScanProgress {
                index: 1,
                total: 2,
                ..
            }]
        ));
        assert!(!machine.is_idle());

        let second = machine
            .handle_inbound(&frame(3, result("two")))
            .expect("second result should be handled");
        assert!(matches!(
            second.notifications.as_slice(),
            [Notification::ScanProgress {
                index: 2,
                total: 2,
                ..
            }]
        ));
        assert!(machine.is_idle());
    }

    #[test]
    fn failed_scan_summary_aborts_without_ack() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_scan().expect("scan should start");
        let err = machine
            .handle_inbound(&frame(1, summary(2, 0)))
            .expect_err("scan error must abort");
        assert_eq!(err, ProtocolError::ScanFailed { error_code: 2 });
        assert!(machine.is_idle());
    }

    #[test]
    fn add_network_sends_details_then_acks_result_code() {
        let mut machine = ProtocolStateMachine::default();
        let details = WifiGetNewDetailsResponse::new("lab", SecurityType::Wpa2, Some("password1"))
            .expect("details should validate");
        machine
            .begin_add_network(details.clone())
            .expect("add network should start");

        let step = machine
            .handle_inbound(&frame(8, RequestPayload::WifiGetNewDetails))
            .expect("details request should be handled");
        assert_eq!(machine.state(), &ExchangeState::AwaitingSetResult);
        assert!(step.notifications.is_empty());
        let response = parse_response_frame(&step.outbound[0]).expect("response should parse");
        assert_eq!(response.sequence_id, 8);
        assert_eq!(response.payload.len(), WifiGetNewDetailsResponse::PAYLOAD_LEN);
        assert_eq!(
            WifiGetNewDetailsResponse::decode(&response.payload).expect("details decode"),
            details
        );

        let step = machine
            .handle_inbound(&frame(
                9,
                RequestPayload::WifiSetResult(WifiSetRequest { error_code: 17 }),
            ))
            .expect("set result should be handled");
        assert!(machine.is_idle());
        let ack = parse_response_frame(&step.outbound[0]).expect("ack should parse");
        assert_eq!(ack.error_code, 17);
        assert_eq!(step.outbound[0].len(), HEADER_LEN);
        assert_eq!(
            step.notifications,
            vec![Notification::AddNetworkResult {
                outcome: msgproto_codec::payload::WifiOperationError::NetworkExists
            }]
        );
    }

    #[test]
    fn set_led_answers_desired_state() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_set_led(true).expect("set led should start");
        let step = machine
            .handle_inbound(&frame(4, RequestPayload::GetDesiredLedStatus))
            .expect("desired led request should be handled");
        let response = parse_response_frame(&step.outbound[0]).expect("response should parse");
        assert_eq!(response.payload, vec![1, 0, 0, 0]);
        assert_eq!(
            step.notifications,
            vec![Notification::DesiredLedDelivered { on: true }]
        );
        assert!(machine.is_idle());
    }

    #[test]
    fn mismatched_requests_are_ignored() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_scan().expect("scan should start");
        let step = machine
            .handle_inbound(&frame(1, RequestPayload::GetDesiredLedStatus))
            .expect("mismatch is not an error");
        assert_eq!(step, Step::default());
        assert_eq!(machine.state(), &ExchangeState::AwaitingScanSummary);

        let event = create_event_message(EventId::Wifi(WifiEventId::WifiScanNeeded))
            .expect("event should encode");
        assert_eq!(
            machine.handle_inbound(&event).expect("events are ignored"),
            Step::default()
        );
        assert_eq!(machine.stats().frames_ignored, 2);
    }

    #[test]
    fn malformed_frames_abort_to_idle() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_wifi_status().expect("status should start");
        let mut bad = frame(1, summary(0, 1));
        bad.truncate(HEADER_LEN - 1);
        assert!(machine.handle_inbound(&bad).is_err());
        assert!(machine.is_idle());

        machine.begin_wifi_status().expect("status should restart");
        let mut short_status = frame(1, RequestPayload::GetDesiredLedStatus);
        short_status[8] = 0x02;
        short_status[10] = 0x03;
        let err = machine
            .handle_inbound(&short_status)
            .expect_err("empty status payload must fail");
        assert!(err.to_string().contains("should be 48 bytes"));
        assert!(machine.is_idle());
        assert_eq!(machine.stats().frames_rejected, 2);
    }

    #[test]
    fn unknown_request_ids_are_errors() {
        let mut machine = ProtocolStateMachine::default();
        machine.begin_get_led().expect("get led should start");
        let mut unknown = frame(1, RequestPayload::GetDesiredLedStatus);
        unknown[10] = 0x09;
        let err = machine
            .handle_inbound(&unknown)
            .expect_err("unknown id must fail");
        assert!(err.to_string().contains("unsupported message"));
        assert!(machine.is_idle());
    }

    #[test]
    fn unsolicited_led_reports_follow_config() {
        let report = frame(
            5,
            RequestPayload::ReportLedStatus(ReportLedStatusRequest { led_on: true }),
        );

        let mut machine = ProtocolStateMachine::default();
        let step = machine
            .handle_inbound(&report)
            .expect("report should be handled");
        assert_eq!(step.notifications, vec![Notification::LedStatus { on: true }]);
        assert_eq!(step.outbound.len(), 1);
        assert_eq!(machine.stats().exchanges_completed, 0);

        let mut strict = ProtocolStateMachine::new(ClientConfig {
            accept_unsolicited_led_reports: false,
            ..ClientConfig::default()
        });
        assert_eq!(
            strict.handle_inbound(&report).expect("ignored"),
            Step::default()
        );
    }

    #[test]
    fn malformed_frames_while_idle_are_dropped() {
        let mut machine = ProtocolStateMachine::default();
        assert_eq!(
            machine.handle_inbound(&[1, 2, 3]).expect("idle garbage is dropped"),
            Step::default()
        );
        let mut unknown = frame(2, RequestPayload::GetDesiredLedStatus);
        unknown[10] = 0x09;
        assert_eq!(
            machine.handle_inbound(&unknown).expect("idle unknown id is dropped"),
            Step::default()
        );
        assert!(machine.is_idle());
        assert_eq!(machine.stats().frames_rejected, 2);

        let report = frame(
            3,
            RequestPayload::ReportLedStatus(ReportLedStatusRequest { led_on: true }),
        );
        let step = machine
            .handle_inbound(&report)
            .expect("later report should be handled");
        assert_eq!(step.notifications, vec![Notification::LedStatus { on: true }]);
    }
}
