//! Wire framing for requests, responses, and events.
//!
//! ```text
//! 0  [4] preamble 22 B5 58 B9
//! 4  [2] length (total - 6)
//! 6  [1] message type
//! 7  [1] reserved
//! 8  [2] category id
//! 10 [2] request / event id
//! 12 [2] sequence id        request + response
//! 14 [1] error code         response
//! 15 [1] reserved           request + response
//! 16 [N] payload
//! ```

use crate::bytes::{read_bytes, read_lsb_u16, write_bytes, write_lsb_number, write_lsb_u16};
use crate::error::CodecError;
use crate::ids::{Category, EventId, MessageType, RequestKind};
use crate::payload::{Request, RequestPayload, Response, StatusRevision};

pub const PREAMBLE: [u8; 4] = [0x22, 0xB5, 0x58, 0xB9];
/// Bytes in front of and including the length field; not counted by it.
pub const LENGTH_PREFIX_LEN: usize = 6;
pub const EVENT_FRAME_LEN: usize = 12;
/// Request/response header size; the payload starts here.
pub const HEADER_LEN: usize = 16;

const HEADER_LENGTH_FIELD: u16 = (HEADER_LEN - LENGTH_PREFIX_LEN) as u16;

/// Fields shared by every frame kind, read without validating the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u16,
    pub message_type: MessageType,
    pub category: u16,
    pub id: u16,
}

impl FrameHeader {
    /// Reads the first 12 bytes. Used to route inbound notifications before
    /// committing to a full parse.
    pub fn peek(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < EVENT_FRAME_LEN {
            return Err(CodecError::FrameTooShort {
                len: bytes.len(),
                min: EVENT_FRAME_LEN,
            });
        }
        if bytes[..PREAMBLE.len()] != PREAMBLE {
            return Err(CodecError::BadPreamble);
        }
        Ok(Self {
            length: read_lsb_u16(bytes, 4)?,
            message_type: MessageType::try_from(bytes[6])?,
            category: read_lsb_u16(bytes, 8)?,
            id: read_lsb_u16(bytes, 10)?,
        })
    }
}

/// Parsed response header and raw payload (device side).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub kind: RequestKind,
    pub sequence_id: u16,
    pub error_code: u8,
    pub payload: Vec<u8>,
}

fn write_header(
    frame: &mut [u8],
    message_type: MessageType,
    category: Category,
    id: u16,
) -> Result<(), CodecError> {
    write_bytes(&PREAMBLE, frame, 0)?;
    let length = (frame.len() - LENGTH_PREFIX_LEN) as u64;
    write_lsb_number(length, frame, 4, 2)?;
    frame[6] = message_type as u8;
    write_lsb_u16(category as u16, frame, 8)?;
    write_lsb_u16(id, frame, 10)
}

/// Builds the fixed 12-byte event frame.
pub fn create_event_message(event: EventId) -> Result<Vec<u8>, CodecError> {
    let mut frame = vec![0_u8; EVENT_FRAME_LEN];
    write_header(&mut frame, MessageType::Event, event.category(), event.raw())?;
    Ok(frame)
}

/// Builds a response frame answering `request_id` with `sequence_id`.
///
/// Fails with `ValueOverflow` when the payload does not fit the 16-bit
/// length field.
pub fn create_response_message(
    category: Category,
    request_id: u16,
    sequence_id: u16,
    error_code: u8,
    response: Option<&Response>,
) -> Result<Vec<u8>, CodecError> {
    let payload = match response {
        Some(response) => response.payload()?,
        None => Vec::new(),
    };
    let mut frame = vec![0_u8; HEADER_LEN + payload.len()];
    write_header(&mut frame, MessageType::Response, category, request_id)?;
    write_lsb_u16(sequence_id, &mut frame, 12)?;
    frame[14] = error_code;
    write_bytes(&payload, &mut frame, HEADER_LEN)?;
    Ok(frame)
}

/// Builds a request frame as a peripheral would send it.
pub fn encode_request_frame(request: &Request) -> Result<Vec<u8>, CodecError> {
    let payload = request.payload.to_payload()?;
    let mut frame = vec![0_u8; HEADER_LEN + payload.len()];
    write_header(
        &mut frame,
        MessageType::Request,
        request.category(),
        request.request_id(),
    )?;
    write_lsb_u16(request.sequence_id, &mut frame, 12)?;
    write_bytes(&payload, &mut frame, HEADER_LEN)?;
    Ok(frame)
}

struct SequencedFrame<'a> {
    category: u16,
    id: u16,
    sequence_id: u16,
    error_code: u8,
    payload: &'a [u8],
}

fn parse_sequenced(bytes: &[u8], expected: MessageType) -> Result<SequencedFrame<'_>, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::FrameTooShort {
            len: bytes.len(),
            min: HEADER_LEN,
        });
    }
    let header = FrameHeader::peek(bytes)?;
    if header.length < HEADER_LENGTH_FIELD {
        return Err(CodecError::NegativePayloadLength {
            length: header.length,
        });
    }
    let declared = usize::from(header.length);
    if declared + LENGTH_PREFIX_LEN != bytes.len() {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len() - LENGTH_PREFIX_LEN,
        });
    }
    if header.message_type != expected {
        return Err(CodecError::UnexpectedMessageType {
            expected: expected.as_str(),
            actual: header.message_type.as_str(),
        });
    }
    Ok(SequencedFrame {
        category: header.category,
        id: header.id,
        sequence_id: read_lsb_u16(bytes, 12)?,
        error_code: bytes[14],
        payload: &bytes[HEADER_LEN..],
    })
}

/// A structurally valid request frame whose payload is not decoded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRequest<'a> {
    pub kind: RequestKind,
    pub sequence_id: u16,
    pub payload: &'a [u8],
}

impl RawRequest<'_> {
    pub fn decode(&self, revision: StatusRevision) -> Result<Request, CodecError> {
        Ok(Request {
            sequence_id: self.sequence_id,
            payload: RequestPayload::decode(self.kind, self.payload, revision)?,
        })
    }
}

/// Checks framing and resolves the request id without touching the payload.
pub fn split_request_frame(bytes: &[u8]) -> Result<RawRequest<'_>, CodecError> {
    let frame = parse_sequenced(bytes, MessageType::Request)?;
    Ok(RawRequest {
        kind: RequestKind::from_raw(frame.category, frame.id)?,
        sequence_id: frame.sequence_id,
        payload: frame.payload,
    })
}

/// Parses an inbound request using the current status revision.
pub fn parse_request_frame(bytes: &[u8]) -> Result<Request, CodecError> {
    parse_request_frame_with(bytes, StatusRevision::Current)
}

/// Parses an inbound request, decoding `SetWifiStatus` per `revision`.
pub fn parse_request_frame_with(
    bytes: &[u8],
    revision: StatusRevision,
) -> Result<Request, CodecError> {
    split_request_frame(bytes)?.decode(revision)
}

/// Parses a response frame. The payload is left raw; its layout depends on
/// which request it answers.
pub fn parse_response_frame(bytes: &[u8]) -> Result<ResponseFrame, CodecError> {
    let frame = parse_sequenced(bytes, MessageType::Response)?;
    Ok(ResponseFrame {
        kind: RequestKind::from_raw(frame.category, frame.id)?,
        sequence_id: frame.sequence_id,
        error_code: frame.error_code,
        payload: read_bytes(frame.payload, 0, frame.payload.len())?,
    })
}

/// Parses a 12-byte event frame.
pub fn parse_event_frame(bytes: &[u8]) -> Result<EventId, CodecError> {
    let header = FrameHeader::peek(bytes)?;
    let declared = usize::from(header.length);
    if declared + LENGTH_PREFIX_LEN != bytes.len() || bytes.len() != EVENT_FRAME_LEN {
        return Err(CodecError::LengthMismatch {
            declared,
            actual: bytes.len() - LENGTH_PREFIX_LEN,
        });
    }
    if header.message_type != MessageType::Event {
        return Err(CodecError::UnexpectedMessageType {
            expected: MessageType::Event.as_str(),
            actual: header.message_type.as_str(),
        });
    }
    EventId::from_raw(header.category, header.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{DeviceControlRequestId, WifiEventId, WifiRequestId};
    use crate::payload::{
        DesiredLedStatusResponse, ReportLedStatusRequest, SecurityType, WifiScanSummaryRequest,
        WifiStatusRequest,
    };

    fn request_frame(category: u16, id: u16, sequence: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0_u8; HEADER_LEN + payload.len()];
        frame[..4].copy_from_slice(&PREAMBLE);
        frame[4..6].copy_from_slice(&((10 + payload.len()) as u16).to_le_bytes());
        frame[6] = MessageType::Request as u8;
        frame[8..10].copy_from_slice(&category.to_le_bytes());
        frame[10..12].copy_from_slice(&id.to_le_bytes());
        frame[12..14].copy_from_slice(&sequence.to_le_bytes());
        frame[16..].copy_from_slice(payload);
        frame
    }

    #[test]
    fn scan_needed_event_is_exact() {
        let frame = create_event_message(EventId::Wifi(WifiEventId::WifiScanNeeded))
            .expect("event frame builds");
        assert_eq!(
            frame,
            vec![0x22, 0xB5, 0x58, 0xB9, 0x06, 0x00, 0x03, 0x00, 0x02, 0x00, 0x03, 0x00]
        );
        assert_eq!(
            parse_event_frame(&frame).expect("event parses"),
            EventId::Wifi(WifiEventId::WifiScanNeeded)
        );
    }

    #[test]
    fn response_header_carries_correlation_fields() {
        let led = Response::DesiredLedStatus(DesiredLedStatusResponse { led_on: true });
        let frame = create_response_message(
            Category::DeviceControl,
            DeviceControlRequestId::GetDesiredLedStatus as u16,
            0x1234,
            0,
            Some(&led),
        )
        .expect("response builds");
        assert_eq!(frame.len(), 20);
        assert_eq!(read_lsb_u16(&frame, 4).expect("length"), 14);

        let parsed = parse_response_frame(&frame).expect("response parses");
        assert_eq!(
            parsed.kind,
            RequestKind::DeviceControl(DeviceControlRequestId::GetDesiredLedStatus)
        );
        assert_eq!(parsed.sequence_id, 0x1234);
        assert_eq!(parsed.error_code, 0);
        assert_eq!(parsed.payload, vec![1, 0, 0, 0]);
    }

    #[test]
    fn ack_response_has_no_payload() {
        let frame = create_response_message(
            Category::WifiControl,
            WifiRequestId::SetNextWifiScanResult as u16,
            7,
            17,
            None,
        )
        .expect("ack builds");
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(frame[4], 10);
        assert_eq!(frame[6], MessageType::Response as u8);
        assert_eq!(frame[14], 17);
    }

    #[test]
    fn parses_led_report_request() {
        let frame = request_frame(3, 2, 41, &[1, 0, 0, 0]);
        let request = parse_request_frame(&frame).expect("led report parses");
        assert_eq!(request.sequence_id, 41);
        assert_eq!(
            request.payload,
            RequestPayload::ReportLedStatus(ReportLedStatusRequest { led_on: true })
        );
        assert_eq!(request.category(), Category::DeviceControl);
    }

    #[test]
    fn reserved_header_byte_is_tolerated() {
        let mut frame = request_frame(2, 1, 9, &[]);
        frame[7] = 0xEE;
        frame[15] = 0xEE;
        let request = parse_request_frame(&frame).expect("reserved bytes ignored");
        assert_eq!(request.payload, RequestPayload::WifiGetNewDetails);
    }

    #[test]
    fn rejects_short_frames() {
        let err = parse_request_frame(&[0x22, 0xB5, 0x58, 0xB9, 0x00])
            .expect_err("five bytes is not a frame");
        assert!(err.to_string().contains("at least 16 bytes"));
    }

    #[test]
    fn rejects_bad_preamble() {
        let mut frame = request_frame(2, 1, 1, &[]);
        frame[0] = 0x00;
        assert_eq!(parse_request_frame(&frame), Err(CodecError::BadPreamble));
    }

    #[test]
    fn rejects_negative_payload_length() {
        let mut frame = request_frame(2, 1, 1, &[]);
        frame[4] = 9;
        assert_eq!(
            parse_request_frame(&frame),
            Err(CodecError::NegativePayloadLength { length: 9 })
        );
    }

    #[test]
    fn rejects_length_disagreeing_with_size() {
        let mut frame = request_frame(3, 2, 1, &[1, 0, 0, 0]);
        frame.push(0);
        let err = parse_request_frame(&frame).expect_err("trailing byte must fail");
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                declared: 14,
                actual: 15
            }
        );
    }

    #[test]
    fn rejects_non_request_frames() {
        let frame = create_response_message(Category::WifiControl, 3, 1, 0, None)
            .expect("response builds");
        let err = parse_request_frame(&frame).expect_err("response is not a request");
        assert!(err.to_string().contains("expected request frame"));
    }

    #[test]
    fn rejects_unknown_request_ids() {
        let frame = request_frame(2, 0x0009, 1, &[]);
        assert_eq!(
            parse_request_frame(&frame),
            Err(CodecError::UnsupportedMessage {
                category: 2,
                id: 9
            })
        );
        let frame = request_frame(0x0007, 1, 1, &[]);
        assert_eq!(
            parse_request_frame(&frame),
            Err(CodecError::UnknownCategory(7))
        );
    }

    #[test]
    fn split_checks_framing_before_payload() {
        let frame = request_frame(2, 3, 6, &[0_u8; 4]);
        let raw = split_request_frame(&frame).expect("framing is valid");
        assert_eq!(raw.kind, RequestKind::Wifi(WifiRequestId::SetWifiStatus));
        assert_eq!(raw.sequence_id, 6);
        assert!(raw.decode(StatusRevision::Current).is_err());

        let mut truncated = frame.clone();
        truncated.truncate(HEADER_LEN - 1);
        assert!(matches!(
            split_request_frame(&truncated),
            Err(CodecError::FrameTooShort { .. })
        ));
    }

    #[test]
    fn wrong_payload_length_is_a_shape_error() {
        let frame = request_frame(2, 3, 1, &[0_u8; 47]);
        let err = parse_request_frame(&frame).expect_err("47-byte status must fail");
        assert!(matches!(err, CodecError::PayloadLength { expected: 48, .. }));
    }

    #[test]
    fn encoded_requests_parse_back() {
        let request = Request {
            sequence_id: 300,
            payload: RequestPayload::WifiScanSummary(WifiScanSummaryRequest {
                error_code: 0,
                network_count: 2,
                total_results_size: 72,
            }),
        };
        let frame = encode_request_frame(&request).expect("request encodes");
        assert_eq!(frame.len(), HEADER_LEN + 8);
        assert_eq!(parse_request_frame(&frame).expect("request parses"), request);

        let status = Request {
            sequence_id: 1,
            payload: RequestPayload::WifiStatus(WifiStatusRequest {
                wifi_connected: true,
                internet_connected: true,
                ip_address_acquired: Some(true),
                rssi: -42,
                security: SecurityType::Wpa2,
                ssid: b"lab".to_vec(),
                frequency_mhz: 5_180,
                bssid: [1, 2, 3, 4, 5, 6],
            }),
        };
        let frame = encode_request_frame(&status).expect("status encodes");
        let legacy = parse_request_frame_with(&frame, StatusRevision::Legacy).expect("legacy");
        match legacy.payload {
            RequestPayload::WifiStatus(decoded) => {
                assert_eq!(decoded.ip_address_acquired, None);
                assert_eq!(decoded.frequency_mhz, 5_180);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn event_parser_rejects_request_frames() {
        let frame = request_frame(2, 1, 1, &[]);
        assert!(parse_event_frame(&frame).is_err());
        let mut event = create_event_message(EventId::Wifi(WifiEventId::WifiStatusNeeded))
            .expect("event builds");
        event[6] = MessageType::Request as u8;
        assert!(parse_event_frame(&event).is_err());
    }
}
