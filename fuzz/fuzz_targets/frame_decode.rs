#![no_main]

use libfuzzer_sys::fuzz_target;
use msgproto_codec::frame::{
    parse_event_frame, parse_request_frame_with, parse_response_frame, FrameHeader,
};
use msgproto_codec::payload::{StatusRevision, WifiGetNewDetailsResponse};

fuzz_target!(|data: &[u8]| {
    let _ = FrameHeader::peek(data);
    let _ = parse_event_frame(data);
    let _ = parse_response_frame(data);
    let _ = parse_request_frame_with(data, StatusRevision::Current);
    let _ = parse_request_frame_with(data, StatusRevision::Legacy);
    let _ = WifiGetNewDetailsResponse::decode(data);
});
