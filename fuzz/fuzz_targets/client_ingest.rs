#![no_main]

use libfuzzer_sys::fuzz_target;
use msgproto_client::{ClientConfig, ProtocolClient};
use msgproto_transport::channel::InMemoryChannel;

fuzz_target!(|data: &[u8]| {
    let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
    if client.start_scan().is_err() {
        return;
    }
    for chunk in data.split(|b| *b == 0xFF) {
        if !client.channel_mut().deliver_inbound(chunk.to_vec()) {
            break;
        }
        let _ = client.pump();
    }
});
