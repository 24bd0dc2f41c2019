#![no_main]

use libfuzzer_sys::fuzz_target;
use msgproto_sim::SimulatedDevice;

fuzz_target!(|data: &[u8]| {
    let mut device = SimulatedDevice::default();
    for chunk in data.split(|b| *b == 0xFF) {
        let _ = device.handle_frame(chunk);
    }
});
