//! Simulated peripheral speaking the device half of the message protocol.
//!
//! Used by integration tests and by the CLI's `sim` transport.

pub mod channel;
pub mod device;

pub use channel::SimulatedChannel;
pub use device::{SimNetwork, SimulatedDevice, StoredNetwork, MAX_SCAN_RESULTS};
