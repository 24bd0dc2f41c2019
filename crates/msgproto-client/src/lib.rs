//! Client half of the BLE message protocol.
//!
//! `ProtocolStateMachine` drives one event/request/response exchange at a time
//! and never touches I/O; `ProtocolClient` binds it to a
//! `NotificationChannel`.

pub mod client;
pub mod config;
pub mod error;
pub mod machine;
pub mod notification;

pub use client::ProtocolClient;
pub use config::ClientConfig;
pub use error::ProtocolError;
pub use machine::{ExchangeState, MachineStats, ProtocolStateMachine, Step};
pub use notification::Notification;
