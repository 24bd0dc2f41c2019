//! Transport abstractions for the message protocol.
//!
//! The protocol client only depends on the byte-oriented notification
//! channel trait defined in this crate.

pub mod channel;

pub use channel::{ChannelError, ChannelHealthSnapshot, InMemoryChannel, NotificationChannel};
