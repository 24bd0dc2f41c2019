//! Wire codec for the BLE message protocol.
//!
//! Defines byte-level primitives, the preamble/length framed message layout,
//! and the catalog of fixed-layout request/response payloads.

pub mod bytes;
pub mod error;
pub mod frame;
pub mod ids;
pub mod payload;

pub use error::CodecError;
pub use ids::{Category, EventId, MessageType, RequestKind};
