//! GATT identifiers of the message protocol service.

pub const MESSAGE_PROTOCOL_SERVICE_UUID: &str = "59140001-9252-f896-e811-7ab292fa018c";
/// Client to device writes.
pub const MESSAGE_PROTOCOL_RX_CHAR_UUID: &str = "59140002-9252-f896-e811-7ab292fa018c";
/// Device to client notifications.
pub const MESSAGE_PROTOCOL_TX_CHAR_UUID: &str = "59140003-9252-f896-e811-7ab292fa018c";
