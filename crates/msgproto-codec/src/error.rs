use thiserror::Error;

/// Errors returned by byte, frame, and payload codec operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A read or write would fall outside the buffer.
    #[error("range {offset}+{count} is out of bounds for {len} bytes")]
    OutOfBounds {
        offset: usize,
        count: usize,
        len: usize,
    },
    /// A value does not fit in the requested little-endian width.
    #[error("value {value} cannot fit in {width} bytes")]
    ValueOverflow { value: u64, width: usize },
    /// Frame is shorter than the header it must carry.
    #[error("frame should be at least {min} bytes, not {len}")]
    FrameTooShort { len: usize, min: usize },
    /// Frame does not start with the protocol preamble.
    #[error("frame preamble mismatch")]
    BadPreamble,
    /// Declared length field disagrees with the received byte count.
    #[error("declared length {declared} does not match frame size {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    /// Declared length is too small to cover the request/response header.
    #[error("declared length {length} leaves a negative payload length")]
    NegativePayloadLength { length: u16 },
    /// Message type byte does not name a known kind.
    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),
    /// A frame of one kind was handed to a parser for another.
    #[error("expected {expected} frame, got {actual}")]
    UnexpectedMessageType {
        expected: &'static str,
        actual: &'static str,
    },
    /// Category id is not one the protocol defines.
    #[error("unknown category id {0:#06x}")]
    UnknownCategory(u16),
    /// Category is known but the request/event id is not.
    #[error("unsupported message: category {category:#06x}, id {id:#06x}")]
    UnsupportedMessage { category: u16, id: u16 },
    /// Payload size does not match the fixed layout for its message.
    #[error("{name} payload should be {expected} bytes, it is {actual}")]
    PayloadLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A field value violates the payload layout or validation rules.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}
