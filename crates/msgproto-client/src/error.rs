use msgproto_codec::CodecError;
use msgproto_transport::channel::ChannelError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    #[error("an exchange is already in flight: {state}")]
    Busy { state: &'static str },
    #[error("wifi scan failed with error code {error_code}")]
    ScanFailed { error_code: u8 },
    #[error("timed out waiting for the device")]
    Timeout,
}
