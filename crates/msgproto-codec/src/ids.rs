use std::fmt;

use crate::error::CodecError;

/// Frame kind carried at offset 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Request = 0x01,
    Response = 0x02,
    Event = 0x03,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Response => "response",
            MessageType::Event => "event",
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::Request),
            0x02 => Ok(MessageType::Response),
            0x03 => Ok(MessageType::Event),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }
}

/// Subsystem selector carried at offset 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Category {
    WifiControl = 0x0002,
    DeviceControl = 0x0003,
}

impl TryFrom<u16> for Category {
    type Error = CodecError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0002 => Ok(Category::WifiControl),
            0x0003 => Ok(Category::DeviceControl),
            other => Err(CodecError::UnknownCategory(other)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::WifiControl => f.write_str("WifiControl"),
            Category::DeviceControl => f.write_str("DeviceControl"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WifiEventId {
    NewWifiDetailsAvailable = 0x0001,
    WifiStatusNeeded = 0x0002,
    WifiScanNeeded = 0x0003,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DeviceControlEventId {
    DesiredLedStatusAvailable = 0x0001,
    LedStatusNeeded = 0x0002,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WifiRequestId {
    GetNewWifiDetails = 0x0001,
    SetWifiScanResultsSummary = 0x0002,
    SetWifiStatus = 0x0003,
    SetWifiOperationResult = 0x0004,
    SetNextWifiScanResult = 0x0005,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DeviceControlRequestId {
    GetDesiredLedStatus = 0x0001,
    ReportLedStatus = 0x0002,
}

/// Event identity: category plus category-scoped event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventId {
    Wifi(WifiEventId),
    DeviceControl(DeviceControlEventId),
}

impl EventId {
    pub fn category(self) -> Category {
        match self {
            EventId::Wifi(_) => Category::WifiControl,
            EventId::DeviceControl(_) => Category::DeviceControl,
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            EventId::Wifi(id) => id as u16,
            EventId::DeviceControl(id) => id as u16,
        }
    }

    /// Resolves a wire `(category, event id)` pair.
    pub fn from_raw(category: u16, id: u16) -> Result<Self, CodecError> {
        let unsupported = CodecError::UnsupportedMessage { category, id };
        match Category::try_from(category)? {
            Category::WifiControl => match id {
                0x0001 => Ok(EventId::Wifi(WifiEventId::NewWifiDetailsAvailable)),
                0x0002 => Ok(EventId::Wifi(WifiEventId::WifiStatusNeeded)),
                0x0003 => Ok(EventId::Wifi(WifiEventId::WifiScanNeeded)),
                _ => Err(unsupported),
            },
            Category::DeviceControl => match id {
                0x0001 => Ok(EventId::DeviceControl(
                    DeviceControlEventId::DesiredLedStatusAvailable,
                )),
                0x0002 => Ok(EventId::DeviceControl(DeviceControlEventId::LedStatusNeeded)),
                _ => Err(unsupported),
            },
        }
    }
}

/// Request identity: category plus category-scoped request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Wifi(WifiRequestId),
    DeviceControl(DeviceControlRequestId),
}

impl RequestKind {
    pub fn category(self) -> Category {
        match self {
            RequestKind::Wifi(_) => Category::WifiControl,
            RequestKind::DeviceControl(_) => Category::DeviceControl,
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            RequestKind::Wifi(id) => id as u16,
            RequestKind::DeviceControl(id) => id as u16,
        }
    }

    /// Resolves a wire `(category, request id)` pair. Unknown ids are never
    /// coerced into a known kind.
    pub fn from_raw(category: u16, id: u16) -> Result<Self, CodecError> {
        let unsupported = CodecError::UnsupportedMessage { category, id };
        match Category::try_from(category)? {
            Category::WifiControl => match id {
                0x0001 => Ok(RequestKind::Wifi(WifiRequestId::GetNewWifiDetails)),
                0x0002 => Ok(RequestKind::Wifi(WifiRequestId::SetWifiScanResultsSummary)),
                0x0003 => Ok(RequestKind::Wifi(WifiRequestId::SetWifiStatus)),
                0x0004 => Ok(RequestKind::Wifi(WifiRequestId::SetWifiOperationResult)),
                0x0005 => Ok(RequestKind::Wifi(WifiRequestId::SetNextWifiScanResult)),
                _ => Err(unsupported),
            },
            Category::DeviceControl => match id {
                0x0001 => Ok(RequestKind::DeviceControl(
                    DeviceControlRequestId::GetDesiredLedStatus,
                )),
                0x0002 => Ok(RequestKind::DeviceControl(
                    DeviceControlRequestId::ReportLedStatus,
                )),
                _ => Err(unsupported),
            },
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Wifi(id) => write!(f, "WifiControl/{id:?}"),
            RequestKind::DeviceControl(id) => write!(f, "DeviceControl/{id:?}"),
        }
    }
}
