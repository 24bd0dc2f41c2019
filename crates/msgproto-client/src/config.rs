use msgproto_codec::payload::StatusRevision;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// `SetWifiStatus` layout spoken by the peripheral.
    pub status_revision: StatusRevision,
    /// Acknowledge and surface `ReportLedStatus` requests that arrive while
    /// no exchange is in flight.
    pub accept_unsolicited_led_reports: bool,
    /// Upper bound on notifications handled by one `pump` call.
    pub max_inbound_per_pump: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            status_revision: StatusRevision::Current,
            accept_unsolicited_led_reports: true,
            max_inbound_per_pump: 64,
        }
    }
}
