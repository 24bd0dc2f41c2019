use msgproto_transport::channel::{
    ChannelError, ChannelHealthSnapshot, InMemoryChannel, NotificationChannel,
};
use tracing::warn;

use crate::device::SimulatedDevice;

/// Notification channel wired straight to a `SimulatedDevice`.
///
/// Every write is handed to the device synchronously; the frames it replies
/// with are delivered as notifications, and dropped when unsubscribed.
#[derive(Debug)]
pub struct SimulatedChannel {
    device: SimulatedDevice,
    inner: InMemoryChannel,
}

impl SimulatedChannel {
    pub fn new(device: SimulatedDevice) -> Self {
        Self {
            device,
            inner: InMemoryChannel::default(),
        }
    }

    pub fn device(&self) -> &SimulatedDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut SimulatedDevice {
        &mut self.device
    }

    /// Toggles the device LED and delivers the resulting report.
    pub fn toggle_device_led(&mut self) -> Result<bool, ChannelError> {
        let frame = self
            .device
            .toggle_led()
            .map_err(|err| ChannelError::WriteFailed(err.to_string()))?;
        Ok(self.inner.deliver_inbound(frame))
    }
}

impl NotificationChannel for SimulatedChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.inner.write(bytes)?;
        for frame in self.inner.take_outbound() {
            match self.device.handle_frame(&frame) {
                Ok(replies) => {
                    for reply in replies {
                        self.inner.deliver_inbound(reply);
                    }
                }
                Err(err) => warn!(%err, "simulated device rejected frame"),
            }
        }
        Ok(())
    }

    fn subscribe(&mut self) -> Result<(), ChannelError> {
        self.inner.subscribe()
    }

    fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        self.inner.unsubscribe()
    }

    fn poll_notification(&mut self) -> Option<Vec<u8>> {
        self.inner.poll_notification()
    }

    fn is_subscribed(&self) -> bool {
        self.inner.is_subscribed()
    }

    fn health_snapshot(&self) -> ChannelHealthSnapshot {
        self.inner.health_snapshot()
    }
}
