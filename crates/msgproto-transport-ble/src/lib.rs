//! BLE GATT binding for the message protocol.
//!
//! Frames are written to the RX characteristic and arrive as notifications on
//! the TX characteristic. The platform integration is abstracted behind
//! `GattLink`. Enable the `btleplug` feature for the hardware backend.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use msgproto_transport::channel::{ChannelError, ChannelHealthSnapshot, NotificationChannel};
use tracing::{debug, trace};

#[cfg(feature = "btleplug")]
pub mod btleplug_backend;
pub mod protocol;

/// Minimal GATT link abstraction: one writable RX and one notifying TX
/// characteristic on an already-connected peripheral.
pub trait GattLink {
    type Error: fmt::Display;

    fn write_rx(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
    fn enable_tx_notifications(&mut self) -> Result<(), Self::Error>;
    fn disable_tx_notifications(&mut self) -> Result<(), Self::Error>;
    /// Next TX notification value, if one is buffered.
    fn recv_tx(&mut self) -> Option<Vec<u8>>;
    /// Notifications the link discarded before `recv_tx` could see them.
    fn dropped_notifications(&self) -> u64 {
        0
    }
}

#[derive(Debug)]
pub struct GattChannel<L: GattLink> {
    link: L,
    subscribed: bool,
    frames_written: AtomicU64,
    write_failures: AtomicU64,
    notifications_received: AtomicU64,
    notifications_dropped: AtomicU64,
    last_error: Option<String>,
}

impl<L: GattLink> GattChannel<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            subscribed: false,
            frames_written: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            notifications_received: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            last_error: None,
        }
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn fail(&mut self, err: String) -> ChannelError {
        Self::bump(&self.write_failures);
        self.last_error = Some(err.clone());
        ChannelError::WriteFailed(err)
    }
}

impl<L: GattLink> NotificationChannel for GattChannel<L> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if bytes.is_empty() {
            Self::bump(&self.write_failures);
            return Err(ChannelError::EmptyWrite);
        }
        match self.link.write_rx(bytes) {
            Ok(()) => {
                Self::bump(&self.frames_written);
                trace!(len = bytes.len(), "wrote rx characteristic");
                Ok(())
            }
            Err(err) => Err(self.fail(format!("failed to write data: {err}"))),
        }
    }

    fn subscribe(&mut self) -> Result<(), ChannelError> {
        if self.subscribed {
            return Ok(());
        }
        if let Err(err) = self.link.enable_tx_notifications() {
            return Err(self.fail(format!("unable to subscribe to notifications: {err}")));
        }
        debug!("tx notifications enabled");
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        if !self.subscribed {
            return Ok(());
        }
        self.subscribed = false;
        while self.link.recv_tx().is_some() {
            Self::bump(&self.notifications_dropped);
        }
        if let Err(err) = self.link.disable_tx_notifications() {
            return Err(self.fail(format!("unable to unsubscribe from notifications: {err}")));
        }
        debug!("tx notifications disabled");
        Ok(())
    }

    fn poll_notification(&mut self) -> Option<Vec<u8>> {
        if !self.subscribed {
            while self.link.recv_tx().is_some() {
                Self::bump(&self.notifications_dropped);
            }
            return None;
        }
        let value = self.link.recv_tx();
        if value.is_some() {
            Self::bump(&self.notifications_received);
        }
        value
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn health_snapshot(&self) -> ChannelHealthSnapshot {
        ChannelHealthSnapshot {
            frames_written: self.frames_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            notifications_received: self.notifications_received.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed)
                + self.link.dropped_notifications(),
            last_error: self.last_error.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockGattLink {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    notifications_enabled: bool,
    fail_writes: bool,
    dropped: u64,
}

impl MockGattLink {
    pub fn enqueue_inbound(&mut self, value: Vec<u8>) {
        self.inbound.push_back(value);
    }

    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn set_fail_writes(&mut self, fail_writes: bool) {
        self.fail_writes = fail_writes;
    }

    /// Counts a notification lost inside the link, as a full queue would.
    pub fn record_dropped(&mut self) {
        self.dropped += 1;
    }
}

impl GattLink for MockGattLink {
    type Error = &'static str;

    fn write_rx(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err("gatt write rejected");
        }
        self.outbound.push(bytes.to_vec());
        Ok(())
    }

    fn enable_tx_notifications(&mut self) -> Result<(), Self::Error> {
        self.notifications_enabled = true;
        Ok(())
    }

    fn disable_tx_notifications(&mut self) -> Result<(), Self::Error> {
        self.notifications_enabled = false;
        Ok(())
    }

    fn recv_tx(&mut self) -> Option<Vec<u8>> {
        self.inbound.pop_front()
    }

    fn dropped_notifications(&self) -> u64 {
        self.dropped
    }
}
