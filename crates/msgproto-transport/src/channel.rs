use std::collections::VecDeque;

use thiserror::Error;
use tracing::trace;

/// Errors surfaced by a notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("channel is closed")]
    Closed,
    #[error("no data to write")]
    EmptyWrite,
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Coarse per-channel health counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelHealthSnapshot {
    pub frames_written: u64,
    pub write_failures: u64,
    pub notifications_received: u64,
    /// Notifications that arrived while unsubscribed.
    pub notifications_dropped: u64,
    pub last_error: Option<String>,
}

/// Ordered, reliable byte channel with subscription-gated inbound delivery.
///
/// Inbound notifications are only delivered while subscribed; anything that
/// arrives after `unsubscribe` is dropped.
pub trait NotificationChannel {
    /// Writes one complete frame to the device.
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError>;
    /// Starts accepting inbound notifications. Idempotent.
    fn subscribe(&mut self) -> Result<(), ChannelError>;
    /// Stops accepting inbound notifications and discards any still
    /// buffered. Idempotent.
    fn unsubscribe(&mut self) -> Result<(), ChannelError>;
    /// Returns the next buffered inbound notification, if any.
    fn poll_notification(&mut self) -> Option<Vec<u8>>;
    fn is_subscribed(&self) -> bool;

    /// Best-effort health counters.
    fn health_snapshot(&self) -> ChannelHealthSnapshot {
        ChannelHealthSnapshot::default()
    }
}

impl<C: NotificationChannel + ?Sized> NotificationChannel for Box<C> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        (**self).write(bytes)
    }

    fn subscribe(&mut self) -> Result<(), ChannelError> {
        (**self).subscribe()
    }

    fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        (**self).unsubscribe()
    }

    fn poll_notification(&mut self) -> Option<Vec<u8>> {
        (**self).poll_notification()
    }

    fn is_subscribed(&self) -> bool {
        (**self).is_subscribed()
    }

    fn health_snapshot(&self) -> ChannelHealthSnapshot {
        (**self).health_snapshot()
    }
}

/// In-memory channel for tests and simulations.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChannel {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<Vec<u8>>,
    subscribed: bool,
    closed: bool,
    fail_writes: Option<String>,
    written: u64,
    write_err: u64,
    received: u64,
    dropped: u64,
    last_error: Option<String>,
}

impl InMemoryChannel {
    /// Pushes a device notification. Returns `false` if it was dropped
    /// because nobody is subscribed.
    pub fn deliver_inbound(&mut self, bytes: Vec<u8>) -> bool {
        if !self.subscribed || self.closed {
            self.dropped += 1;
            trace!(len = bytes.len(), "dropping notification while unsubscribed");
            return false;
        }
        self.inbound.push_back(bytes);
        true
    }

    /// Drains and returns all frames written so far.
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbound)
    }

    /// If set, writes fail with `WriteFailed(reason)`.
    pub fn set_fail_writes(&mut self, reason: Option<String>) {
        self.fail_writes = reason;
    }

    /// Closes the channel; later writes and subscriptions fail.
    pub fn close(&mut self) {
        self.closed = true;
        self.subscribed = false;
        self.inbound.clear();
    }
}

impl NotificationChannel for InMemoryChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        if self.closed {
            self.write_err += 1;
            return Err(ChannelError::Closed);
        }
        if bytes.is_empty() {
            self.write_err += 1;
            return Err(ChannelError::EmptyWrite);
        }
        if let Some(reason) = &self.fail_writes {
            self.write_err += 1;
            self.last_error = Some(reason.clone());
            return Err(ChannelError::WriteFailed(reason.clone()));
        }
        self.outbound.push(bytes.to_vec());
        self.written += 1;
        Ok(())
    }

    fn subscribe(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.subscribed = true;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), ChannelError> {
        self.subscribed = false;
        if !self.inbound.is_empty() {
            trace!(count = self.inbound.len(), "discarding buffered notifications");
            self.dropped += self.inbound.len() as u64;
            self.inbound.clear();
        }
        Ok(())
    }

    fn poll_notification(&mut self) -> Option<Vec<u8>> {
        if !self.subscribed {
            return None;
        }
        let msg = self.inbound.pop_front();
        if msg.is_some() {
            self.received += 1;
        }
        msg
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    fn health_snapshot(&self) -> ChannelHealthSnapshot {
        ChannelHealthSnapshot {
            frames_written: self.written,
            write_failures: self.write_err,
            notifications_received: self.received,
            notifications_dropped: self.dropped,
            last_error: self.last_error.clone(),
        }
    }
}
