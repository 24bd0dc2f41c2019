use std::thread;
use std::time::{Duration, Instant};

use msgproto_codec::payload::{SecurityType, WifiGetNewDetailsResponse};
use msgproto_transport::channel::{ChannelHealthSnapshot, NotificationChannel};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ProtocolError;
use crate::machine::ProtocolStateMachine;
use crate::notification::Notification;

/// Binds a `ProtocolStateMachine` to a notification channel.
///
/// The channel is subscribed for the lifetime of an exchange and
/// unsubscribed as soon as the machine is idle again, unless the client was
/// asked to keep listening for LED reports.
#[derive(Debug)]
pub struct ProtocolClient<C: NotificationChannel> {
    channel: C,
    machine: ProtocolStateMachine,
    listening: bool,
}

impl<C: NotificationChannel> ProtocolClient<C> {
    pub fn new(channel: C, config: ClientConfig) -> Self {
        Self {
            channel,
            machine: ProtocolStateMachine::new(config),
            listening: false,
        }
    }

    pub fn machine(&self) -> &ProtocolStateMachine {
        &self.machine
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    pub fn health_snapshot(&self) -> ChannelHealthSnapshot {
        self.channel.health_snapshot()
    }

    pub fn is_idle(&self) -> bool {
        self.machine.is_idle()
    }

    fn start(
        &mut self,
        begin: impl FnOnce(&mut ProtocolStateMachine) -> Result<Vec<u8>, ProtocolError>,
    ) -> Result<(), ProtocolError> {
        let event = begin(&mut self.machine)?;
        let sent = self
            .channel
            .subscribe()
            .and_then(|()| self.channel.write(&event));
        if let Err(err) = sent {
            self.end_exchange();
            return Err(err.into());
        }
        Ok(())
    }

    pub fn start_wifi_status(&mut self) -> Result<(), ProtocolError> {
        self.start(ProtocolStateMachine::begin_wifi_status)
    }

    pub fn start_scan(&mut self) -> Result<(), ProtocolError> {
        self.start(ProtocolStateMachine::begin_scan)
    }

    /// Validates the network details before anything is written.
    pub fn start_add_network(
        &mut self,
        ssid: impl Into<Vec<u8>>,
        security: SecurityType,
        psk: Option<&str>,
    ) -> Result<(), ProtocolError> {
        let details = WifiGetNewDetailsResponse::new(ssid, security, psk)?;
        self.start(|machine| machine.begin_add_network(details))
    }

    pub fn start_get_led(&mut self) -> Result<(), ProtocolError> {
        self.start(ProtocolStateMachine::begin_get_led)
    }

    pub fn start_set_led(&mut self, on: bool) -> Result<(), ProtocolError> {
        self.start(|machine| machine.begin_set_led(on))
    }

    /// Stays subscribed while idle so unsolicited LED reports are answered.
    pub fn listen_for_led_reports(&mut self) -> Result<(), ProtocolError> {
        self.channel.subscribe()?;
        self.listening = true;
        Ok(())
    }

    /// Handles buffered notifications and writes the resulting responses in
    /// order. Returns the notifications produced by this call.
    pub fn pump(&mut self) -> Result<Vec<Notification>, ProtocolError> {
        let mut notifications = Vec::new();
        let budget = self.machine.config().max_inbound_per_pump;
        for _ in 0..budget {
            let Some(bytes) = self.channel.poll_notification() else {
                break;
            };
            let step = match self.machine.handle_inbound(&bytes) {
                Ok(step) => step,
                Err(err) => {
                    self.end_exchange();
                    return Err(err);
                }
            };
            for frame in &step.outbound {
                if let Err(err) = self.channel.write(frame) {
                    self.end_exchange();
                    return Err(err.into());
                }
            }
            notifications.extend(step.notifications);
            if self.machine.is_idle() && !self.listening {
                self.channel.unsubscribe()?;
                break;
            }
        }
        Ok(notifications)
    }

    /// Unsubscribes, drops any in-flight exchange, and stops listening for
    /// LED reports. Bytes arriving later are dropped by the channel.
    pub fn abandon(&mut self) {
        self.listening = false;
        self.end_exchange();
    }

    /// Drops the in-flight exchange. A listening client stays subscribed.
    fn end_exchange(&mut self) {
        self.machine.reset();
        let result = if self.listening {
            self.channel.subscribe()
        } else {
            self.channel.unsubscribe()
        };
        if let Err(err) = result {
            warn!(%err, listening = self.listening, "channel update failed after exchange");
        }
    }

    /// Pumps until the exchange finishes or `timeout` elapses, sleeping
    /// `poll_interval` between empty pumps.
    pub fn run_until_idle(
        &mut self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<Notification>, ProtocolError> {
        let deadline = Instant::now() + timeout;
        let mut notifications = Vec::new();
        loop {
            notifications.extend(self.pump()?);
            if self.machine.is_idle() {
                return Ok(notifications);
            }
            if Instant::now() >= deadline {
                warn!(
                    state = self.machine.state().name(),
                    ?timeout,
                    "exchange timed out"
                );
                self.end_exchange();
                return Err(ProtocolError::Timeout);
            }
            debug!(state = self.machine.state().name(), "waiting for device");
            thread::sleep(poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use msgproto_codec::frame::{encode_request_frame, parse_event_frame, parse_response_frame};
    use msgproto_codec::ids::{DeviceControlEventId, EventId};
    use msgproto_codec::payload::{ReportLedStatusRequest, Request, RequestPayload};
    use msgproto_transport::channel::{ChannelError, InMemoryChannel};

    use super::*;

    fn led_report(sequence_id: u16, led_on: bool) -> Vec<u8> {
        encode_request_frame(&Request {
            sequence_id,
            payload: RequestPayload::ReportLedStatus(ReportLedStatusRequest { led_on }),
        })
        .expect("report should encode")
    }

    #[test]
    fn start_subscribes_and_writes_event() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client.start_get_led().expect("get led should start");
        assert!(client.channel().is_subscribed());
        let written = client.channel_mut().take_outbound();
        assert_eq!(
            parse_event_frame(&written[0]).expect("event should parse"),
            EventId::DeviceControl(DeviceControlEventId::LedStatusNeeded)
        );
    }

    #[test]
    fn pump_answers_and_unsubscribes_when_idle() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client.start_get_led().expect("get led should start");
        client.channel_mut().take_outbound();

        assert!(client.channel_mut().deliver_inbound(led_report(4, true)));
        let notifications = client.pump().expect("pump should succeed");
        assert_eq!(notifications, vec![Notification::LedStatus { on: true }]);
        assert!(client.is_idle());
        assert!(!client.channel().is_subscribed());

        let ack = client.channel_mut().take_outbound();
        assert_eq!(
            parse_response_frame(&ack[0]).expect("ack should parse").sequence_id,
            4
        );
        assert!(!client.channel_mut().deliver_inbound(led_report(5, false)));
    }

    #[test]
    fn invalid_details_never_reach_the_channel() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        let err = client
            .start_add_network("net", SecurityType::Wpa2, Some("short"))
            .expect_err("short psk must fail");
        assert!(err.to_string().contains("between 8 and 63"));
        assert!(client.is_idle());
        assert!(client.channel_mut().take_outbound().is_empty());
    }

    #[test]
    fn failed_event_write_leaves_client_idle() {
        let mut channel = InMemoryChannel::default();
        channel.set_fail_writes(Some("link lost".to_string()));
        let mut client = ProtocolClient::new(channel, ClientConfig::default());
        let err = client.start_scan().expect_err("write failure must surface");
        assert_eq!(
            err,
            ProtocolError::Channel(ChannelError::WriteFailed("link lost".to_string()))
        );
        assert!(client.is_idle());
        assert!(!client.channel().is_subscribed());
    }

    #[test]
    fn run_until_idle_times_out_and_abandons() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client.start_wifi_status().expect("status should start");
        let err = client
            .run_until_idle(Duration::from_millis(30), Duration::from_millis(5))
            .expect_err("silent device must time out");
        assert_eq!(err, ProtocolError::Timeout);
        assert!(client.is_idle());
        assert!(!client.channel().is_subscribed());
    }

    #[test]
    fn listening_client_stays_subscribed_for_reports() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client
            .listen_for_led_reports()
            .expect("listening should subscribe");
        client.channel_mut().deliver_inbound(led_report(1, false));
        client.channel_mut().deliver_inbound(led_report(2, true));
        let notifications = client.pump().expect("pump should succeed");
        assert_eq!(
            notifications,
            vec![
                Notification::LedStatus { on: false },
                Notification::LedStatus { on: true }
            ]
        );
        assert!(client.channel().is_subscribed());
        assert_eq!(client.channel_mut().take_outbound().len(), 2);
    }

    #[test]
    fn stray_bytes_do_not_stop_led_listening() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client
            .listen_for_led_reports()
            .expect("listening should subscribe");

        assert!(client.channel_mut().deliver_inbound(vec![1, 2, 3]));
        assert!(client.pump().expect("garbage is dropped").is_empty());
        assert!(client.channel().is_subscribed());
        assert_eq!(client.machine().stats().frames_rejected, 1);

        assert!(client.channel_mut().deliver_inbound(led_report(9, true)));
        assert_eq!(
            client.pump().expect("pump should succeed"),
            vec![Notification::LedStatus { on: true }]
        );
    }

    #[test]
    fn failed_exchanges_keep_led_listening() {
        let mut client = ProtocolClient::new(InMemoryChannel::default(), ClientConfig::default());
        client
            .listen_for_led_reports()
            .expect("listening should subscribe");

        client
            .channel_mut()
            .set_fail_writes(Some("link lost".to_string()));
        client.start_scan().expect_err("write failure must surface");
        assert!(client.is_idle());
        assert!(client.channel().is_subscribed());

        client.channel_mut().set_fail_writes(None);
        client.start_wifi_status().expect("status should start");
        let err = client
            .run_until_idle(Duration::from_millis(20), Duration::from_millis(5))
            .expect_err("silent device must time out");
        assert_eq!(err, ProtocolError::Timeout);
        assert!(client.channel().is_subscribed());

        client.channel_mut().deliver_inbound(led_report(3, false));
        assert_eq!(
            client.pump().expect("pump should succeed"),
            vec![Notification::LedStatus { on: false }]
        );

        client.abandon();
        assert!(!client.channel().is_subscribed());
    }
}
