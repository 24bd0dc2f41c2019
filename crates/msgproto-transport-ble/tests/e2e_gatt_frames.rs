use msgproto_codec::frame::{create_event_message, encode_request_frame, parse_request_frame};
use msgproto_codec::ids::{DeviceControlEventId, EventId};
use msgproto_codec::payload::{ReportLedStatusRequest, Request, RequestPayload};
use msgproto_transport::channel::NotificationChannel;
use msgproto_transport_ble::{GattChannel, MockGattLink};

#[test]
fn protocol_frames_cross_the_gatt_channel_unchanged() {
    let mut channel = GattChannel::new(MockGattLink::default());
    channel.subscribe().expect("subscribe should succeed");

    let event = create_event_message(EventId::DeviceControl(
        DeviceControlEventId::LedStatusNeeded,
    ))
    .expect("event should encode");
    channel.write(&event).expect("event write should succeed");
    assert_eq!(channel.link_mut().take_outbound(), vec![event]);

    let request = Request {
        sequence_id: 12,
        payload: RequestPayload::ReportLedStatus(ReportLedStatusRequest { led_on: false }),
    };
    let frame = encode_request_frame(&request).expect("request should encode");
    channel.link_mut().enqueue_inbound(frame);

    let inbound = channel
        .poll_notification()
        .expect("notification should be delivered");
    assert_eq!(
        parse_request_frame(&inbound).expect("request should parse"),
        request
    );

    let health = channel.health_snapshot();
    assert_eq!(health.frames_written, 1);
    assert_eq!(health.notifications_received, 1);
}

#[test]
fn notifications_after_unsubscribe_are_dropped() {
    let mut channel = GattChannel::new(MockGattLink::default());
    channel.subscribe().expect("subscribe should succeed");
    channel.unsubscribe().expect("unsubscribe should succeed");

    channel.link_mut().enqueue_inbound(vec![0x22, 0xB5, 0x58, 0xB9]);
    channel.link_mut().enqueue_inbound(vec![0x22, 0xB5, 0x58, 0xB9]);
    assert!(channel.poll_notification().is_none());
    assert_eq!(channel.health_snapshot().notifications_dropped, 2);
}
