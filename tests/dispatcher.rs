//! Routing and session lifecycle through `PacketDispatcher`.

use std::time::Duration;

use quicframe::{ConnectionId, DispatcherConfig};
use quicframe_testing::{LoggerHandle, LoopbackFactory, Reply, TestFrame, logger};
use rstest::rstest;
use serial_test::serial;

use crate::common::{Harness, harness, local, peer};

mod common;

#[rstest]
fn datagrams_from_one_peer_share_a_session(mut harness: Harness) {
    harness.send(&peer(1), &[TestFrame::Ping]);
    harness.send(&peer(1), &[TestFrame::Ping]);
    assert_eq!(harness.dispatcher.session_count(), 1);

    harness.send(&peer(2), &[TestFrame::Ping]);
    assert_eq!(harness.dispatcher.session_count(), 2);

    let first = harness.dispatcher.session_for(&local(), &peer(1));
    let second = harness.dispatcher.session_for(&local(), &peer(2));
    assert!(first.is_some());
    assert_ne!(first, second);
    assert_eq!(harness.frames_to(&peer(1)), vec![TestFrame::Ping, TestFrame::Ping]);
}

#[rstest]
fn transports_see_server_defaults(mut harness: Harness) {
    harness.send(&peer(1), &[TestFrame::Ping]);

    let contexts = harness.transports.contexts();
    assert_eq!(contexts.len(), 1);
    let context = &contexts[0];
    assert_eq!(context.config.initial_stream_flow_control_window, 64 * 1024);
    assert_eq!(context.config.initial_session_flow_control_window, 1024 * 1024);
    assert_eq!(context.max_packet_size, 1350);
    assert_eq!(context.endpoints.peer, peer(1));
    assert_eq!(harness.dispatcher.max_packet_size(&peer(1)), 1350);
}

#[test]
fn caller_windows_survive_server_defaults() {
    let config = DispatcherConfig {
        initial_stream_flow_control_window: 32 * 1024,
        ..DispatcherConfig::default()
    };
    let harness = Harness::with(config, LoopbackFactory::default(), Reply::Echo);
    let effective = harness.dispatcher.config();
    assert_eq!(effective.initial_stream_flow_control_window, 32 * 1024);
    assert_eq!(effective.initial_session_flow_control_window, 1024 * 1024);
}

#[rstest]
#[case::empty(Vec::new())]
#[case::garbage(vec![0xff, 0xff, 0xff, 0xff, 0xff])]
fn unusable_initial_datagrams_open_no_session(mut harness: Harness, #[case] datagram: Vec<u8>) {
    harness.dispatcher.dispatch(&local(), &peer(1), &datagram);
    assert_eq!(harness.dispatcher.session_count(), 0);
    assert!(harness.transports.contexts().is_empty());
}

#[rstest]
fn known_connection_id_follows_the_peer(mut harness: Harness) {
    harness.send(&peer(1), &[TestFrame::ConnectionId(0xabc), TestFrame::Ping]);
    let id = harness
        .dispatcher
        .session_for(&local(), &peer(1))
        .expect("session for first peer");
    let info = harness.dispatcher.session_info(id).expect("session info");
    assert_eq!(info.connection_id, Some(ConnectionId::from(0xabc)));

    harness.send(&peer(9), &[TestFrame::ConnectionId(0xabc), TestFrame::Ping]);

    assert_eq!(harness.dispatcher.session_count(), 1);
    assert_eq!(harness.dispatcher.session_for(&local(), &peer(9)), Some(id));
    assert_eq!(harness.dispatcher.session_for(&local(), &peer(1)), None);
    assert_eq!(
        harness
            .dispatcher
            .sessions()
            .session_for_connection_id(ConnectionId::from(0xabc)),
        Some(id)
    );
    assert_eq!(harness.frames_to(&peer(9)), vec![TestFrame::Ping]);
}

#[rstest]
#[serial(logging)]
fn connection_id_reused_by_another_peer_keeps_both_sessions(
    mut harness: Harness,
    mut logger: LoggerHandle,
) {
    harness.send(&peer(1), &[TestFrame::ConnectionId(0xabc)]);
    harness.send(&peer(2), &[TestFrame::Ping]);
    let first = harness.dispatcher.session_for(&local(), &peer(1));
    let second = harness.dispatcher.session_for(&local(), &peer(2));

    harness.send(&peer(2), &[TestFrame::ConnectionId(0xabc), TestFrame::Ping]);

    assert_eq!(harness.dispatcher.session_count(), 2);
    assert_eq!(harness.dispatcher.session_for(&local(), &peer(1)), first);
    assert_eq!(harness.dispatcher.session_for(&local(), &peer(2)), second);
    assert_eq!(
        harness
            .dispatcher
            .sessions()
            .session_for_connection_id(ConnectionId::from(0xabc)),
        first
    );
    assert_eq!(harness.frames_to(&peer(2)), vec![TestFrame::Ping, TestFrame::Ping]);
    assert!(logger.contains("connection id already in use"));
}

#[rstest]
fn closed_connections_are_reaped(mut harness: Harness) {
    harness.send(&peer(1), &[TestFrame::Ping]);
    harness.send(&peer(1), &[TestFrame::Close {
        reason: "done".to_owned(),
    }]);
    assert_eq!(harness.dispatcher.session_count(), 0);

    harness.send(&peer(1), &[TestFrame::Ping]);
    assert_eq!(harness.dispatcher.session_count(), 1);
    assert_eq!(harness.transports.contexts().len(), 2);
}

#[test]
fn idle_sessions_time_out_through_alarms() {
    let transports = LoopbackFactory::default().with_idle_timeout(Duration::from_secs(30));
    let mut harness = Harness::with(DispatcherConfig::default(), transports, Reply::Echo);
    assert_eq!(harness.dispatcher.next_alarm(), None);

    harness.send(&peer(1), &[TestFrame::Ping]);
    harness.clock.advance(Duration::from_secs(10));
    harness.send(&peer(2), &[TestFrame::Ping]);

    let first_deadline = harness.dispatcher.next_alarm().expect("alarm armed");
    assert_eq!(first_deadline, harness.dispatcher.now() + Duration::from_secs(20));

    harness.clock.advance(Duration::from_secs(20));
    harness.dispatcher.fire_alarms(harness.dispatcher.now());
    assert_eq!(harness.dispatcher.session_count(), 1);
    assert!(harness.dispatcher.session_for(&local(), &peer(2)).is_some());

    harness.clock.advance(Duration::from_secs(10));
    harness.dispatcher.fire_alarms(harness.dispatcher.now());
    assert_eq!(harness.dispatcher.session_count(), 0);
    assert_eq!(harness.dispatcher.next_alarm(), None);
}

#[test]
fn early_alarms_are_not_delivered() {
    let transports = LoopbackFactory::default().with_idle_timeout(Duration::from_secs(5));
    let mut harness = Harness::with(DispatcherConfig::default(), transports, Reply::Echo);
    harness.send(&peer(1), &[TestFrame::Ping]);

    harness.clock.advance(Duration::from_secs(4));
    harness.dispatcher.fire_alarms(harness.dispatcher.now());
    assert_eq!(harness.dispatcher.session_count(), 1);
}
