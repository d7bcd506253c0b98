#![cfg(feature = "metrics")]
//! Tests for `quicframe` metrics.
//!
//! These tests verify that counters and gauges update as expected using
//! `metrics_util::debugging::DebuggingRecorder`.
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use quicframe::metrics::{
    Direction,
    PACKETS_PROCESSED,
    SESSIONS_ACTIVE,
    STREAM_ERRORS,
    WRITE_ERRORS,
    WRITES_BLOCKED,
};
use quicframe_testing::TestFrame;
use rstest::rstest;

use crate::common::{Harness, harness, peer, post};

mod common;

/// Creates a debugging recorder and snapshotter for metrics testing.
fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

fn counter(snapshotter: &Snapshotter, name: &str, direction: Option<&str>) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && direction.is_none_or(|expected| {
                    key.key()
                        .labels()
                        .any(|label| label.key() == "direction" && label.value() == expected)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(count) => count,
            _ => 0,
        })
        .sum()
}

fn gauge(snapshotter: &Snapshotter, name: &str) -> Option<f64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .find_map(|(key, _, _, value)| match value {
            DebugValue::Gauge(level) if key.key().name() == name => Some(level.into_inner()),
            _ => None,
        })
}

#[rstest]
#[case(Direction::Inbound, "inbound")]
#[case(Direction::Outbound, "outbound")]
fn packet_metric_is_labelled_by_direction(#[case] direction: Direction, #[case] label: &str) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        quicframe::metrics::inc_packets(direction);
    });

    assert_eq!(counter(&snapshotter, PACKETS_PROCESSED, Some(label)), 1);
}

#[rstest]
fn dispatch_counts_packets_in_both_directions(mut harness: Harness) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        harness.send(&peer(1), &[TestFrame::Ping]);
        harness.send(&peer(1), &[TestFrame::Ping]);
    });

    assert_eq!(counter(&snapshotter, PACKETS_PROCESSED, Some("inbound")), 2);
    assert_eq!(counter(&snapshotter, PACKETS_PROCESSED, Some("outbound")), 2);
}

#[rstest]
fn active_sessions_gauge_follows_the_table(mut harness: Harness) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        harness.send(&peer(1), &[TestFrame::Ping]);
        harness.send(&peer(2), &[TestFrame::Ping]);
        harness.send(&peer(1), &[TestFrame::Close {
            reason: "done".to_owned(),
        }]);
    });

    let level = gauge(&snapshotter, SESSIONS_ACTIVE).expect("gauge recorded");
    assert!((level - 1.0).abs() < f64::EPSILON, "expected one live session, got {level}");
}

#[rstest]
fn backpressure_and_failures_are_counted(mut harness: Harness) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        harness.sink.block_next();
        harness.send(&peer(1), &[TestFrame::Ping]);
        let _ = harness.dispatcher.on_write_complete(-32);
    });

    assert_eq!(counter(&snapshotter, WRITES_BLOCKED, None), 1);
    assert_eq!(counter(&snapshotter, WRITE_ERRORS, None), 1);
}

#[rstest]
fn malformed_requests_are_counted(mut harness: Harness) {
    let (snapshotter, recorder) = debugging_recorder_setup();
    metrics::with_local_recorder(&recorder, || {
        harness.request(&peer(1), 0, &post(Some("1")), b"too long");
    });

    assert_eq!(counter(&snapshotter, STREAM_ERRORS, None), 1);
}

#[rstest]
fn prometheus_exporter_renders_session_gauge(mut harness: Harness) {
    let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || {
        harness.send(&peer(1), &[TestFrame::Ping]);
    });

    handle.run_upkeep();
    let output = handle.render();
    assert!(output.contains(SESSIONS_ACTIVE), "{output}");
    assert!(output.contains(PACKETS_PROCESSED), "{output}");
}
