//! Write backpressure shared by every session of one dispatcher.

use quicframe::{
    WriteResult,
    writer::{ERR_IO_PENDING, SinkStatus, WriteBridgeError},
};
use quicframe_testing::{LoggerHandle, TestFrame, logger};
use rstest::rstest;
use serial_test::serial;

use crate::common::{Harness, harness, local, peer};

mod common;

#[rstest]
fn one_blocked_write_stalls_every_session(mut harness: Harness) {
    harness.sink.block_next();
    harness.send(&peer(1), &[TestFrame::Ping]);
    assert!(harness.dispatcher.is_write_blocked());

    harness.send(&peer(2), &[TestFrame::Ping]);
    harness.send(&peer(3), &[TestFrame::Ping]);

    assert_eq!(harness.sink.sent().len(), 1);
    let blocked: Vec<_> = [1, 2, 3]
        .into_iter()
        .filter_map(|n| harness.dispatcher.session_for(&local(), &peer(n)))
        .collect();
    assert_eq!(harness.dispatcher.write_blocked_sessions(), blocked);
}

#[rstest]
fn completion_resumes_sessions_in_blocking_order(mut harness: Harness) {
    harness.sink.block_next();
    harness.send(&peer(1), &[TestFrame::Ping]);
    harness.send(&peer(3), &[TestFrame::Ping]);
    harness.send(&peer(2), &[TestFrame::Ping]);

    let datagram_len = harness.sink.sent()[0].1.len();
    let result = harness
        .dispatcher
        .on_write_complete(i64::try_from(datagram_len).expect("small datagram"))
        .expect("a write was pending");

    assert_eq!(result, WriteResult::Ok(datagram_len));
    assert!(!harness.dispatcher.is_write_blocked());
    assert!(harness.dispatcher.write_blocked_sessions().is_empty());
    let order: Vec<_> = harness.sink.sent().into_iter().map(|(to, _)| to).collect();
    assert_eq!(order, vec![peer(1), peer(3), peer(2)]);
}

#[rstest]
fn resumed_session_that_blocks_again_keeps_the_rest_waiting(mut harness: Harness) {
    harness.sink.block_next();
    harness.send(&peer(1), &[TestFrame::Ping]);
    harness.send(&peer(2), &[TestFrame::Ping]);
    harness.send(&peer(3), &[TestFrame::Ping]);

    harness.sink.block_next();
    harness
        .dispatcher
        .on_write_complete(0)
        .expect("a write was pending");

    assert!(harness.dispatcher.is_write_blocked());
    let third = harness.dispatcher.session_for(&local(), &peer(3));
    let second = harness.dispatcher.session_for(&local(), &peer(2));
    assert_eq!(
        harness.dispatcher.write_blocked_sessions(),
        [third, second].into_iter().flatten().collect::<Vec<_>>()
    );
    assert_eq!(harness.sink.sent_to(&peer(2)).len(), 1);
    assert!(harness.sink.sent_to(&peer(3)).is_empty());
}

#[rstest]
fn failed_completion_reaches_the_transport(mut harness: Harness) {
    harness.sink.block_next();
    harness.send(&peer(1), &[TestFrame::Ping]);

    let result = harness
        .dispatcher
        .on_write_complete(-111)
        .expect("a write was pending");

    assert_eq!(result, WriteResult::Error(-111));
    assert_eq!(harness.transports.write_errors(), vec![-111]);
}

#[rstest]
fn immediate_failure_does_not_block(mut harness: Harness) {
    harness.sink.push_status(SinkStatus::Failed(-13));
    harness.send(&peer(1), &[TestFrame::Ping]);

    assert!(!harness.dispatcher.is_write_blocked());
    assert!(harness.dispatcher.write_blocked_sessions().is_empty());
    assert_eq!(harness.transports.write_errors(), vec![-13]);

    harness.send(&peer(1), &[TestFrame::Ping]);
    assert_eq!(harness.sink.sent_to(&peer(1)).len(), 2);
}

#[rstest]
#[serial(logging)]
fn completion_without_pending_write_is_rejected(mut harness: Harness, mut logger: LoggerHandle) {
    let err = harness
        .dispatcher
        .on_write_complete(5)
        .expect_err("no write was pending");

    assert_eq!(err, WriteBridgeError::NoPendingWrite);
    assert!(logger.contains("no pending write"));
}

#[rstest]
fn pending_sentinel_on_completion_keeps_the_write_outstanding(mut harness: Harness) {
    harness.sink.block_next();
    harness.send(&peer(1), &[TestFrame::Ping]);

    let err = harness
        .dispatcher
        .on_write_complete(ERR_IO_PENDING)
        .expect_err("pending is not a completion");

    assert_eq!(err, WriteBridgeError::PendingStatusOnCompletion);
    assert!(harness.dispatcher.is_write_blocked());
    assert_eq!(harness.dispatcher.write_blocked_sessions().len(), 1);
}
