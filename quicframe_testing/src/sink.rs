//! A datagram sink that records writes and replays scripted statuses.

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use quicframe::{
    Endpoint,
    writer::{DatagramSink, SinkStatus},
};

#[derive(Debug, Default)]
struct SinkState {
    statuses: VecDeque<SinkStatus>,
    sent: Vec<(Endpoint, Vec<u8>)>,
}

/// Sink recording every datagram handed to it.
///
/// Each send consumes the next scripted status; with none scripted the
/// datagram is reported as fully sent. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink(Rc<RefCell<SinkState>>);

impl RecordingSink {
    /// Answer the next send with `status`.
    pub fn push_status(&self, status: SinkStatus) {
        self.0.borrow_mut().statuses.push_back(status);
    }

    /// Answer the next send with the pending status.
    pub fn block_next(&self) { self.push_status(SinkStatus::Pending); }

    /// Every datagram handed to the sink, including those reported pending
    /// or failed.
    #[must_use]
    pub fn sent(&self) -> Vec<(Endpoint, Vec<u8>)> { self.0.borrow().sent.clone() }

    /// Datagrams sent to `peer`, in order.
    #[must_use]
    pub fn sent_to(&self, peer: &Endpoint) -> Vec<Vec<u8>> {
        self.0
            .borrow()
            .sent
            .iter()
            .filter(|(destination, _)| destination == peer)
            .map(|(_, datagram)| datagram.clone())
            .collect()
    }
}

impl DatagramSink for RecordingSink {
    fn send(&mut self, destination: &Endpoint, datagram: &[u8]) -> SinkStatus {
        let mut state = self.0.borrow_mut();
        state.sent.push((*destination, datagram.to_vec()));
        state
            .statuses
            .pop_front()
            .unwrap_or(SinkStatus::Sent(datagram.len()))
    }
}
