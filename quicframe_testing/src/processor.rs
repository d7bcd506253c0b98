//! Request processors that record their callbacks.

use std::{cell::RefCell, rc::Rc};

use quicframe::{
    RequestProcessor,
    SessionId,
    SessionInfo,
    StreamId,
    StreamResponder,
    headers::Headers,
};

/// One processor callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorEvent {
    /// `on_header(name, value)`.
    Header {
        /// Session owning the stream.
        session: SessionId,
        /// Stream id.
        stream_id: StreamId,
        /// Header name.
        name: String,
        /// Header value.
        value: String,
    },
    /// `process_data(body)`.
    Body {
        /// Session owning the stream.
        session: SessionId,
        /// Stream id.
        stream_id: StreamId,
        /// Complete request body.
        body: Vec<u8>,
    },
    /// `on_fin`.
    Fin {
        /// Session owning the stream.
        session: SessionId,
        /// Stream id.
        stream_id: StreamId,
    },
    /// `on_close`.
    Close {
        /// Session owning the stream.
        session: SessionId,
        /// Stream id.
        stream_id: StreamId,
    },
}

/// Shared, ordered log of processor callbacks.
#[derive(Clone, Debug, Default)]
pub struct ProcessorLog(Rc<RefCell<Vec<ProcessorEvent>>>);

impl ProcessorLog {
    /// All callbacks so far.
    #[must_use]
    pub fn events(&self) -> Vec<ProcessorEvent> { self.0.borrow().clone() }

    /// Headers delivered to `stream_id`, in order.
    #[must_use]
    pub fn headers(&self, stream_id: StreamId) -> Vec<(String, String)> {
        self.0
            .borrow()
            .iter()
            .filter_map(|event| match event {
                ProcessorEvent::Header {
                    stream_id: id,
                    name,
                    value,
                    ..
                } if *id == stream_id => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    /// Number of `on_close` calls for `stream_id`.
    #[must_use]
    pub fn close_count(&self, stream_id: StreamId) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|event| {
                matches!(event, ProcessorEvent::Close { stream_id: id, .. } if *id == stream_id)
            })
            .count()
    }

    /// Returns `true` if `on_fin` ran for `stream_id`.
    #[must_use]
    pub fn finished(&self, stream_id: StreamId) -> bool {
        self.0.borrow().iter().any(
            |event| matches!(event, ProcessorEvent::Fin { stream_id: id, .. } if *id == stream_id),
        )
    }

    fn push(&self, event: ProcessorEvent) { self.0.borrow_mut().push(event); }
}

/// How a [`RecordingProcessor`] answers a completed request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reply {
    /// Answer `:status 200` and echo the request body.
    #[default]
    Echo,
    /// Send nothing; the test answers later through the dispatcher.
    Deferred,
}

/// Processor logging every callback and answering per its [`Reply`].
pub struct RecordingProcessor {
    session: SessionId,
    stream_id: StreamId,
    log: ProcessorLog,
    reply: Reply,
    body: Vec<u8>,
}

impl RecordingProcessor {
    /// Processor for one stream.
    #[must_use]
    pub fn new(session: &SessionInfo, stream_id: StreamId, log: ProcessorLog, reply: Reply) -> Self {
        Self {
            session: session.id,
            stream_id,
            log,
            reply,
            body: Vec::new(),
        }
    }

    /// Factory creating echoing processors that record into `log`.
    pub fn factory(log: ProcessorLog) -> impl Fn(&SessionInfo, StreamId) -> Box<dyn RequestProcessor> {
        Self::factory_with(log, Reply::Echo)
    }

    /// Factory creating processors that record into `log` and answer per
    /// `reply`.
    pub fn factory_with(
        log: ProcessorLog,
        reply: Reply,
    ) -> impl Fn(&SessionInfo, StreamId) -> Box<dyn RequestProcessor> {
        move |session: &SessionInfo, stream_id: StreamId| -> Box<dyn RequestProcessor> {
            Box::new(Self::new(session, stream_id, log.clone(), reply))
        }
    }
}

impl RequestProcessor for RecordingProcessor {
    fn on_header(&mut self, name: &str, value: &str) {
        self.log.push(ProcessorEvent::Header {
            session: self.session,
            stream_id: self.stream_id,
            name: name.to_owned(),
            value: value.to_owned(),
        });
    }

    fn process_data(&mut self, body: &[u8]) {
        self.body = body.to_vec();
        self.log.push(ProcessorEvent::Body {
            session: self.session,
            stream_id: self.stream_id,
            body: body.to_vec(),
        });
    }

    fn on_fin(&mut self, responder: &mut StreamResponder<'_>) {
        self.log.push(ProcessorEvent::Fin {
            session: self.session,
            stream_id: self.stream_id,
        });
        if self.reply == Reply::Deferred {
            return;
        }
        let headers: Headers = [(":status", "200")].into_iter().collect();
        responder.write_headers(&headers, self.body.is_empty());
        if !self.body.is_empty() {
            responder.write_or_buffer_body(&self.body, true);
        }
    }

    fn on_close(&mut self) {
        self.log.push(ProcessorEvent::Close {
            session: self.session,
            stream_id: self.stream_id,
        });
    }
}
