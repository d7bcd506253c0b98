//! Per-stream reassembly of body bytes.
//!
//! Stream frames may arrive out of order, duplicated or overlapping. The
//! [`StreamSequencer`] buffers them by offset and exposes the contiguous
//! prefix that has not been consumed yet as a borrowed region. Readers
//! consume the region explicitly so buffered frames can be released.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

/// Read side of a stream's byte sequence.
pub trait ByteSource {
    /// Next contiguous unread region, if any bytes are available.
    fn readable_region(&self) -> Option<&[u8]>;

    /// Mark `len` bytes at the front of the readable region as consumed.
    fn mark_consumed(&mut self, len: usize);

    /// Returns `true` once every byte up to and including the fin has been
    /// consumed.
    fn is_closed(&self) -> bool;

    /// Ask to be notified when more data or the fin arrives.
    fn set_unblocked(&mut self);
}

/// Framing violations detected while sequencing stream data.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SequencerError {
    /// A second fin disagreed with the final size fixed by the first.
    #[error("fin at offset {offset} conflicts with final size {previous}")]
    InconsistentFin {
        /// Final size set by the earlier fin.
        previous: u64,
        /// Final size implied by the new fin.
        offset: u64,
    },
    /// Data extended beyond the final size of the stream.
    #[error("data up to offset {offset} extends beyond final size {final_size}")]
    DataBeyondFin {
        /// Final size of the stream.
        final_size: u64,
        /// End offset of the offending data.
        offset: u64,
    },
    /// Data exceeded the receive window.
    #[error("data up to offset {offset} exceeds flow control limit {limit}")]
    FlowControlViolation {
        /// Highest offset the window allowed.
        limit: u64,
        /// End offset of the offending data.
        offset: u64,
    },
}

/// Offset-ordered buffer of inbound stream data.
#[derive(Debug)]
pub struct StreamSequencer {
    frames: BTreeMap<u64, Bytes>,
    consumed: u64,
    highest_received: u64,
    final_size: Option<u64>,
    window: u64,
    reader_waiting: bool,
}

impl StreamSequencer {
    /// Create a sequencer that accepts at most `window` unconsumed bytes.
    #[must_use]
    pub fn new(window: u64) -> Self {
        Self {
            frames: BTreeMap::new(),
            consumed: 0,
            highest_received: 0,
            final_size: None,
            window,
            reader_waiting: true,
        }
    }

    /// Buffer a stream frame.
    ///
    /// Returns `true` when the reader asked to be woken and the frame made
    /// new data or the end of the stream available.
    ///
    /// # Errors
    ///
    /// Returns a [`SequencerError`] if the frame conflicts with the known
    /// final size or exceeds the receive window. Nothing is buffered in that
    /// case.
    pub fn on_frame(&mut self, offset: u64, data: Bytes, fin: bool) -> Result<bool, SequencerError> {
        let end = offset.saturating_add(data.len() as u64);
        self.check_frame(end, fin)?;

        if fin {
            self.final_size = Some(end);
        }
        self.highest_received = self.highest_received.max(end);
        self.buffer(offset, data);

        let notify = self.reader_waiting && (self.readable_region().is_some() || self.is_closed());
        if notify {
            self.reader_waiting = false;
        }
        Ok(notify)
    }

    fn check_frame(&self, end: u64, fin: bool) -> Result<(), SequencerError> {
        match (self.final_size, fin) {
            (Some(previous), true) if previous != end => {
                return Err(SequencerError::InconsistentFin {
                    previous,
                    offset: end,
                });
            }
            (Some(final_size), false) if end > final_size => {
                return Err(SequencerError::DataBeyondFin {
                    final_size,
                    offset: end,
                });
            }
            (None, true) if end < self.highest_received => {
                return Err(SequencerError::DataBeyondFin {
                    final_size: end,
                    offset: self.highest_received,
                });
            }
            _ => {}
        }

        let limit = self.consumed.saturating_add(self.window);
        if end > limit {
            return Err(SequencerError::FlowControlViolation { limit, offset: end });
        }
        Ok(())
    }

    fn buffer(&mut self, offset: u64, data: Bytes) {
        let end = offset.saturating_add(data.len() as u64);
        if end <= self.consumed {
            return;
        }
        let (offset, data) = if offset < self.consumed {
            let skip = usize::try_from(self.consumed - offset).unwrap_or(data.len());
            (self.consumed, data.slice(skip..))
        } else {
            (offset, data)
        };
        if data.is_empty() {
            return;
        }
        match self.frames.get(&offset) {
            Some(existing) if existing.len() >= data.len() => {}
            _ => {
                self.frames.insert(offset, data);
            }
        }
    }

    /// Returns `true` if unread bytes are available.
    #[must_use]
    pub fn has_bytes_to_read(&self) -> bool { self.readable_region().is_some() }

    /// Total bytes consumed so far.
    #[must_use]
    pub fn consumed(&self) -> u64 { self.consumed }

    /// Final size once a fin was received.
    #[must_use]
    pub fn final_size(&self) -> Option<u64> { self.final_size }

    /// Bytes currently buffered but not consumed.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize { self.frames.values().map(Bytes::len).sum() }
}

impl ByteSource for StreamSequencer {
    fn readable_region(&self) -> Option<&[u8]> {
        let (start, data) = self.frames.range(..=self.consumed).next_back()?;
        let skip = usize::try_from(self.consumed - start).ok()?;
        data.get(skip..).filter(|region| !region.is_empty())
    }

    fn mark_consumed(&mut self, len: usize) {
        self.consumed = self.consumed.saturating_add(len as u64);
        let consumed = self.consumed;
        self.frames
            .retain(|start, data| start.saturating_add(data.len() as u64) > consumed);
    }

    fn is_closed(&self) -> bool { self.final_size == Some(self.consumed) }

    fn set_unblocked(&mut self) { self.reader_waiting = true; }
}
