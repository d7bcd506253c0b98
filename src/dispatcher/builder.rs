//! Builder for [`PacketDispatcher`].

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use super::PacketDispatcher;
use crate::{
    config::{ConfigError, DispatcherConfig},
    headers::{HeaderBlockDecoder, LengthPrefixedDecoder},
    helper::{Clock, ConnectionHelper, RandomSource, StdRandom, SystemClock},
    processor::ProcessorFactory,
    session::{SessionResources, SessionTable},
    transport::TransportFactory,
    writer::{DatagramSink, WriteBridge},
};

/// Collects a dispatcher's collaborators before construction.
///
/// The sink, transport factory and processor factory are required. The
/// header decoder defaults to [`LengthPrefixedDecoder`], the clock to the
/// system clock and the random source to an entropy-seeded generator.
pub struct DispatcherBuilder<S> {
    sink: S,
    transports: Box<dyn TransportFactory>,
    processors: Rc<dyn ProcessorFactory>,
    decoder: Rc<dyn HeaderBlockDecoder>,
    config: DispatcherConfig,
    clock: Option<Box<dyn Clock>>,
    random: Option<Box<dyn RandomSource>>,
}

impl<S: DatagramSink> DispatcherBuilder<S> {
    pub(super) fn new(
        sink: S,
        transports: impl TransportFactory + 'static,
        processors: impl ProcessorFactory + 'static,
    ) -> Self {
        Self {
            sink,
            transports: Box::new(transports),
            processors: Rc::new(processors),
            decoder: Rc::new(LengthPrefixedDecoder),
            config: DispatcherConfig::default(),
            clock: None,
            random: None,
        }
    }

    /// Use `config` for every session.
    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Decode header blocks with `decoder`.
    #[must_use]
    pub fn decoder(mut self, decoder: impl HeaderBlockDecoder + 'static) -> Self {
        self.decoder = Rc::new(decoder);
        self
    }

    /// Read time from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Draw random values from `random`.
    #[must_use]
    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Some(Box::new(random));
        self
    }

    /// Apply server defaults to the configuration, validate it and build the
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration is invalid.
    pub fn build(self) -> Result<PacketDispatcher<S>, ConfigError> {
        let mut config = self.config;
        config.apply_server_defaults();
        config.validate()?;

        let helper = ConnectionHelper::new(
            self.clock.unwrap_or_else(|| Box::new(SystemClock)),
            self.random
                .unwrap_or_else(|| Box::new(StdRandom::from_entropy())),
        );
        let writer = WriteBridge::with_max_packet_size(self.sink, config.max_packet_size);

        Ok(PacketDispatcher {
            sessions: SessionTable::new(),
            write_blocked: VecDeque::new(),
            transports: self.transports,
            resources: SessionResources {
                writer: Rc::new(RefCell::new(writer)),
                processors: self.processors,
                decoder: self.decoder,
                helper: Rc::new(helper),
            },
            config,
        })
    }
}
