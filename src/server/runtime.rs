//! Receive loop for [`DatagramServer`].

use std::future::Future;

use futures::future::OptionFuture;
use log::{error, warn};
use tokio::{select, signal, time};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span};

use super::{DatagramServer, ServerError, UdpSink};
use crate::{dispatcher::PacketDispatcher, endpoint::Endpoint};

impl DatagramServer {
    /// Serve until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// Never fails at present; receive errors are retried with back-off.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Never fails at present; receive errors are retried with back-off.
    pub async fn run_until_cancelled(&mut self, token: CancellationToken) -> Result<(), ServerError> {
        self.run_with_shutdown(token.cancelled_owned()).await
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Each iteration waits for, in priority order: shutdown, writability
    /// of the socket while a datagram is buffered in the sink, the earliest
    /// transport alarm, and the next inbound datagram.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quicframe::server::{DatagramServer, ServerError};
    /// # use quicframe::{dispatcher::PacketDispatcher, server::UdpSink, config::ConfigError};
    /// # fn build(_sink: UdpSink) -> Result<PacketDispatcher<UdpSink>, ConfigError> { unimplemented!() }
    ///
    /// # async fn serve() -> Result<(), ServerError> {
    /// let mut server = DatagramServer::bind(([127, 0, 0, 1], 4433).into(), build).await?;
    /// let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    /// # drop(tx);
    /// server
    ///     .run_with_shutdown(async {
    ///         let _ = rx.await;
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Never fails at present; receive errors are retried with back-off.
    pub async fn run_with_shutdown<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let span = info_span!("datagram_server", local = %self.local);
        self.serve(shutdown).instrument(span).await
    }

    #[expect(
        clippy::integer_division_remainder_used,
        reason = "tokio::select! expands to modulus internally"
    )]
    async fn serve<F>(&mut self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("server listening");
        let local = self.local;
        let mut buf = vec![0_u8; self.recv_buffer_size];
        let mut delay = self.backoff.initial_delay;
        tokio::pin!(shutdown);

        loop {
            let alarm: OptionFuture<_> = self
                .dispatcher
                .next_alarm()
                .map(|deadline| time::sleep_until(time::Instant::from_std(deadline)))
                .into();
            let write_pending = self.dispatcher.writer().borrow().sink().has_pending();

            select! {
                biased;

                () = &mut shutdown => break,

                ready = self.socket.writable(), if write_pending => match ready {
                    Ok(()) => retry_buffered_write(&mut self.dispatcher),
                    Err(e) => warn!("socket writability check failed: error={e}"),
                },

                Some(()) = alarm => {
                    let now = self.dispatcher.now();
                    self.dispatcher.fire_alarms(now);
                }

                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) => {
                        delay = self.backoff.initial_delay;
                        self.dispatcher.dispatch(&local, &Endpoint::from(peer), &buf[..len]);
                    }
                    Err(e) => {
                        warn!("receive failed: error={e}, retry_in={delay:?}");
                        time::sleep(delay).await;
                        delay = self.backoff.next_delay(delay);
                    }
                },
            }
        }

        info!(sessions = self.dispatcher.session_count(), "server shut down");
        Ok(())
    }
}

/// Hand the sink's buffered datagram to the socket and report the outcome.
fn retry_buffered_write(dispatcher: &mut PacketDispatcher<UdpSink>) {
    let status = dispatcher.writer().borrow_mut().sink_mut().flush_pending();
    if let Some(rv) = status
        && let Err(e) = dispatcher.on_write_complete(rv)
    {
        error!("write completion rejected: error={e}");
    }
}
