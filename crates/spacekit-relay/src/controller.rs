//! Reconnect controller: keeps one control channel to the service alive.
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ... -> Closed
//! ```
//!
//! A successful connect resets the backoff. Every drop or failed dial waits
//! for the next backoff delay before dialing again. [`ControllerHandle::close`]
//! ends the loop from any state.

use std::sync::Arc;

use async_trait::async_trait;
use spacekit_metrics::{record_error, record_reconnect};
use spacekit_transport::{BoxedStream, ChannelConfig, CloseCode, ControlChannel, TunnelOpener};
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backoff::FibonacciBackoff;
use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal; the controller will not dial again.
    Closed,
}

/// Establishes an authenticated control-channel transport.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self) -> Result<WebSocketStream<BoxedStream>, RelayError>;
}

#[derive(Debug, Clone)]
pub struct ControllerHandle {
    state: watch::Receiver<LinkState>,
    shutdown: CancellationToken,
}

impl ControllerHandle {
    /// Stop reconnecting and close the current channel. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }
}

pub struct ReconnectController {
    dialer: Arc<dyn Dialer>,
    opener: Arc<dyn TunnelOpener>,
    channel: ChannelConfig,
    backoff: FibonacciBackoff,
    state: watch::Sender<LinkState>,
    shutdown: CancellationToken,
}

impl ReconnectController {
    /// `shutdown` stops the controller when cancelled; closing through the
    /// handle leaves the parent token alone.
    pub fn new(
        dialer: Arc<dyn Dialer>,
        opener: Arc<dyn TunnelOpener>,
        channel: ChannelConfig,
        backoff: FibonacciBackoff,
        shutdown: &CancellationToken,
    ) -> (Self, ControllerHandle) {
        let (state, state_rx) = watch::channel(LinkState::Disconnected);
        let shutdown = shutdown.child_token();
        let handle = ControllerHandle {
            state: state_rx,
            shutdown: shutdown.clone(),
        };
        let controller = Self {
            dialer,
            opener,
            channel,
            backoff,
            state,
            shutdown,
        };
        (controller, handle)
    }

    fn set_state(&self, state: LinkState) {
        self.state.send_replace(state);
    }

    pub async fn run(mut self) {
        loop {
            self.set_state(LinkState::Connecting);
            let dialed = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                dialed = self.dialer.dial() => dialed,
            };

            match dialed {
                Ok(ws) => {
                    self.backoff.reset();
                    self.set_state(LinkState::Connected);
                    info!("connected to service");
                    let end = self.serve(ws).await;
                    self.set_state(LinkState::Disconnected);
                    info!(reason = %end, "control channel ended");
                }
                Err(e) => {
                    record_error(e.error_type());
                    self.set_state(LinkState::Disconnected);
                    warn!(error = %e, "failed to connect to service");
                }
            }

            if self.shutdown.is_cancelled() {
                break;
            }
            let delay = self.backoff.next_delay();
            record_reconnect();
            info!(delay_ms = delay.as_millis() as u64, "reconnecting");
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.set_state(LinkState::Closed);
        debug!("reconnect controller stopped");
    }

    async fn serve(&self, ws: WebSocketStream<BoxedStream>) -> spacekit_transport::ChannelEnd {
        let channel = ControlChannel::new(ws, self.opener.clone(), self.channel.clone());
        let handle = channel.handle();
        let run = channel.run();
        tokio::pin!(run);
        tokio::select! {
            end = &mut run => end,
            _ = self.shutdown.cancelled() => {
                handle.close(CloseCode::Normal, "relay shutting down");
                run.await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use spacekit_transport::RejectOpen;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::protocol::Role;

    fn fast_backoff() -> FibonacciBackoff {
        FibonacciBackoff::new(Duration::from_millis(5), Duration::from_millis(20), 0.0)
    }

    fn channel_config() -> ChannelConfig {
        ChannelConfig {
            close_grace: Duration::from_millis(100),
            ..ChannelConfig::default()
        }
    }

    struct FailingDialer {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for FailingDialer {
        async fn dial(&self) -> Result<WebSocketStream<BoxedStream>, RelayError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(RelayError::Io(std::io::ErrorKind::ConnectionRefused.into()))
        }
    }

    /// Hands the service end of every dialed connection to the test.
    struct DuplexDialer {
        peers: mpsc::UnboundedSender<WebSocketStream<tokio::io::DuplexStream>>,
    }

    #[async_trait]
    impl Dialer for DuplexDialer {
        async fn dial(&self) -> Result<WebSocketStream<BoxedStream>, RelayError> {
            let (relay_io, service_io) = tokio::io::duplex(64 * 1024);
            let service = WebSocketStream::from_raw_socket(service_io, Role::Server, None).await;
            let _ = self.peers.send(service);
            let relay_io: BoxedStream = Box::new(relay_io);
            Ok(WebSocketStream::from_raw_socket(relay_io, Role::Client, None).await)
        }
    }

    #[tokio::test]
    async fn retries_until_closed() {
        let dialer = Arc::new(FailingDialer {
            attempts: AtomicUsize::new(0),
        });
        let shutdown = CancellationToken::new();
        let (controller, handle) = ReconnectController::new(
            dialer.clone(),
            Arc::new(RejectOpen),
            channel_config(),
            fast_backoff(),
            &shutdown,
        );
        let task = tokio::spawn(controller.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while dialer.attempts.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.close();
        handle.close();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(handle.state(), LinkState::Closed);
        assert!(!shutdown.is_cancelled());

        let attempts = dialer.attempts.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), attempts);
    }

    #[tokio::test]
    async fn redials_after_drop() {
        let (peers_tx, mut peers) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let (controller, handle) = ReconnectController::new(
            Arc::new(DuplexDialer { peers: peers_tx }),
            Arc::new(RejectOpen),
            channel_config(),
            fast_backoff(),
            &shutdown,
        );
        let task = tokio::spawn(controller.run());
        let mut states = handle.subscribe();

        let first = peers.recv().await.unwrap();
        states.wait_for(|s| *s == LinkState::Connected).await.unwrap();
        drop(first);

        let _second = tokio::time::timeout(Duration::from_secs(5), peers.recv())
            .await
            .unwrap()
            .unwrap();

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        assert_eq!(handle.state(), LinkState::Closed);
    }
}
