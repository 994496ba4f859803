//! Relay registry: which control channel serves which hostname.

use std::collections::HashMap;

use parking_lot::RwLock;
use spacekit_metrics::{record_registration_evicted, set_relays_registered};
use spacekit_transport::{ChannelHandle, CloseCode};
use tracing::info;

const EVICTED_REASON: &str = "replaced by a newer relay";
const SHUTDOWN_REASON: &str = "service shutting down";

/// Hostname -> control channel. At most one channel per hostname; the newest
/// registration wins and the previous channel is closed with "going away".
#[derive(Debug, Default)]
pub struct RelayRegistry {
    relays: RwLock<HashMap<String, ChannelHandle>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `channel` for `hostname`, evicting any previous channel.
    pub fn register(&self, hostname: &str, channel: ChannelHandle) {
        let (previous, count) = {
            let mut relays = self.relays.write();
            let previous = relays.insert(hostname.to_owned(), channel.clone());
            (previous, relays.len())
        };
        set_relays_registered(count);
        if let Some(previous) = previous
            && previous.id() != channel.id()
        {
            info!(hostname, old = previous.id(), new = channel.id(), "evicting previous relay");
            record_registration_evicted();
            previous.close(CloseCode::Away, EVICTED_REASON);
        }
    }

    pub fn lookup(&self, hostname: &str) -> Option<ChannelHandle> {
        self.relays.read().get(hostname).cloned()
    }

    /// Remove `hostname` only if it still maps to the channel `channel_id`.
    pub fn deregister(&self, hostname: &str, channel_id: u64) -> bool {
        let (removed, count) = {
            let mut relays = self.relays.write();
            let removed = match relays.get(hostname) {
                Some(current) if current.id() == channel_id => relays.remove(hostname).is_some(),
                _ => false,
            };
            (removed, relays.len())
        };
        if removed {
            set_relays_registered(count);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.relays.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.read().is_empty()
    }

    /// Close and forget every registered channel.
    pub fn close_all(&self) {
        let drained: Vec<_> = self.relays.write().drain().collect();
        set_relays_registered(0);
        for (hostname, channel) in drained {
            info!(hostname = %hostname, "closing relay");
            channel.close(CloseCode::Away, SHUTDOWN_REASON);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use spacekit_transport::{ChannelConfig, ControlChannel, RejectOpen};
    use std::sync::Arc;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// A running channel plus the raw peer end of its WebSocket.
    async fn channel() -> (ChannelHandle, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let ours = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let peer = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        let channel = ControlChannel::new(ours, Arc::new(RejectOpen), ChannelConfig::default());
        let handle = channel.handle();
        tokio::spawn(channel.run());
        (handle, peer)
    }

    #[tokio::test]
    async fn newest_registration_evicts_previous() {
        let registry = RelayRegistry::new();
        let (first, mut first_peer) = channel().await;
        let (second, _second_peer) = channel().await;

        registry.register("web.alice.spacekit.test", first.clone());
        registry.register("web.alice.spacekit.test", second.clone());

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.lookup("web.alice.spacekit.test").map(|c| c.id()),
            Some(second.id())
        );

        match first_peer.next().await {
            Some(Ok(Message::Close(Some(frame)))) => assert_eq!(frame.code, CloseCode::Away),
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn stale_deregister_keeps_newer_channel() {
        let registry = RelayRegistry::new();
        let (first, _p1) = channel().await;
        let (second, _p2) = channel().await;

        registry.register("web.alice.spacekit.test", first.clone());
        registry.register("web.alice.spacekit.test", second.clone());

        assert!(!registry.deregister("web.alice.spacekit.test", first.id()));
        assert!(registry.lookup("web.alice.spacekit.test").is_some());
        assert!(registry.deregister("web.alice.spacekit.test", second.id()));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn close_all_empties_registry() {
        let registry = RelayRegistry::new();
        let (a, mut peer) = channel().await;
        registry.register("a.alice.spacekit.test", a);
        registry.close_all();
        assert!(registry.is_empty());
        assert!(matches!(peer.next().await, Some(Ok(Message::Close(_)))));
    }
}
