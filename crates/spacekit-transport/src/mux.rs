//! Socket multiplexer.
//!
//! One [`Multiplexer`] per control channel tracks every tunneled connection by
//! id. It runs as an actor: inbound frames and local events are handled one at
//! a time, and each tunnel gets its own pump task that moves bytes between the
//! local socket and the channel.
//!
//! Frame order on the wire is preserved by construction: every frame goes
//! through the single bounded queue drained by the channel writer, and a
//! tunnel's `open` is queued before its pump starts, its `data` frames by the
//! pump itself, and its `close` by the pump after the last `data`.
//!
//! Each tunnel buffers at most [`DEFAULT_TUNNEL_QUEUE`] peer frames. When a
//! local socket stops reading, the multiplexer stops taking frames off the
//! channel instead of buffering without bound.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use spacekit_core::DEFAULT_TUNNEL_QUEUE;
use spacekit_metrics::{record_error, record_tunnel_bytes, record_tunnel_closed, record_tunnel_opened};
use spacekit_proto::{ConnectionId, Frame, MessageType};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::BoxedStream;
use crate::error::MuxError;

/// A request from the peer to open a tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub connection_id: ConnectionId,
    pub port: u16,
    /// Hostname the service routed on, when it sent one.
    pub hostname: Option<String>,
}

/// Opens the local end of a tunnel when the peer sends `open`.
#[async_trait]
pub trait TunnelOpener: Send + Sync + 'static {
    async fn open(&self, request: &OpenRequest) -> Result<BoxedStream, MuxError>;
}

/// Opener for the service side, which never accepts `open`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectOpen;

#[async_trait]
impl TunnelOpener for RejectOpen {
    async fn open(&self, _request: &OpenRequest) -> Result<BoxedStream, MuxError> {
        Err(MuxError::OpenRejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// `open` received, local connect in progress. Data is queued.
    Opening,
    Open,
}

/// Peer bytes on their way to the local socket. Dropping the sender closes
/// the socket once everything queued before it has been written.
struct Tunnel {
    state: TunnelState,
    inbound: mpsc::Sender<Bytes>,
}

enum MuxEvent {
    Attach {
        id: ConnectionId,
        stream: BoxedStream,
        hostname: String,
        port: u16,
    },
    Opened(ConnectionId),
    Finished(ConnectionId),
}

/// Cloneable handle for attaching sockets to a running multiplexer.
#[derive(Clone)]
pub struct MultiplexerHandle {
    events: mpsc::UnboundedSender<MuxEvent>,
}

impl fmt::Debug for MultiplexerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexerHandle")
            .field("closed", &self.events.is_closed())
            .finish()
    }
}

impl MultiplexerHandle {
    /// Hand a local socket to the peer: sends `open` for `port`, then tunnels
    /// the socket's bytes until either side closes.
    pub fn add_socket(
        &self,
        stream: BoxedStream,
        hostname: &str,
        port: u16,
    ) -> Result<ConnectionId, MuxError> {
        let id = ConnectionId::random();
        self.events
            .send(MuxEvent::Attach {
                id: id.clone(),
                stream,
                hostname: hostname.to_owned(),
                port,
            })
            .map_err(|_| MuxError::ChannelClosed)?;
        Ok(id)
    }

    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Connection table for one control channel.
pub struct Multiplexer {
    tunnels: HashMap<ConnectionId, Tunnel>,
    frames: mpsc::Sender<Frame>,
    opener: Arc<dyn TunnelOpener>,
    events_tx: mpsc::UnboundedSender<MuxEvent>,
    events_rx: mpsc::UnboundedReceiver<MuxEvent>,
    buffer_size: usize,
}

impl Multiplexer {
    /// `frames` is the outbound queue of the channel writer.
    pub fn new(
        frames: mpsc::Sender<Frame>,
        opener: Arc<dyn TunnelOpener>,
        buffer_size: usize,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            tunnels: HashMap::new(),
            frames,
            opener,
            events_tx,
            events_rx,
            buffer_size: buffer_size.max(1),
        }
    }

    pub fn handle(&self) -> MultiplexerHandle {
        MultiplexerHandle {
            events: self.events_tx.clone(),
        }
    }

    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    pub fn tunnel_state(&self, id: &ConnectionId) -> Option<TunnelState> {
        self.tunnels.get(id).map(|t| t.state)
    }

    /// Process frames and local events until `inbound` closes, then tear down
    /// every tunnel.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Frame>) {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.handle_message(frame).await,
                    None => break,
                },
            }
        }
        self.close_all();
    }

    /// Dispatch one decoded frame. Frames for unknown ids are dropped.
    ///
    /// Waits while the target tunnel's queue is full.
    pub async fn handle_message(&mut self, frame: Frame) {
        let Frame { header, body } = frame;
        let id = header.connection_id;
        match header.kind {
            MessageType::Open => {
                if self.tunnels.contains_key(&id) {
                    warn!(connection_id = %id, "duplicate open ignored");
                    return;
                }
                // The decoder refuses `open` headers without a port.
                let Some(port) = header.port else {
                    debug_assert!(false, "open frame without port reached the multiplexer");
                    warn!(connection_id = %id, "open without port ignored");
                    return;
                };
                let (tx, rx) = mpsc::channel(DEFAULT_TUNNEL_QUEUE);
                self.tunnels.insert(
                    id.clone(),
                    Tunnel {
                        state: TunnelState::Opening,
                        inbound: tx,
                    },
                );
                let request = OpenRequest {
                    connection_id: id,
                    port,
                    hostname: header.hostname,
                };
                tokio::spawn(open_tunnel(
                    request,
                    self.opener.clone(),
                    rx,
                    self.frames.clone(),
                    self.events_tx.clone(),
                    self.buffer_size,
                ));
            }
            MessageType::Data => match self.tunnels.get(&id) {
                Some(tunnel) => {
                    if tunnel.inbound.send(body).await.is_err() {
                        trace!(connection_id = %id, "data for finished tunnel dropped");
                    }
                }
                None => trace!(connection_id = %id, "data for unknown connection dropped"),
            },
            MessageType::Close => match self.tunnels.remove(&id) {
                Some(_) => debug!(connection_id = %id, "peer closed connection"),
                None => trace!(connection_id = %id, "close for unknown connection ignored"),
            },
        }
    }

    async fn handle_event(&mut self, event: MuxEvent) {
        match event {
            MuxEvent::Attach {
                id,
                stream,
                hostname,
                port,
            } => {
                let open = Frame::open(id.clone(), port, Some(hostname.clone()));
                if self.frames.send(open).await.is_err() {
                    debug!(hostname = %hostname, "channel gone before open could be sent");
                    return;
                }
                let (tx, rx) = mpsc::channel(DEFAULT_TUNNEL_QUEUE);
                self.tunnels.insert(
                    id.clone(),
                    Tunnel {
                        state: TunnelState::Open,
                        inbound: tx,
                    },
                );
                debug!(connection_id = %id, hostname = %hostname, port, "tunnel opened");
                record_tunnel_opened();
                tokio::spawn(pump(
                    id,
                    stream,
                    rx,
                    self.frames.clone(),
                    self.events_tx.clone(),
                    self.buffer_size,
                ));
            }
            MuxEvent::Opened(id) => {
                if let Some(tunnel) = self.tunnels.get_mut(&id) {
                    tunnel.state = TunnelState::Open;
                }
            }
            MuxEvent::Finished(id) => {
                self.tunnels.remove(&id);
            }
        }
    }

    /// Close every local socket. No frames are sent.
    pub fn close_all(&mut self) {
        self.tunnels.clear();
    }
}

async fn open_tunnel(
    request: OpenRequest,
    opener: Arc<dyn TunnelOpener>,
    inbound: mpsc::Receiver<Bytes>,
    frames: mpsc::Sender<Frame>,
    events: mpsc::UnboundedSender<MuxEvent>,
    buffer_size: usize,
) {
    let id = request.connection_id.clone();
    match opener.open(&request).await {
        Ok(stream) => {
            debug!(connection_id = %id, port = request.port, "tunnel opened");
            record_tunnel_opened();
            let _ = events.send(MuxEvent::Opened(id.clone()));
            pump(id, stream, inbound, frames, events, buffer_size).await;
        }
        Err(e) => {
            warn!(connection_id = %id, port = request.port, error = %e, "could not open tunnel");
            record_error(e.error_type());
            let _ = frames.send(Frame::close(id.clone())).await;
            let _ = events.send(MuxEvent::Finished(id));
        }
    }
}

/// How one direction of a tunnel ended.
enum Ended {
    /// Local EOF or I/O error; the peer must be told.
    Local,
    /// Peer close, or the channel went away; nothing to announce.
    Remote,
}

/// Move bytes between one local socket and the channel.
///
/// The two directions run independently, so a local write blocked on a slow
/// reader never stops the socket from being read. A close coming from the
/// local side is announced to the peer exactly once; a close coming from the
/// peer is not echoed back.
async fn pump(
    id: ConnectionId,
    stream: BoxedStream,
    inbound: mpsc::Receiver<Bytes>,
    frames: mpsc::Sender<Frame>,
    events: mpsc::UnboundedSender<MuxEvent>,
    buffer_size: usize,
) {
    let (reader, writer) = tokio::io::split(stream);

    let ended = tokio::select! {
        ended = write_local(&id, writer, inbound) => ended,
        ended = read_local(&id, reader, &frames, buffer_size) => ended,
    };

    if let Ended::Local = ended {
        trace!(connection_id = %id, "local side closed");
        let _ = frames.send(Frame::close(id.clone())).await;
    }
    let _ = events.send(MuxEvent::Finished(id));
    record_tunnel_closed();
}

/// Peer `data` into the socket until the queue closes, then shut the write half.
async fn write_local<W: AsyncWrite + Unpin>(
    id: &ConnectionId,
    mut writer: W,
    mut inbound: mpsc::Receiver<Bytes>,
) -> Ended {
    while let Some(bytes) = inbound.recv().await {
        record_tunnel_bytes("inbound", bytes.len() as u64);
        let written = async {
            writer.write_all(&bytes).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            debug!(connection_id = %id, error = %e, "local write failed");
            return Ended::Local;
        }
    }
    let _ = writer.shutdown().await;
    Ended::Remote
}

/// Local reads out as `data` frames until EOF.
async fn read_local<R: AsyncRead + Unpin>(
    id: &ConnectionId,
    mut reader: R,
    frames: &mpsc::Sender<Frame>,
    buffer_size: usize,
) -> Ended {
    let mut buf = BytesMut::with_capacity(buffer_size);
    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => return Ended::Local,
            Ok(n) => {
                record_tunnel_bytes("outbound", n as u64);
                let chunk = buf.split().freeze();
                if frames.send(Frame::data(id.clone(), chunk)).await.is_err() {
                    return Ended::Remote;
                }
                buf.reserve(buffer_size);
            }
            Err(e) => {
                debug!(connection_id = %id, error = %e, "local read failed");
                return Ended::Local;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::time::timeout;

    /// Hands the far end of an opened stream to the test body.
    #[derive(Default)]
    struct Slot(Mutex<Option<DuplexStream>>);

    impl Slot {
        fn put(&self, stream: DuplexStream) {
            *self.0.lock().unwrap() = Some(stream);
        }
        fn take(&self) -> Option<DuplexStream> {
            self.0.lock().unwrap().take()
        }
    }

    struct DuplexOpener {
        port: u16,
        peer: Arc<Slot>,
    }

    #[async_trait]
    impl TunnelOpener for DuplexOpener {
        async fn open(&self, request: &OpenRequest) -> Result<BoxedStream, MuxError> {
            if request.port != self.port {
                return Err(MuxError::NoMapping(request.port));
            }
            let (local, peer) = duplex(4096);
            self.peer.put(peer);
            Ok(Box::new(local))
        }
    }

    struct Harness {
        inbound: mpsc::Sender<Frame>,
        outbound: mpsc::Receiver<Frame>,
        handle: MultiplexerHandle,
    }

    fn start(opener: Arc<dyn TunnelOpener>) -> Harness {
        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let mux = Multiplexer::new(frames_tx, opener, 1024);
        let handle = mux.handle();
        tokio::spawn(mux.run(inbound_rx));
        Harness {
            inbound: inbound_tx,
            outbound: frames_rx,
            handle,
        }
    }

    async fn next_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for frame")
            .expect("frame queue closed")
    }

    #[tokio::test]
    async fn attached_socket_sends_open_data_close_in_order() {
        let mut h = start(Arc::new(RejectOpen));
        let (local, mut client) = duplex(4096);

        let id = h.handle.add_socket(Box::new(local), "app.alice.spacekit.io", 443).unwrap();
        client.write_all(b"hello").await.unwrap();
        client.shutdown().await.unwrap();

        let open = next_frame(&mut h.outbound).await;
        assert_eq!(open.kind(), MessageType::Open);
        assert_eq!(open.connection_id(), &id);
        assert_eq!(open.header.port, Some(443));
        assert_eq!(open.header.hostname.as_deref(), Some("app.alice.spacekit.io"));

        let data = next_frame(&mut h.outbound).await;
        assert_eq!(data.kind(), MessageType::Data);
        assert_eq!(&data.body[..], b"hello");

        let close = next_frame(&mut h.outbound).await;
        assert_eq!(close.kind(), MessageType::Close);
        assert_eq!(close.connection_id(), &id);
    }

    #[tokio::test]
    async fn peer_data_reaches_socket_and_peer_close_is_not_echoed() {
        let mut h = start(Arc::new(RejectOpen));
        let (local, mut client) = duplex(4096);
        let id = h.handle.add_socket(Box::new(local), "app.alice.spacekit.io", 80).unwrap();
        next_frame(&mut h.outbound).await; // open

        h.inbound
            .send(Frame::data(id.clone(), Bytes::from_static(b"HTTP/1.0 200 OK\r\n\r\n")))
            .await
            .unwrap();
        h.inbound.send(Frame::close(id.clone())).await.unwrap();

        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"HTTP/1.0 200 OK\r\n\r\n");

        // Nothing more may be emitted for this id.
        drop(client);
        assert!(timeout(Duration::from_millis(200), h.outbound.recv()).await.is_err());
    }

    #[tokio::test]
    async fn echoing_socket_keeps_both_directions_flowing() {
        const CHUNK: usize = 16 * 1024;
        const CHUNKS: usize = 16;

        let mut h = start(Arc::new(RejectOpen));
        let (local, mut app) = duplex(4096);
        let id = h.handle.add_socket(Box::new(local), "echo.alice.spacekit.io", 443).unwrap();
        next_frame(&mut h.outbound).await; // open

        // An application that writes back everything it reads.
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                match app.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if app.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let inbound = h.inbound.clone();
        let sender_id = id.clone();
        tokio::spawn(async move {
            for i in 0..CHUNKS {
                let body = Bytes::from(vec![i as u8; CHUNK]);
                if inbound.send(Frame::data(sender_id.clone(), body)).await.is_err() {
                    break;
                }
            }
        });

        let mut echoed = Vec::with_capacity(CHUNK * CHUNKS);
        while echoed.len() < CHUNK * CHUNKS {
            let frame = timeout(Duration::from_secs(10), h.outbound.recv())
                .await
                .unwrap_or_else(|_| panic!("tunnel stalled after {} bytes", echoed.len()))
                .unwrap();
            assert_eq!(frame.kind(), MessageType::Data);
            assert_eq!(frame.connection_id(), &id);
            echoed.extend_from_slice(&frame.body);
        }
        for (i, chunk) in echoed.chunks(CHUNK).enumerate() {
            assert!(chunk.iter().all(|&b| b == i as u8), "chunk {i} out of order");
        }
    }

    #[tokio::test]
    async fn full_tunnel_queue_holds_back_the_channel() {
        let mut h = start(Arc::new(RejectOpen));
        // Nobody reads the application end, so the tunnel backs up.
        let (local, _app) = duplex(64);
        let id = h.handle.add_socket(Box::new(local), "slow.alice.spacekit.io", 443).unwrap();
        next_frame(&mut h.outbound).await; // open

        let inbound = h.inbound.clone();
        let sent = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = sent.clone();
        tokio::spawn(async move {
            for _ in 0..1000 {
                if inbound
                    .send(Frame::data(id.clone(), Bytes::from_static(&[0u8; 64])))
                    .await
                    .is_err()
                {
                    break;
                }
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        let accepted = sent.load(std::sync::atomic::Ordering::Relaxed);
        // Tunnel queue + channel queue + what the socket took, nowhere near 1000.
        assert!(accepted < 200, "{accepted} frames accepted by a stalled tunnel");
    }

    #[tokio::test]
    async fn dangling_frames_are_ignored() {
        let mut h = start(Arc::new(RejectOpen));
        let (local, mut client) = duplex(4096);
        let id = h.handle.add_socket(Box::new(local), "a.b.spacekit.io", 443).unwrap();
        next_frame(&mut h.outbound).await; // open

        let stranger = ConnectionId::from("no-such-connection");
        h.inbound
            .send(Frame::data(stranger.clone(), Bytes::from_static(b"junk")))
            .await
            .unwrap();
        h.inbound.send(Frame::close(stranger)).await.unwrap();
        h.inbound
            .send(Frame::data(id.clone(), Bytes::from_static(b"still here")))
            .await
            .unwrap();

        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"still here");
        assert!(timeout(Duration::from_millis(100), h.outbound.recv()).await.is_err());
    }

    #[tokio::test]
    async fn open_request_connects_and_queues_early_data() {
        let peer = Arc::new(Slot::default());
        let mut h = start(Arc::new(DuplexOpener {
            port: 443,
            peer: peer.clone(),
        }));
        let id = ConnectionId::random();

        // Data right behind the open, before the local connect is known to finish.
        h.inbound.send(Frame::open(id.clone(), 443, None)).await.unwrap();
        h.inbound
            .send(Frame::data(id.clone(), Bytes::from_static(b"\x16\x03\x01")))
            .await
            .unwrap();

        let mut target = loop {
            if let Some(stream) = peer.take() {
                break stream;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        let mut buf = [0u8; 3];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x16\x03\x01");

        target.write_all(b"reply").await.unwrap();
        let data = next_frame(&mut h.outbound).await;
        assert_eq!(data.connection_id(), &id);
        assert_eq!(&data.body[..], b"reply");

        drop(target);
        let close = next_frame(&mut h.outbound).await;
        assert_eq!(close.kind(), MessageType::Close);
    }

    #[tokio::test]
    async fn failed_open_answers_with_close() {
        let mut h = start(Arc::new(DuplexOpener {
            port: 443,
            peer: Arc::new(Slot::default()),
        }));
        let id = ConnectionId::random();
        h.inbound.send(Frame::open(id.clone(), 8080, None)).await.unwrap();

        let close = next_frame(&mut h.outbound).await;
        assert_eq!(close.kind(), MessageType::Close);
        assert_eq!(close.connection_id(), &id);
    }

    #[tokio::test]
    async fn service_side_rejects_open() {
        let mut h = start(Arc::new(RejectOpen));
        let id = ConnectionId::random();
        h.inbound.send(Frame::open(id.clone(), 443, None)).await.unwrap();
        let close = next_frame(&mut h.outbound).await;
        assert_eq!(close.kind(), MessageType::Close);
    }

    #[tokio::test]
    async fn channel_end_closes_every_socket() {
        let h = start(Arc::new(RejectOpen));
        let (a, mut client_a) = duplex(1024);
        let (b, mut client_b) = duplex(1024);
        h.handle.add_socket(Box::new(a), "x.y.spacekit.io", 443).unwrap();
        h.handle.add_socket(Box::new(b), "x.y.spacekit.io", 443).unwrap();

        // Let both attach before the channel goes away.
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(h.inbound);

        let mut out = Vec::new();
        timeout(Duration::from_secs(5), client_a.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        timeout(Duration::from_secs(5), client_b.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert!(out.is_empty());
    }
}
