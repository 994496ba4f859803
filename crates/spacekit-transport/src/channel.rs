//! Control channel: one WebSocket carrying framed tunnel traffic.
//!
//! A [`ControlChannel`] owns the WebSocket and a [`Multiplexer`]. Running it
//! spawns a writer task (frame queue, keepalive pings, close requests) and
//! reads inbound messages on the current task, feeding decoded frames to the
//! multiplexer. When the channel ends for any reason every tunnel is closed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use spacekit_core::{DEFAULT_CLOSE_GRACE_MS, DEFAULT_FRAME_QUEUE, DEFAULT_PIPE_BUFFER_SIZE};
use spacekit_metrics::record_frame;
use spacekit_proto::{ConnectionId, DecodeError, Frame, FrameDecoder, MessageType};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{MuxError, TransportError};
use crate::mux::{Multiplexer, MultiplexerHandle, TunnelOpener};
use crate::BoxedStream;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// WebSocket limits for control channels. `0` disables the limit.
pub fn ws_config(max_message_bytes: usize) -> WebSocketConfig {
    let limit = (max_message_bytes > 0).then_some(max_message_bytes);
    let mut config = WebSocketConfig::default();
    config.max_message_size = limit;
    config.max_frame_size = limit;
    config
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Send a WebSocket ping this often. The service leaves this unset.
    pub ping_interval: Option<Duration>,
    /// Depth of the outbound frame queue.
    pub frame_queue: usize,
    /// Read chunk for tunneled sockets.
    pub buffer_size: usize,
    /// How long to wait for the peer to answer our close frame.
    pub close_grace: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            ping_interval: None,
            frame_queue: DEFAULT_FRAME_QUEUE,
            buffer_size: DEFAULT_PIPE_BUFFER_SIZE,
            close_grace: Duration::from_millis(DEFAULT_CLOSE_GRACE_MS),
        }
    }
}

/// How a control channel ended.
#[derive(Debug)]
pub enum ChannelEnd {
    /// The peer sent a close frame.
    Closed(Option<CloseFrame>),
    /// Closed from this side (see [`ChannelHandle::close`]).
    LocalClose,
    /// The transport went away without a close frame.
    Dropped,
    /// Transport failure.
    Error(TransportError),
    /// The peer broke the header/body alternation.
    Violation(DecodeError),
}

impl std::fmt::Display for ChannelEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelEnd::Closed(Some(frame)) => {
                write!(f, "closed by peer ({} {})", u16::from(frame.code), frame.reason.as_str())
            }
            ChannelEnd::Closed(None) => f.write_str("closed by peer"),
            ChannelEnd::LocalClose => f.write_str("closed locally"),
            ChannelEnd::Dropped => f.write_str("connection dropped"),
            ChannelEnd::Error(e) => write!(f, "{e}"),
            ChannelEnd::Violation(e) => write!(f, "protocol violation: {e}"),
        }
    }
}

enum Control {
    Close(CloseCode, &'static str),
}

/// Cloneable handle to a running control channel.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: u64,
    mux: MultiplexerHandle,
    control: mpsc::UnboundedSender<Control>,
    done: CancellationToken,
}

impl std::fmt::Debug for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Control::Close(code, reason) => write!(f, "Close({}, {reason})", u16::from(*code)),
        }
    }
}

impl ChannelHandle {
    /// Process-unique identity of this channel.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tunnel a local socket to the peer; see [`MultiplexerHandle::add_socket`].
    pub fn add_socket(
        &self,
        stream: BoxedStream,
        hostname: &str,
        port: u16,
    ) -> Result<ConnectionId, MuxError> {
        if self.done.is_cancelled() {
            return Err(MuxError::ChannelClosed);
        }
        self.mux.add_socket(stream, hostname, port)
    }

    /// Send a close frame and end the channel. Repeated calls are harmless.
    pub fn close(&self, code: CloseCode, reason: &'static str) {
        let _ = self.control.send(Control::Close(code, reason));
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Resolves once the channel has ended.
    pub async fn closed(&self) {
        self.done.cancelled().await
    }
}

/// A WebSocket control channel, ready to run.
pub struct ControlChannel<S> {
    ws: WebSocketStream<S>,
    mux: Multiplexer,
    frames: mpsc::Receiver<Frame>,
    control: mpsc::UnboundedReceiver<Control>,
    handle: ChannelHandle,
    config: ChannelConfig,
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(ws: WebSocketStream<S>, opener: Arc<dyn TunnelOpener>, config: ChannelConfig) -> Self {
        let (frames_tx, frames_rx) = mpsc::channel(config.frame_queue.max(1));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let mux = Multiplexer::new(frames_tx, opener, config.buffer_size);
        let handle = ChannelHandle {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            mux: mux.handle(),
            control: control_tx,
            done: CancellationToken::new(),
        };
        Self {
            ws,
            mux,
            frames: frames_rx,
            control: control_rx,
            handle,
            config,
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    /// Run until the channel ends. All tunnels are closed on return.
    pub async fn run(self) -> ChannelEnd {
        let ControlChannel {
            ws,
            mux,
            frames,
            control,
            handle,
            config,
        } = self;
        let (sink, source) = ws.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(config.frame_queue.max(1));
        let done = handle.done.clone();

        let mux_task = tokio::spawn(mux.run(inbound_rx));
        let writer = tokio::spawn({
            let done = done.clone();
            let config = config.clone();
            async move {
                let result = write_loop(sink, frames, control, &config, &done).await;
                done.cancel();
                result
            }
        });

        let end = read_loop(source, inbound_tx, &handle.control, &done).await;
        done.cancel();

        match writer.await {
            Ok(Err(e)) => debug!(channel = handle.id, error = %e, "control channel write failed"),
            Err(e) => warn!(channel = handle.id, error = %e, "control channel writer panicked"),
            Ok(Ok(())) => {}
        }
        if let Err(e) = mux_task.await {
            warn!(channel = handle.id, error = %e, "multiplexer task panicked");
        }
        end
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut frames: mpsc::Receiver<Frame>,
    mut control: mpsc::UnboundedReceiver<Control>,
    config: &ChannelConfig,
    done: &CancellationToken,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut ping = config.ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            biased;
            Some(Control::Close(code, reason)) = control.recv() => {
                debug!(code = u16::from(code), reason, "closing control channel");
                let close = CloseFrame { code, reason: reason.into() };
                let _ = sink.send(Message::Close(Some(close))).await;
                // Wait for the reader to see the peer's answer, but not forever.
                tokio::select! {
                    _ = done.cancelled() => {}
                    _ = tokio::time::sleep(config.close_grace) => done.cancel(),
                }
                return Ok(());
            }
            _ = done.cancelled() => break,
            frame = frames.recv() => match frame {
                Some(frame) => write_frame(&mut sink, frame).await?,
                None => break,
            },
            _ = tick(&mut ping) => {
                trace!("keepalive ping");
                sink.send(Message::Ping(Bytes::new())).await?;
            }
        }
    }
    let _ = sink.close().await;
    Ok(())
}

async fn write_frame<S>(
    sink: &mut SplitSink<WebSocketStream<S>, Message>,
    frame: Frame,
) -> Result<(), TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let kind = kind_label(frame.kind());
    let (header, body) = frame.into_messages();
    sink.feed(Message::Text(header.into())).await?;
    sink.send(Message::Binary(body)).await?;
    record_frame("sent", kind);
    Ok(())
}

async fn read_loop<S>(
    mut source: SplitStream<WebSocketStream<S>>,
    inbound: mpsc::Sender<Frame>,
    control: &mpsc::UnboundedSender<Control>,
    done: &CancellationToken,
) -> ChannelEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = FrameDecoder::new();
    loop {
        let message = tokio::select! {
            biased;
            _ = done.cancelled() => return ChannelEnd::LocalClose,
            message = source.next() => message,
        };
        let payload = match message {
            None => return ChannelEnd::Dropped,
            Some(Err(e)) => return ChannelEnd::Error(e.into()),
            Some(Ok(Message::Close(frame))) => return ChannelEnd::Closed(frame),
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_bytes()),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(_)) => continue,
        };
        match decoder.feed(payload) {
            Ok(Some(frame)) => {
                record_frame("received", kind_label(frame.kind()));
                if inbound.send(frame).await.is_err() {
                    return ChannelEnd::Dropped;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let _ = control.send(Control::Close(CloseCode::Protocol, "protocol violation"));
                return ChannelEnd::Violation(e);
            }
        }
    }
}

async fn tick(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn kind_label(kind: MessageType) -> &'static str {
    match kind {
        MessageType::Open => "open",
        MessageType::Data => "data",
        MessageType::Close => "close",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mux::RejectOpen;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn frames_travel_as_header_then_body() {
        let (server_ws, mut peer) = ws_pair().await;
        let channel = ControlChannel::new(server_ws, Arc::new(RejectOpen), ChannelConfig::default());
        let handle = channel.handle();
        tokio::spawn(channel.run());

        let (local, mut client) = duplex(1024);
        handle.add_socket(Box::new(local), "app.alice.spacekit.io", 443).unwrap();
        client.write_all(b"ping").await.unwrap();

        let mut messages = Vec::new();
        while messages.len() < 4 {
            let msg = timeout(Duration::from_secs(5), peer.next()).await.unwrap().unwrap().unwrap();
            messages.push(msg);
        }
        let Message::Text(open) = &messages[0] else { panic!("header must be text") };
        assert!(open.as_str().contains(r#""type":"open""#));
        assert!(matches!(&messages[1], Message::Binary(b) if b.is_empty()));
        let Message::Text(data) = &messages[2] else { panic!("header must be text") };
        assert!(data.as_str().contains(r#""type":"data""#));
        assert!(matches!(&messages[3], Message::Binary(b) if &b[..] == b"ping"));
    }

    #[tokio::test]
    async fn peer_frames_reach_local_socket() {
        let (server_ws, mut peer) = ws_pair().await;
        let channel = ControlChannel::new(server_ws, Arc::new(RejectOpen), ChannelConfig::default());
        let handle = channel.handle();
        tokio::spawn(channel.run());

        let (local, mut client) = duplex(1024);
        let id = handle.add_socket(Box::new(local), "app.alice.spacekit.io", 443).unwrap();
        // open header + body
        peer.next().await.unwrap().unwrap();
        peer.next().await.unwrap().unwrap();

        let (header, body) = Frame::data(id, Bytes::from_static(b"pong")).into_messages();
        peer.send(Message::Text(header.into())).await.unwrap();
        peer.send(Message::Binary(body)).await.unwrap();

        let mut buf = [0u8; 4];
        timeout(Duration::from_secs(5), client.read_exact(&mut buf)).await.unwrap().unwrap();
        assert_eq!(&buf, b"pong");
    }

    #[tokio::test]
    async fn malformed_header_closes_with_protocol_error() {
        let (server_ws, mut peer) = ws_pair().await;
        let channel = ControlChannel::new(server_ws, Arc::new(RejectOpen), ChannelConfig::default());
        let run = tokio::spawn(channel.run());

        peer.send(Message::Binary(Bytes::from_static(b"\x00\x01raw"))).await.unwrap();

        let msg = timeout(Duration::from_secs(5), peer.next()).await.unwrap().unwrap().unwrap();
        let Message::Close(Some(frame)) = msg else { panic!("expected close, got {msg:?}") };
        assert_eq!(frame.code, CloseCode::Protocol);

        let end = timeout(Duration::from_secs(10), run).await.unwrap().unwrap();
        assert!(matches!(end, ChannelEnd::Violation(_)));
    }

    #[tokio::test]
    async fn local_close_sends_close_code_and_ends_tunnels() {
        let (server_ws, mut peer) = ws_pair().await;
        let channel = ControlChannel::new(server_ws, Arc::new(RejectOpen), ChannelConfig::default());
        let handle = channel.handle();
        let run = tokio::spawn(channel.run());

        let (local, mut client) = duplex(1024);
        handle.add_socket(Box::new(local), "x.y.spacekit.io", 443).unwrap();
        handle.close(CloseCode::Away, "going away");
        handle.close(CloseCode::Away, "going away");

        loop {
            let msg = timeout(Duration::from_secs(5), peer.next()).await.unwrap().unwrap().unwrap();
            if let Message::Close(Some(frame)) = msg {
                assert_eq!(frame.code, CloseCode::Away);
                break;
            }
        }
        // Drain so the close handshake completes.
        while let Ok(Some(_)) = timeout(Duration::from_secs(5), peer.next()).await {}

        timeout(Duration::from_secs(10), run).await.unwrap().unwrap();
        assert!(handle.is_closed());

        let mut out = Vec::new();
        timeout(Duration::from_secs(5), client.read_to_end(&mut out)).await.unwrap().unwrap();
        assert!(handle.add_socket(Box::new(duplex(8).0), "x.y.spacekit.io", 443).is_err());
    }

    #[tokio::test]
    async fn keepalive_sends_pings() {
        let (server_ws, mut peer) = ws_pair().await;
        let config = ChannelConfig {
            ping_interval: Some(Duration::from_millis(20)),
            ..ChannelConfig::default()
        };
        let channel = ControlChannel::new(server_ws, Arc::new(RejectOpen), config);
        tokio::spawn(channel.run());

        let msg = timeout(Duration::from_secs(5), peer.next()).await.unwrap().unwrap().unwrap();
        assert!(matches!(msg, Message::Ping(_)));
    }
}
