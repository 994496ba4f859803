//! Bidirectional pipe between two streams.
//!
//! Used wherever two local sockets have to be spliced together: the relay's
//! TLS termination adapter (decrypted stream <-> local target) and the
//! service's fallback to an external API/web backend.
//!
//! Both directions are driven from a single future with poll-based state
//! machines, so a stalled write in one direction never blocks the other. EOF
//! on one side half-closes the other side's write half; the pipe finishes once
//! both directions have finished.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Instant;

/// Byte counters for a pipe.
pub trait PipeMetrics {
    /// Bytes moved from `a` to `b`.
    fn record_a_to_b(&self, bytes: u64);
    /// Bytes moved from `b` to `a`.
    fn record_b_to_a(&self, bytes: u64);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl PipeMetrics for NoOpMetrics {
    #[inline]
    fn record_a_to_b(&self, _bytes: u64) {}
    #[inline]
    fn record_b_to_a(&self, _bytes: u64) {}
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Read,
    Write { pos: usize, len: usize },
    Flush { len: usize },
    Shutdown,
    Done,
}

enum Progress {
    Moved(usize),
    Finished,
}

/// One direction of the pipe.
struct Half {
    buf: Box<[u8]>,
    stage: Stage,
}

impl Half {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0u8; size.max(1)].into_boxed_slice(),
            stage: Stage::Read,
        }
    }

    fn is_done(&self) -> bool {
        matches!(self.stage, Stage::Done)
    }

    fn poll_step<R, W>(
        &mut self,
        cx: &mut Context<'_>,
        reader: &mut R,
        writer: &mut W,
    ) -> Poll<io::Result<Progress>>
    where
        R: AsyncRead + Unpin + ?Sized,
        W: AsyncWrite + Unpin + ?Sized,
    {
        loop {
            match self.stage {
                Stage::Read => {
                    let mut read_buf = ReadBuf::new(&mut self.buf);
                    ready!(Pin::new(&mut *reader).poll_read(cx, &mut read_buf))?;
                    let len = read_buf.filled().len();
                    self.stage = if len == 0 {
                        Stage::Shutdown
                    } else {
                        Stage::Write { pos: 0, len }
                    };
                }
                Stage::Write { pos, len } => {
                    let n = ready!(Pin::new(&mut *writer).poll_write(cx, &self.buf[pos..len]))?;
                    if n == 0 {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    self.stage = if pos + n >= len {
                        Stage::Flush { len }
                    } else {
                        Stage::Write { pos: pos + n, len }
                    };
                }
                Stage::Flush { len } => {
                    ready!(Pin::new(&mut *writer).poll_flush(cx))?;
                    self.stage = Stage::Read;
                    return Poll::Ready(Ok(Progress::Moved(len)));
                }
                Stage::Shutdown => {
                    // The peer may already be gone; a failed shutdown still ends this direction.
                    let _ = ready!(Pin::new(&mut *writer).poll_shutdown(cx));
                    self.stage = Stage::Done;
                    return Poll::Ready(Ok(Progress::Finished));
                }
                Stage::Done => return Poll::Ready(Ok(Progress::Finished)),
            }
        }
    }
}

/// Copy bytes both ways between `a` and `b` until both directions reach EOF.
///
/// With `idle_timeout` set, the pipe also ends once neither direction has
/// moved data for that long. Tunnels pass `None`: their lifetime is bounded
/// by the endpoints, not by inactivity.
pub async fn pipe_bidirectional<A, B, M>(
    a: A,
    b: B,
    idle_timeout: Option<Duration>,
    buffer_size: usize,
    metrics: &M,
) -> io::Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
    M: PipeMetrics + ?Sized,
{
    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);
    let mut forward = Half::new(buffer_size);
    let mut backward = Half::new(buffer_size);

    let deadline = idle_timeout.map(|idle| Instant::now() + idle);
    let idle = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));
    tokio::pin!(idle);

    while !(forward.is_done() && backward.is_done()) {
        let step = poll_fn(|cx| {
            let mut moved = false;
            let mut progressed = false;

            if !forward.is_done()
                && let Poll::Ready(result) = forward.poll_step(cx, &mut a_read, &mut b_write)
            {
                progressed = true;
                if let Progress::Moved(n) = result? {
                    metrics.record_a_to_b(n as u64);
                    moved = true;
                }
            }
            if !backward.is_done()
                && let Poll::Ready(result) = backward.poll_step(cx, &mut b_read, &mut a_write)
            {
                progressed = true;
                if let Progress::Moved(n) = result? {
                    metrics.record_b_to_a(n as u64);
                    moved = true;
                }
            }

            if progressed {
                Poll::Ready(Ok::<bool, io::Error>(moved))
            } else {
                Poll::Pending
            }
        });

        match idle_timeout {
            Some(limit) => {
                tokio::select! {
                    moved = step => {
                        if moved? {
                            idle.as_mut().reset(Instant::now() + limit);
                        }
                    }
                    _ = &mut idle => return Ok(()),
                }
            }
            None => {
                step.await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[derive(Default)]
    struct Counters {
        a_to_b: AtomicU64,
        b_to_a: AtomicU64,
    }

    impl PipeMetrics for Counters {
        fn record_a_to_b(&self, bytes: u64) {
            self.a_to_b.fetch_add(bytes, Ordering::Relaxed);
        }
        fn record_b_to_a(&self, bytes: u64) {
            self.b_to_a.fetch_add(bytes, Ordering::Relaxed);
        }
    }

    #[tokio::test]
    async fn moves_bytes_both_ways_and_finishes_on_eof() {
        let (mut client, a) = duplex(256);
        let (b, mut target) = duplex(256);
        let counters = std::sync::Arc::new(Counters::default());

        let metrics = counters.clone();
        let pipe = tokio::spawn(async move {
            pipe_bidirectional(a, b, None, 64, metrics.as_ref()).await
        });

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 18];
        target.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"GET / HTTP/1.1\r\n\r\n");

        target.write_all(b"HTTP/1.1 200 OK\r\n\r\n").await.unwrap();
        let mut buf = [0u8; 19];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"HTTP/1.1 200 OK\r\n\r\n");

        client.shutdown().await.unwrap();
        target.shutdown().await.unwrap();
        pipe.await.unwrap().unwrap();

        assert_eq!(counters.a_to_b.load(Ordering::Relaxed), 18);
        assert_eq!(counters.b_to_a.load(Ordering::Relaxed), 19);
    }

    #[tokio::test]
    async fn eof_on_one_side_half_closes_the_other() {
        let (mut client, a) = duplex(256);
        let (b, mut target) = duplex(256);

        let pipe =
            tokio::spawn(async move { pipe_bidirectional(a, b, None, 64, &NoOpMetrics).await });

        client.write_all(b"bye").await.unwrap();
        client.shutdown().await.unwrap();

        let mut out = Vec::new();
        target.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"bye");

        // The reverse direction still works after the half-close.
        target.write_all(b"ack").await.unwrap();
        target.shutdown().await.unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"ack");

        pipe.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_timeout_ends_quiet_pipe() {
        let (_client, a) = duplex(64);
        let (b, _target) = duplex(64);

        let start = Instant::now();
        pipe_bidirectional(a, b, Some(Duration::from_millis(50)), 64, &NoOpMetrics)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
