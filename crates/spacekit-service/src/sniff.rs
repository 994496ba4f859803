//! Read just enough of an inbound stream to route it.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use spacekit_proto::{ParseResult, SniffError};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ServiceError;

const INITIAL_BUFFER_SIZE: usize = 2048;

/// Buffer reads from `stream` until `parse` completes, fails, or `timeout` passes.
///
/// Returns the parsed value and every byte read so far, which the caller
/// replays in front of the stream.
pub async fn sniff<S, T, F>(
    stream: &mut S,
    timeout: Duration,
    mut parse: F,
) -> Result<(T, Bytes), ServiceError>
where
    S: AsyncRead + Unpin,
    F: FnMut(&[u8]) -> ParseResult<T>,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_SIZE);
    let read = async {
        loop {
            if !buf.is_empty() {
                match parse(&buf) {
                    ParseResult::Complete(value) => return Ok(value),
                    ParseResult::Incomplete(_) => {}
                    ParseResult::Invalid(e) => return Err(ServiceError::Sniff(e)),
                }
            }
            if stream.read_buf(&mut buf).await? == 0 {
                return Err(ServiceError::Io(io::ErrorKind::UnexpectedEof.into()));
            }
        }
    };
    let value = tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| ServiceError::Timeout("sniff"))??;
    Ok((value, buf.freeze()))
}

/// Metric label for a failed sniff.
pub fn failure_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::Sniff(SniffError::HeaderTooLong) => "header_too_long",
        ServiceError::Sniff(SniffError::NoHostname) => "no_hostname",
        ServiceError::Sniff(SniffError::NotTls) => "not_tls",
        ServiceError::Sniff(SniffError::Malformed) => "malformed",
        ServiceError::Timeout(_) => "timeout",
        ServiceError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => "eof",
        _ => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacekit_proto::parse_http_head;
    use tokio::io::AsyncWriteExt;

    fn host_of(buf: &[u8]) -> ParseResult<String> {
        match parse_http_head(buf, 64) {
            ParseResult::Complete(head) => ParseResult::Complete(head.hostname()),
            ParseResult::Incomplete(n) => ParseResult::Incomplete(n),
            ParseResult::Invalid(e) => ParseResult::Invalid(e),
        }
    }

    #[tokio::test]
    async fn returns_value_and_consumed_bytes() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HTTP/1.1\r\nHo").await.unwrap();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            client.write_all(b"st: Example.com\r\n\r\n").await.unwrap();
            client
        });

        let (host, prefix) = sniff(&mut server, Duration::from_secs(5), host_of).await.unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(&prefix[..], b"GET / HTTP/1.1\r\nHost: Example.com\r\n\r\n");
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn oversized_head_fails() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(&[b'a'; 100]).await.unwrap();
        let err = sniff(&mut server, Duration::from_secs(5), host_of).await.unwrap_err();
        assert_eq!(failure_reason(&err), "header_too_long");
        assert_eq!(err.to_string(), "header too long");
    }

    #[tokio::test]
    async fn early_eof_fails() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"GET / HT").await.unwrap();
        drop(client);
        let err = sniff(&mut server, Duration::from_secs(5), host_of).await.unwrap_err();
        assert_eq!(failure_reason(&err), "eof");
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let (_client, mut server) = tokio::io::duplex(1024);
        let err = sniff(&mut server, Duration::from_millis(20), host_of).await.unwrap_err();
        assert_eq!(failure_reason(&err), "timeout");
    }
}
