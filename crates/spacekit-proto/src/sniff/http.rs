//! HTTP request-head sniffing: `Host` header and request path.

use super::{SniffError, normalize_host};
use crate::ParseResult;

/// What routing needs from a plaintext HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead<'a> {
    /// Raw `Host` header value, trimmed.
    pub host: &'a str,
    /// Request target from the request line; empty when the line is not parseable.
    pub path: &'a str,
}

impl HttpHead<'_> {
    /// Host without port, lowercased.
    pub fn hostname(&self) -> String {
        normalize_host(self.host)
    }
}

/// Look for a `Host` header in the buffered request head.
///
/// A `Host` line wins as soon as it is complete, even before the end of the
/// head arrives. Without one, the head is rejected once it exceeds
/// `max_header_bytes` (`HeaderTooLong`) or once the blank line ending the head
/// has been seen (`NoHostname`).
pub fn parse_http_head(buf: &[u8], max_header_bytes: usize) -> ParseResult<HttpHead<'_>> {
    let head_end = find(buf, b"\r\n\r\n");
    let scan = match head_end {
        Some(end) => &buf[..end + 2],
        None => buf,
    };

    let mut lines = CompleteLines { rest: scan };
    let mut path = "";
    if let Some(first) = lines.next() {
        path = request_path(first);
        if let Some(host) = host_value(first) {
            return ParseResult::Complete(HttpHead { host, path });
        }
    }
    for line in lines {
        if let Some(host) = host_value(line) {
            return ParseResult::Complete(HttpHead { host, path });
        }
    }

    if buf.len() > max_header_bytes {
        ParseResult::Invalid(SniffError::HeaderTooLong)
    } else if head_end.is_some() {
        ParseResult::Invalid(SniffError::NoHostname)
    } else {
        ParseResult::Incomplete(buf.len() + 1)
    }
}

/// Iterator over CRLF-terminated lines; an unterminated tail is not yielded.
struct CompleteLines<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for CompleteLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let end = find(self.rest, b"\r\n")?;
        let line = &self.rest[..end];
        self.rest = &self.rest[end + 2..];
        Some(line)
    }
}

fn host_value(line: &[u8]) -> Option<&str> {
    if line.len() < 5 || !line[..5].eq_ignore_ascii_case(b"host:") {
        return None;
    }
    let value = std::str::from_utf8(&line[5..]).ok()?.trim();
    (!value.is_empty()).then_some(value)
}

fn request_path(line: &[u8]) -> &str {
    let Ok(line) = std::str::from_utf8(line) else {
        return "";
    };
    let mut parts = line.split_ascii_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(_))
            if method.bytes().all(|b| b.is_ascii_alphabetic()) =>
        {
            target
        }
        _ => "",
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
