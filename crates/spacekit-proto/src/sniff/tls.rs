//! TLS ClientHello sniffing: server name indication.
//!
//! Only the plaintext handshake records in front of the stream are read. A
//! ClientHello split across several records is reassembled.

use super::SniffError;
use crate::ParseResult;

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXTENSION_SERVER_NAME: u16 = 0x0000;
const NAME_TYPE_HOST_NAME: u8 = 0x00;
const RECORD_HEADER_LEN: usize = 5;
const MAX_RECORD_LEN: usize = 16384 + 2048;

/// Extract the SNI hostname (lowercased) from buffered ClientHello records.
///
/// A hello without a server_name extension yields `NoHostname`; anything that
/// is not a TLS handshake yields `NotTls`.
pub fn parse_client_hello(buf: &[u8], max_header_bytes: usize) -> ParseResult<String> {
    let mut handshake = Vec::new();
    let mut offset = 0;

    loop {
        let Some(header) = buf.get(offset..offset + RECORD_HEADER_LEN) else {
            return need(offset + RECORD_HEADER_LEN, max_header_bytes);
        };
        if header[0] != CONTENT_TYPE_HANDSHAKE || header[1] != 0x03 {
            return ParseResult::Invalid(SniffError::NotTls);
        }
        let record_len = usize::from(u16::from_be_bytes([header[3], header[4]]));
        if record_len == 0 || record_len > MAX_RECORD_LEN {
            return ParseResult::Invalid(SniffError::Malformed);
        }
        let body_start = offset + RECORD_HEADER_LEN;
        let Some(fragment) = buf.get(body_start..body_start + record_len) else {
            return need(body_start + record_len, max_header_bytes);
        };
        handshake.extend_from_slice(fragment);
        offset = body_start + record_len;

        if handshake.len() < 4 {
            continue;
        }
        if handshake[0] != HANDSHAKE_CLIENT_HELLO {
            return ParseResult::Invalid(SniffError::Malformed);
        }
        let hello_len = (usize::from(handshake[1]) << 16)
            | (usize::from(handshake[2]) << 8)
            | usize::from(handshake[3]);
        if handshake.len() >= 4 + hello_len {
            return match server_name(&handshake[4..4 + hello_len]) {
                Ok(Some(name)) => ParseResult::Complete(name),
                Ok(None) => ParseResult::Invalid(SniffError::NoHostname),
                Err(e) => ParseResult::Invalid(e),
            };
        }
    }
}

fn need(total: usize, max_header_bytes: usize) -> ParseResult<String> {
    if total > max_header_bytes {
        ParseResult::Invalid(SniffError::HeaderTooLong)
    } else {
        ParseResult::Incomplete(total)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], SniffError> {
        if self.buf.len() < n {
            return Err(SniffError::Malformed);
        }
        let (head, rest) = self.buf.split_at(n);
        self.buf = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, SniffError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SniffError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn vec_u8(&mut self) -> Result<&'a [u8], SniffError> {
        let len = usize::from(self.u8()?);
        self.take(len)
    }

    fn vec_u16(&mut self) -> Result<&'a [u8], SniffError> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

fn server_name(hello: &[u8]) -> Result<Option<String>, SniffError> {
    let mut r = Reader { buf: hello };
    r.take(2)?; // legacy_version
    r.take(32)?; // random
    r.vec_u8()?; // session id
    r.vec_u16()?; // cipher suites
    r.vec_u8()?; // compression methods
    if r.is_empty() {
        return Ok(None);
    }

    let mut extensions = Reader { buf: r.vec_u16()? };
    while !extensions.is_empty() {
        let kind = extensions.u16()?;
        let data = extensions.vec_u16()?;
        if kind != EXTENSION_SERVER_NAME {
            continue;
        }
        let mut list = Reader { buf: data };
        let mut names = Reader { buf: list.vec_u16()? };
        while !names.is_empty() {
            let name_type = names.u8()?;
            let name = names.vec_u16()?;
            if name_type == NAME_TYPE_HOST_NAME {
                let name = std::str::from_utf8(name).map_err(|_| SniffError::Malformed)?;
                if name.is_empty() || !name.is_ascii() {
                    return Err(SniffError::Malformed);
                }
                return Ok(Some(name.to_ascii_lowercase()));
            }
        }
    }
    Ok(None)
}
