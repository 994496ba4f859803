//! Port mapping table: tunnel source port -> local destination.
//!
//! Strings follow `[sourcePort:][hostname:]destinationPort`. The source port
//! defaults to 443 and the hostname to `localhost`; IPv6 literals go in
//! brackets.
//!
//! ```
//! use spacekit_relay::PortMap;
//!
//! let mut map = PortMap::new();
//! map.add_from_string("8000:example.com:9000").unwrap();
//! let mapping = map.get(8000).unwrap();
//! assert_eq!(mapping.hostname, "example.com");
//! assert_eq!(mapping.destination_port, 9000);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use spacekit_core::{DEFAULT_MAPPING_HOST, DEFAULT_SECURE_PORT};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortMapError {
    #[error("unable to parse the port mapping \"{0}\"")]
    Parse(String),
    #[error("the port mapping \"{mapping}\" would overwrite the previous mapping of \"{existing}\"")]
    Conflict { mapping: String, existing: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub source_port: u16,
    pub hostname: String,
    pub destination_port: u16,
    /// The string this mapping was parsed from.
    pub raw: String,
}

impl PortMapping {
    pub fn parse(s: &str) -> Result<Self, PortMapError> {
        parse_port_string(s).ok_or_else(|| PortMapError::Parse(s.to_string()))
    }

    /// `host:port` for connecting, bracketing IPv6 literals.
    pub fn destination(&self) -> String {
        format!("{}:{}", bracketed(&self.hostname), self.destination_port)
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.source_port,
            bracketed(&self.hostname),
            self.destination_port
        )
    }
}

fn bracketed(host: &str) -> std::borrow::Cow<'_, str> {
    if host.contains(':') {
        format!("[{host}]").into()
    } else {
        host.into()
    }
}

fn port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok().filter(|&p| p != 0)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_port_string(s: &str) -> Option<PortMapping> {
    let (rest, destination) = match s.rsplit_once(':') {
        Some((rest, dest)) => (Some(rest), dest),
        None => (None, s),
    };
    let destination_port = port(destination)?;

    let (source, host) = match rest {
        None => (None, ""),
        Some(rest) if is_digits(rest) => (Some(rest), ""),
        Some(rest) => match rest.split_once(':') {
            Some((source, host)) if is_digits(source) => (Some(source), host),
            _ => (None, rest),
        },
    };
    let source_port = match source {
        Some(source) => port(source)?,
        None => DEFAULT_SECURE_PORT,
    };

    let host = host.strip_prefix('[').unwrap_or(host);
    let host = host.strip_suffix(']').unwrap_or(host);
    let hostname = if host.is_empty() {
        DEFAULT_MAPPING_HOST.to_string()
    } else {
        host.to_string()
    };

    Some(PortMapping {
        source_port,
        hostname,
        destination_port,
        raw: s.to_string(),
    })
}

/// At most one mapping per source port.
#[derive(Debug, Clone, Default)]
pub struct PortMap {
    mapping: BTreeMap<u16, PortMapping>,
}

impl PortMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and insert. Fails on bad syntax or an already mapped source port.
    pub fn add_from_string(&mut self, s: &str) -> Result<&PortMapping, PortMapError> {
        let mapping = PortMapping::parse(s)?;
        if let Some(existing) = self.mapping.get(&mapping.source_port) {
            return Err(PortMapError::Conflict {
                mapping: s.to_string(),
                existing: existing.raw.clone(),
            });
        }
        Ok(self.mapping.entry(mapping.source_port).or_insert(mapping))
    }

    pub fn get(&self, source_port: u16) -> Option<&PortMapping> {
        self.mapping.get(&source_port)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Mappings ordered by source port.
    pub fn iter(&self) -> impl Iterator<Item = &PortMapping> {
        self.mapping.values()
    }
}

impl<'a> TryFrom<&'a [String]> for PortMap {
    type Error = PortMapError;

    fn try_from(strings: &'a [String]) -> Result<Self, Self::Error> {
        let mut map = PortMap::new();
        for s in strings {
            map.add_from_string(s)?;
        }
        Ok(map)
    }
}
