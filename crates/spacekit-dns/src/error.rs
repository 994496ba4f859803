#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("{0} has no A/AAAA records")]
    NoRecords(String),

    #[error(transparent)]
    Lookup(#[from] hickory_resolver::ResolveError),

    /// Not `host:port` or `[v6]:port`.
    #[error("bad address {0:?}")]
    BadAddress(String),

    /// A `dns.servers` entry that is not `udp://ip[:port]` or `tcp://ip[:port]`.
    #[error("bad nameserver: {0}")]
    BadNameserver(String),
}

impl DnsError {
    #[inline]
    pub fn error_type(&self) -> &'static str {
        spacekit_core::ERROR_RESOLVE
    }
}
