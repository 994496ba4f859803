//! Caching resolver backed by hickory-resolver.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use hickory_proto::xfer::Protocol;
use hickory_resolver::Resolver;
use hickory_resolver::config::{
    NameServerConfig, NameServerConfigGroup, ResolverConfig, ResolverOpts,
};
use hickory_resolver::name_server::TokioConnectionProvider;
use tracing::debug;

use crate::config::{DnsConfig, DnsStrategy};
use crate::error::DnsError;

const DEFAULT_DNS_PORT: u16 = 53;

/// Shared resolver. Cheap to clone.
#[derive(Clone)]
pub struct DnsResolver {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Resolver<TokioConnectionProvider>,
    prefer_ipv4: bool,
}

impl std::fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsResolver")
            .field("prefer_ipv4", &self.inner.prefer_ipv4)
            .finish()
    }
}

impl DnsResolver {
    pub fn new(config: &DnsConfig) -> Result<Self, DnsError> {
        let mut builder = match config.strategy {
            DnsStrategy::System => Resolver::builder_tokio()
                .map_err(|e| DnsError::BadNameserver(format!("system config: {e}")))?,
            DnsStrategy::Custom => {
                let name_servers = parse_server_urls(&config.servers)?;
                Resolver::builder_with_config(
                    ResolverConfig::from_parts(None, vec![], name_servers),
                    TokioConnectionProvider::default(),
                )
            }
        };
        let opts: &mut ResolverOpts = builder.options_mut();
        opts.cache_size = config.cache_size;

        Ok(Self {
            inner: Arc::new(Inner {
                resolver: builder.build(),
                prefer_ipv4: config.prefer_ipv4,
            }),
        })
    }

    /// Resolve `"host:port"`. IP literals skip the lookup.
    pub async fn resolve(&self, addr: &str) -> Result<SocketAddr, DnsError> {
        if let Ok(sa) = addr.parse::<SocketAddr>() {
            return Ok(sa);
        }
        let (host, port) = split_host_port(addr)?;
        let ip = self.resolve_host(host).await?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Resolve a bare hostname to one address, honoring `prefer_ipv4`.
    pub async fn resolve_host(&self, host: &str) -> Result<IpAddr, DnsError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }
        let response = self.inner.resolver.lookup_ip(host).await?;
        let ip = if self.inner.prefer_ipv4 {
            response
                .iter()
                .find(IpAddr::is_ipv4)
                .or_else(|| response.iter().next())
        } else {
            response.iter().next()
        };
        match ip {
            Some(ip) => {
                debug!(host, resolved = %ip, "dns resolved");
                Ok(ip)
            }
            None => Err(DnsError::NoRecords(host.to_string())),
        }
    }

    /// First IPv4 address of `host`, for A records.
    pub async fn resolve_ipv4(&self, host: &str) -> Result<Ipv4Addr, DnsError> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(ip);
        }
        let response = self.inner.resolver.ipv4_lookup(host).await?;
        response
            .iter()
            .next()
            .map(|a| a.0)
            .ok_or_else(|| DnsError::NoRecords(host.to_string()))
    }
}

/// Split `"host:port"`, accepting `"[::1]:443"` for IPv6.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), DnsError> {
    let invalid = || DnsError::BadAddress(addr.to_string());
    let (host, port) = match addr.strip_prefix('[') {
        Some(rest) => rest.split_once("]:").ok_or_else(invalid)?,
        None => addr.rsplit_once(':').ok_or_else(invalid)?,
    };
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    Ok((host, port))
}

/// Parse `udp://` and `tcp://` nameserver URLs.
fn parse_server_urls(urls: &[String]) -> Result<NameServerConfigGroup, DnsError> {
    let mut configs = Vec::with_capacity(urls.len());
    for url in urls {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| DnsError::BadNameserver(format!("missing scheme: {url}")))?;
        let protocol = match scheme {
            "udp" => Protocol::Udp,
            "tcp" => Protocol::Tcp,
            _ => {
                return Err(DnsError::BadNameserver(format!(
                    "unsupported protocol: {scheme}"
                )));
            }
        };
        if rest.contains('/') {
            return Err(DnsError::BadNameserver(format!("unexpected path: {url}")));
        }
        let socket_addr = match rest.parse::<SocketAddr>() {
            Ok(sa) => sa,
            Err(_) => {
                let ip = rest
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .parse::<IpAddr>()
                    .map_err(|_| DnsError::BadNameserver(format!("server must be an IP: {url}")))?;
                SocketAddr::new(ip, DEFAULT_DNS_PORT)
            }
        };
        configs.push(NameServerConfig::new(socket_addr, protocol));
    }
    if configs.is_empty() {
        return Err(DnsError::BadNameserver("no dns servers configured".to_string()));
    }
    Ok(NameServerConfigGroup::from(configs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_host_port_variants() {
        assert_eq!(split_host_port("api.spacekit.io:443").unwrap(), ("api.spacekit.io", 443));
        assert_eq!(split_host_port("[::1]:8080").unwrap(), ("::1", 8080));
        split_host_port("api.spacekit.io").unwrap_err();
        split_host_port(":80").unwrap_err();
        split_host_port("host:http").unwrap_err();
    }

    #[test]
    fn server_urls() {
        let urls = vec![
            "udp://8.8.8.8".to_string(),
            "tcp://1.1.1.1:5353".to_string(),
            "udp://[2001:4860:4860::8888]".to_string(),
        ];
        assert_eq!(parse_server_urls(&urls).unwrap().len(), 3);
    }

    #[test]
    fn server_urls_rejected() {
        parse_server_urls(&["ftp://8.8.8.8".to_string()]).unwrap_err();
        parse_server_urls(&["udp://dns.google".to_string()]).unwrap_err();
        parse_server_urls(&[]).unwrap_err();
    }

    #[tokio::test]
    async fn literals_skip_lookup() {
        let resolver = DnsResolver::new(&DnsConfig::default()).unwrap();
        assert_eq!(
            resolver.resolve("127.0.0.1:8080").await.unwrap(),
            "127.0.0.1:8080".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(
            resolver.resolve_ipv4("10.0.0.1").await.unwrap(),
            Ipv4Addr::new(10, 0, 0, 1)
        );
    }
}
