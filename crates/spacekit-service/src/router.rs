//! Routing decisions for sniffed inbound connections.

use std::sync::Arc;

use spacekit_proto::ACME_CHALLENGE_PREFIX;
use spacekit_transport::ChannelHandle;

use crate::registry::RelayRegistry;

const ONLY_ACME: &str = "Only ACME requests supported";
const NO_RELAYS: &str = "No relays available";

/// Where a TLS connection goes, by SNI.
#[derive(Debug)]
pub enum SecureRoute {
    Api,
    Web,
    Relay(ChannelHandle),
    Unknown,
}

/// What happens to a plaintext request, by Host and path.
#[derive(Debug)]
pub enum InsecureRoute {
    /// Own hostname, any path but an ACME challenge.
    Redirect(String),
    /// Own hostname, ACME challenge path.
    NotFound,
    /// Relay hostname with a challenge path and a live relay.
    Relay(ChannelHandle),
    /// Canned error response.
    Reject(&'static str),
}

impl InsecureRoute {
    /// Raw HTTP response for the non-relay outcomes.
    pub fn response(&self) -> Option<String> {
        match self {
            InsecureRoute::Redirect(location) => Some(format!(
                "HTTP/1.1 301 Moved Permanently\r\nLocation: {location}\r\nContent-Length: 0\r\n\r\n"
            )),
            InsecureRoute::NotFound => {
                Some("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n".to_string())
            }
            InsecureRoute::Reject(message) => Some(error_response(message)),
            InsecureRoute::Relay(_) => None,
        }
    }
}

/// `HTTP/1.1 500 <message>` with the message repeated as the body.
pub fn error_response(message: &str) -> String {
    format!("HTTP/1.1 500 {message}\r\n\r\n{message}")
}

#[derive(Debug, Clone)]
pub struct Router {
    root_domain: String,
    api_hostname: String,
    web_hostname: String,
    registry: Arc<RelayRegistry>,
}

impl Router {
    pub fn new(
        root_domain: String,
        api_hostname: String,
        web_hostname: String,
        registry: Arc<RelayRegistry>,
    ) -> Self {
        Self {
            root_domain,
            api_hostname,
            web_hostname,
            registry,
        }
    }

    /// Domain relay hostnames live under: `<subdomain>.<username>.<root>`.
    pub fn root_domain(&self) -> &str {
        &self.root_domain
    }

    pub fn api_hostname(&self) -> &str {
        &self.api_hostname
    }

    pub fn web_hostname(&self) -> &str {
        &self.web_hostname
    }

    pub fn registry(&self) -> &Arc<RelayRegistry> {
        &self.registry
    }

    fn is_own(&self, hostname: &str) -> bool {
        hostname == self.api_hostname || hostname == self.web_hostname
    }

    pub fn route_secure(&self, hostname: &str) -> SecureRoute {
        if hostname == self.api_hostname {
            SecureRoute::Api
        } else if hostname == self.web_hostname {
            SecureRoute::Web
        } else {
            match self.registry.lookup(hostname) {
                Some(channel) => SecureRoute::Relay(channel),
                None => SecureRoute::Unknown,
            }
        }
    }

    pub fn route_insecure(&self, hostname: &str, path: &str) -> InsecureRoute {
        let acme = path.starts_with(ACME_CHALLENGE_PREFIX);
        if self.is_own(hostname) {
            return if acme {
                InsecureRoute::NotFound
            } else {
                InsecureRoute::Redirect(format!("https://{hostname}{path}"))
            };
        }
        if !acme {
            return InsecureRoute::Reject(ONLY_ACME);
        }
        match self.registry.lookup(hostname) {
            Some(channel) => InsecureRoute::Relay(channel),
            None => InsecureRoute::Reject(NO_RELAYS),
        }
    }
}
