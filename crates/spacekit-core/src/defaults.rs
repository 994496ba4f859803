//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Timeout Defaults
// ============================================================================

/// Default graceful shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
/// Default TLS handshake timeout on the service's own endpoints, in seconds.
pub const DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Default time allowed for a client to send enough bytes to route it.
pub const DEFAULT_SNIFF_TIMEOUT_SECS: u64 = 10;
/// Default interval between keepalive pings on the control channel.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 60;
/// Default timeout for outbound TCP connects (relay to service, relay to local targets).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Time allowed for the peer to answer a WebSocket close frame.
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 5000;

// ============================================================================
// Buffer/Size Defaults
// ============================================================================

/// Default maximum header bytes buffered while sniffing a hostname (8 KiB).
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8192;
/// Default read chunk for tunneled sockets.
pub const DEFAULT_PIPE_BUFFER_SIZE: usize = 16384;
/// Default maximum WebSocket message size on the control channel (16 MiB).
pub const DEFAULT_WS_MAX_FRAME_BYTES: usize = 16 << 20;
/// Default depth of the outbound frame queue of one control channel.
pub const DEFAULT_FRAME_QUEUE: usize = 256;
/// Peer `data` frames buffered per tunnel before the multiplexer waits for
/// the local socket to drain.
pub const DEFAULT_TUNNEL_QUEUE: usize = 32;

// ============================================================================
// Connection Defaults
// ============================================================================

/// Default TCP listener backlog.
pub const DEFAULT_CONNECTION_BACKLOG: u32 = 1024;
/// Port of the TLS listener and of TLS tunnels.
pub const DEFAULT_SECURE_PORT: u16 = 443;
/// Port of the plaintext listener and of ACME tunnels.
pub const DEFAULT_INSECURE_PORT: u16 = 80;
/// Default bind address of the service's TLS listener.
pub const DEFAULT_SECURE_LISTEN: &str = "0.0.0.0:443";
/// Default bind address of the service's plaintext listener.
pub const DEFAULT_INSECURE_LISTEN: &str = "0.0.0.0:80";

// ============================================================================
// Hostname Defaults
// ============================================================================

/// Default root domain.
pub const DEFAULT_HOST: &str = "spacekit.io";
/// Default subdomain of the service's API endpoint.
pub const DEFAULT_API_SUBDOMAIN: &str = "api";
/// Default subdomain of the service's web endpoint.
pub const DEFAULT_WEB_SUBDOMAIN: &str = "www";
/// Default destination host of a port mapping.
pub const DEFAULT_MAPPING_HOST: &str = "localhost";

// ============================================================================
// Reconnect Defaults
// ============================================================================

/// Default first reconnect delay in milliseconds.
pub const DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64 = 1000;
/// Default reconnect delay ceiling in milliseconds (5 minutes).
pub const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 300_000;
/// Default randomization factor applied to every reconnect delay.
pub const DEFAULT_RECONNECT_RANDOMIZATION: f64 = 0.4;

// ============================================================================
// Certificate Defaults
// ============================================================================

/// Renew certificates expiring within this many seconds (7 days).
pub const DEFAULT_CERT_RENEW_BEFORE_SECS: u64 = 7 * 24 * 60 * 60;
/// Retry interval while DNS for a fresh hostname has not propagated.
pub const DEFAULT_CERT_DNS_RETRY_INTERVAL_SECS: u64 = 15;
/// Give up retrying issuance after this many seconds.
pub const DEFAULT_CERT_DNS_RETRY_DEADLINE_SECS: u64 = 90;
/// Validity of self-signed certificates issued by the relay.
pub const DEFAULT_SELF_SIGNED_DAYS: u32 = 90;
/// Default directory holding issued certificates.
pub const DEFAULT_CERT_DIR: &str = "./certs";

// ============================================================================
// DNS Defaults
// ============================================================================

/// Default DNS cache capacity.
pub const DEFAULT_DNS_CACHE_SIZE: usize = 256;
