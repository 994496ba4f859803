//! `error_type` labels.
//!
//! Every crate's error enum maps its variants onto one of these strings, which
//! become the `type` label on the `spacekit_errors_total` counter and the
//! `error_type` field in logs.

// Connection setup.
pub const ERROR_TLS_HANDSHAKE: &str = "tls_handshake";
pub const ERROR_RESOLVE: &str = "resolve";
pub const ERROR_TIMEOUT: &str = "timeout";
pub const ERROR_IO: &str = "io";

// Control channel.
pub const ERROR_PROTOCOL: &str = "protocol";
pub const ERROR_TRANSPORT: &str = "transport";
pub const ERROR_AUTH: &str = "auth";
/// The relay was asked to open a port it has no mapping for.
pub const ERROR_NO_MAPPING: &str = "no_mapping";

// Relay-local.
pub const ERROR_CERTIFICATE: &str = "certificate";
pub const ERROR_CONFIG: &str = "config";

/// All labels, for pre-registering metric series.
pub const ERROR_TYPES: [&str; 10] = [
    ERROR_TLS_HANDSHAKE,
    ERROR_RESOLVE,
    ERROR_TIMEOUT,
    ERROR_IO,
    ERROR_PROTOCOL,
    ERROR_TRANSPORT,
    ERROR_AUTH,
    ERROR_NO_MAPPING,
    ERROR_CERTIFICATE,
    ERROR_CONFIG,
];
