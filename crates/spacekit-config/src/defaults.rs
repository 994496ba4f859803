//! Default value functions for serde deserialization.
//!
//! These forward to constants defined in `spacekit_core::defaults`.

use spacekit_core::defaults;

macro_rules! default_fns {
    ($($fn_name:ident => $const_name:ident : $ty:ty),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> $ty {
                defaults::$const_name
            }
        )*
    };
}

macro_rules! default_string_fns {
    ($($fn_name:ident => $const_name:ident),* $(,)?) => {
        $(
            pub(crate) fn $fn_name() -> String {
                defaults::$const_name.to_string()
            }
        )*
    };
}

default_fns! {
    default_max_header_bytes          => DEFAULT_MAX_HEADER_BYTES: usize,
    default_tls_handshake_timeout_secs => DEFAULT_TLS_HANDSHAKE_TIMEOUT_SECS: u64,
    default_sniff_timeout_secs        => DEFAULT_SNIFF_TIMEOUT_SECS: u64,
    default_ws_max_frame_bytes        => DEFAULT_WS_MAX_FRAME_BYTES: usize,
    default_connection_backlog        => DEFAULT_CONNECTION_BACKLOG: u32,
    default_shutdown_timeout_secs     => DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64,
    default_ping_interval_secs        => DEFAULT_PING_INTERVAL_SECS: u64,
    default_connect_timeout_secs      => DEFAULT_CONNECT_TIMEOUT_SECS: u64,
    default_initial_delay_ms          => DEFAULT_RECONNECT_INITIAL_DELAY_MS: u64,
    default_max_delay_ms              => DEFAULT_RECONNECT_MAX_DELAY_MS: u64,
    default_randomization             => DEFAULT_RECONNECT_RANDOMIZATION: f64,
}

default_string_fns! {
    default_host          => DEFAULT_HOST,
    default_api           => DEFAULT_API_SUBDOMAIN,
    default_web           => DEFAULT_WEB_SUBDOMAIN,
    default_secure_listen => DEFAULT_SECURE_LISTEN,
    default_insecure_listen => DEFAULT_INSECURE_LISTEN,
}
