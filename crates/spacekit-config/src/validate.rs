//! Configuration validation logic.

use std::net::SocketAddr;

use crate::loader::ConfigError;
use crate::types::{ReconnectConfig, RelayFileConfig, ServiceConfig};

const MIN_HEADER_BYTES: usize = 256;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn check_label(field: &str, value: &str) -> Result<(), ConfigError> {
    let ok = !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(invalid(format!("{field} is not a valid dns label: {value:?}")))
    }
}

pub fn validate_service_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.host.trim().is_empty() {
        return Err(invalid("host is empty"));
    }
    for label in config.host.split('.') {
        check_label("host", label)?;
    }
    check_label("api", &config.api)?;
    check_label("web", &config.web)?;
    if config.api.eq_ignore_ascii_case(&config.web) {
        return Err(invalid("api and web must differ"));
    }
    for (field, addr) in [
        ("listen.secure", &config.listen.secure),
        ("listen.insecure", &config.listen.insecure),
    ] {
        addr.parse::<SocketAddr>()
            .map_err(|e| invalid(format!("{field} {addr:?}: {e}")))?;
    }
    if config.listen.backlog == 0 {
        return Err(invalid("listen.backlog must be > 0"));
    }
    for (field, path) in [
        ("tls.api.cert", &config.tls.api.cert),
        ("tls.api.key", &config.tls.api.key),
        ("tls.web.cert", &config.tls.web.cert),
        ("tls.web.key", &config.tls.web.key),
    ] {
        if path.as_os_str().is_empty() {
            return Err(invalid(format!("{field} is empty")));
        }
    }
    for (field, backend) in [("fallback.api", &config.fallback.api), ("fallback.web", &config.fallback.web)] {
        if let Some(backend) = backend
            && !backend.contains(':')
        {
            return Err(invalid(format!("{field} must be host:port, got {backend:?}")));
        }
    }
    for user in &config.auth.users {
        if user.username.is_empty() {
            return Err(invalid("auth.users: empty username"));
        }
        if !user.apikey_hash.contains('$') {
            return Err(invalid(format!(
                "auth.users: apikey_hash of {} is not <salt>$<digest>",
                user.username
            )));
        }
    }
    if config.max_header_bytes < MIN_HEADER_BYTES {
        return Err(invalid(format!("max_header_bytes too small (min {MIN_HEADER_BYTES})")));
    }
    if config.tls_handshake_timeout_secs == 0 {
        return Err(invalid("tls_handshake_timeout_secs must be > 0"));
    }
    if config.sniff_timeout_secs == 0 {
        return Err(invalid("sniff_timeout_secs must be > 0"));
    }
    if config.ws_max_frame_bytes < 1024 {
        return Err(invalid("ws_max_frame_bytes must be >= 1024"));
    }
    Ok(())
}

pub fn validate_reconnect(config: &ReconnectConfig) -> Result<(), ConfigError> {
    if config.initial_delay_ms == 0 {
        return Err(invalid("reconnect.initial_delay_ms must be > 0"));
    }
    if config.max_delay_ms < config.initial_delay_ms {
        return Err(invalid("reconnect.max_delay_ms must be >= initial_delay_ms"));
    }
    if !(0.0..=1.0).contains(&config.randomization) {
        return Err(invalid("reconnect.randomization must be within 0..=1"));
    }
    Ok(())
}

pub fn validate_relay_config(config: &RelayFileConfig) -> Result<(), ConfigError> {
    validate_reconnect(&config.reconnect)?;
    if config.ping_interval_secs == 0 {
        return Err(invalid("ping_interval_secs must be > 0"));
    }
    if config.connect_timeout_secs == 0 {
        return Err(invalid("connect_timeout_secs must be > 0"));
    }
    if let Some(relay) = &config.relay {
        check_label("relay", relay)?;
    }
    if let Some(username) = &config.username {
        check_label("username", username)?;
    }
    Ok(())
}
