//! Relay control channels: authenticate, register, run, deregister.

use std::net::SocketAddr;
use std::sync::Arc;

use spacekit_metrics::{record_auth_failure, record_error};
use spacekit_transport::{CloseCode, ControlChannel, RejectOpen, TunnelStream};
use tokio_tungstenite::tungstenite::Utf8Bytes;
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tracing::{debug, info, warn};

use crate::error::ServiceError;
use crate::state::ServiceState;
use crate::ws::accept_control;

pub async fn handle_control<S>(
    stream: S,
    state: Arc<ServiceState>,
    peer: SocketAddr,
) -> Result<(), ServiceError>
where
    S: TunnelStream,
{
    let (mut ws, creds) = accept_control(stream, state.ws_max_frame_bytes).await?;

    if let Err(err) = state.auth.verify(&creds.username, &creds.apikey).await {
        record_auth_failure();
        warn!(peer = %peer, username = %creds.username, error = %err, "relay authentication failed");
        let frame = CloseFrame {
            code: CloseCode::Policy,
            reason: Utf8Bytes::from_static("authentication failed"),
        };
        if let Err(e) = ws.close(Some(frame)).await {
            debug!(peer = %peer, error = %e, "close after failed auth");
        }
        return Ok(());
    }

    let hostname = format!(
        "{}.{}.{}",
        creds.subdomain,
        creds.username,
        state.router.root_domain()
    );
    let channel = ControlChannel::new(ws, Arc::new(RejectOpen), state.channel_config());
    let handle = channel.handle();
    state.registry().register(&hostname, handle.clone());
    info!(peer = %peer, hostname = %hostname, channel = handle.id(), "relay registered");

    if let Some(dns) = state.dynamic_dns.clone() {
        let hostname = hostname.clone();
        tokio::spawn(async move {
            match dns.register(&hostname).await {
                Ok(()) => debug!(hostname = %hostname, "dynamic dns updated"),
                Err(e) => record_error(e.error_type()),
            }
        });
    }

    let end = channel.run().await;
    state.registry().deregister(&hostname, handle.id());
    info!(peer = %peer, hostname = %hostname, channel = handle.id(), reason = %end, "relay disconnected");
    Ok(())
}
