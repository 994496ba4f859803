//! Dials the service: TCP, TLS with the service hostname as SNI, then the
//! WebSocket upgrade carrying the relay's credentials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use spacekit_proto::{HEADER_APIKEY, HEADER_SUBDOMAIN, HEADER_USERNAME, SUBPROTOCOL};
use spacekit_transport::{BoxedStream, tls, ws_config};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tracing::debug;

use crate::controller::Dialer;
use crate::error::RelayError;

pub struct ServiceDialer {
    url: String,
    service_hostname: String,
    connect_addr: String,
    subdomain: String,
    username: String,
    api_key: String,
    tls: Arc<rustls::ClientConfig>,
    connect_timeout: Duration,
    max_frame_bytes: usize,
}

impl ServiceDialer {
    /// `connect_addr` overrides where the TCP connection goes; the TLS server
    /// name and URL still use `service_hostname`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        service_hostname: String,
        connect_addr: Option<String>,
        subdomain: String,
        username: String,
        api_key: String,
        tls: Arc<rustls::ClientConfig>,
        connect_timeout: Duration,
        max_frame_bytes: usize,
    ) -> Self {
        let connect_addr = connect_addr.unwrap_or_else(|| format!("{service_hostname}:443"));
        Self {
            url: format!("wss://{service_hostname}/"),
            service_hostname,
            connect_addr,
            subdomain,
            username,
            api_key,
            tls,
            connect_timeout,
            max_frame_bytes,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn header(value: &str) -> Result<HeaderValue, RelayError> {
        HeaderValue::from_str(value).map_err(|e| RelayError::Config(format!("invalid header value: {e}")))
    }
}

#[async_trait]
impl Dialer for ServiceDialer {
    async fn dial(&self) -> Result<WebSocketStream<BoxedStream>, RelayError> {
        debug!(url = %self.url, addr = %self.connect_addr, "dialing service");
        let tcp = timeout(self.connect_timeout, TcpStream::connect(&self.connect_addr))
            .await
            .map_err(|_| RelayError::Timeout("service connect"))??;
        tcp.set_nodelay(true)?;

        let tls = timeout(
            self.connect_timeout,
            tls::connect(tcp, &self.service_hostname, self.tls.clone()),
        )
        .await
        .map_err(|_| RelayError::Timeout("service TLS handshake"))??;
        let stream: BoxedStream = Box::new(tls);

        let mut request = self.url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        headers.insert(HEADER_SUBDOMAIN, Self::header(&self.subdomain)?);
        headers.insert(HEADER_USERNAME, Self::header(&self.username)?);
        headers.insert(HEADER_APIKEY, Self::header(&self.api_key)?);

        let upgrade = tokio_tungstenite::client_async_with_config(
            request,
            stream,
            Some(ws_config(self.max_frame_bytes)),
        );
        let (ws, _response) = timeout(self.connect_timeout, upgrade)
            .await
            .map_err(|_| RelayError::Timeout("websocket upgrade"))??;
        Ok(ws)
    }
}
