//! A `quinn::Endpoint` built over a socket the caller already bound and
//! used for STUN and hole-punching, so the host-reflexive mapping
//! learned during traversal is preserved across STUN, punching, and
//! QUIC.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{ClientConfig, Connecting, Connection, Endpoint, EndpointConfig, ServerConfig, TokioRuntime};

use unn_common::UnnError;

use crate::tls;

/// A QUIC endpoint that both accepts inbound connections and dials
/// outbound ones over the same underlying UDP socket.
pub struct QuicEndpoint {
    endpoint: Endpoint,
}

impl QuicEndpoint {
    /// Wrap an already-bound `std::net::UdpSocket` (the one the caller
    /// used for STUN/punching) as a dual-role QUIC endpoint.
    pub fn from_socket(socket: std::net::UdpSocket) -> Result<Self, UnnError> {
        let (server_config, client_config) = tls::self_signed_configs()?;
        let mut endpoint = Endpoint::new(
            EndpointConfig::default(),
            Some(server_config),
            socket,
            Arc::new(TokioRuntime),
        )
        .map_err(|e| UnnError::Transport(format!("failed to build QUIC endpoint: {e}")))?;
        endpoint.set_default_client_config(client_config);

        Ok(Self { endpoint })
    }

    /// Accept the next inbound connection; `None` if the endpoint has
    /// been closed.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    /// Dial `addr`, applying the handshake timeout.
    pub async fn connect(&self, addr: SocketAddr) -> Result<Connection, UnnError> {
        let connecting: Connecting = self
            .endpoint
            .connect(addr, "unn.local")
            .map_err(|e| UnnError::Transport(format!("QUIC connect setup failed: {e}")))?;

        tokio::time::timeout(tls::handshake_timeout(), connecting)
            .await
            .map_err(|_| UnnError::Transport("QUIC handshake timed out".into()))?
            .map_err(|e| UnnError::Transport(format!("QUIC handshake failed: {e}")))
    }

    /// Dial with an explicit client config, for callers that need a
    /// configuration distinct from the endpoint's default (tests mostly).
    pub async fn connect_with(
        &self,
        client_config: ClientConfig,
        addr: SocketAddr,
    ) -> Result<Connection, UnnError> {
        let connecting = self
            .endpoint
            .connect_with(client_config, addr, "unn.local")
            .map_err(|e| UnnError::Transport(format!("QUIC connect setup failed: {e}")))?;

        tokio::time::timeout(tls::handshake_timeout(), connecting)
            .await
            .map_err(|_| UnnError::Transport("QUIC handshake timed out".into()))?
            .map_err(|e| UnnError::Transport(format!("QUIC handshake failed: {e}")))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, UnnError> {
        self.endpoint
            .local_addr()
            .map_err(|e| UnnError::Transport(format!("failed to read local address: {e}")))
    }

    /// Swap in a fresh server config (tests that need a second endpoint
    /// with its own self-signed identity).
    pub fn set_server_config(&mut self, config: ServerConfig) {
        self.endpoint.set_server_config(Some(config));
    }

    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"closing");
    }
}
