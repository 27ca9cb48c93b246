//! Stream-as-connection adapter: wraps one QUIC bidirectional stream as
//! a plain byte stream so `russh` can run its transport generic over it
//! exactly as it would over a TCP socket.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use quinn::{Connection, RecvStream, SendStream};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use unn_common::UnnError;

/// One QUIC bidirectional stream, read/write halves glued into a single
/// `AsyncRead + AsyncWrite` object plus the cached peer address.
pub struct QuicDuplex {
    send: SendStream,
    recv: RecvStream,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
}

impl QuicDuplex {
    /// Open a new bidirectional stream on an established connection — the
    /// room/person side that initiates the inner SSH session.
    pub async fn open(conn: &Connection) -> Result<Self, UnnError> {
        let (send, recv) = conn
            .open_bi()
            .await
            .map_err(|e| UnnError::Transport(format!("failed to open QUIC stream: {e}")))?;
        Ok(Self {
            send,
            recv,
            local_addr: conn.local_ip().map(|ip| (ip, 0).into()).unwrap_or(conn.remote_address()),
            remote_addr: conn.remote_address(),
        })
    }

    /// Accept the next bidirectional stream on an established connection
    /// — the side that waits for the inner SSH session to begin.
    pub async fn accept(conn: &Connection) -> Result<Self, UnnError> {
        let (send, recv) = conn
            .accept_bi()
            .await
            .map_err(|e| UnnError::Transport(format!("failed to accept QUIC stream: {e}")))?;
        Ok(Self {
            send,
            recv,
            local_addr: conn.local_ip().map(|ip| (ip, 0).into()).unwrap_or(conn.remote_address()),
            remote_addr: conn.remote_address(),
        })
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl AsyncRead for QuicDuplex {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl AsyncWrite for QuicDuplex {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.send).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.send).poll_shutdown(cx)
    }
}
