//! TCP simultaneous-open fallback, for environments where UDP is
//! blocked. Binds the same local port for a listener and for every
//! outbound dial via `SO_REUSEADDR`/`SO_REUSEPORT`; whichever side
//! establishes first wins and the rest are dropped.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use futures::future::select_ok;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

use unn_common::{Candidate, UnnError};

const DIAL_TIMEOUT: Duration = Duration::from_secs(2);
const DIAL_ATTEMPTS: usize = 5;

fn bind_reusable(local_port: u16) -> Result<Socket, UnnError> {
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| UnnError::Transport(format!("failed to create TCP socket: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| UnnError::Transport(format!("SO_REUSEADDR failed: {e}")))?;
    #[cfg(unix)]
    socket
        .set_reuse_port(true)
        .map_err(|e| UnnError::Transport(format!("SO_REUSEPORT failed: {e}")))?;

    let local_addr: SocketAddr = ([0, 0, 0, 0], local_port).into();
    socket
        .bind(&local_addr.into())
        .map_err(|e| UnnError::Transport(format!("bind to port {local_port} failed: {e}")))?;
    Ok(socket)
}

fn bind_listener(local_port: u16) -> Result<TcpListener, UnnError> {
    let socket = bind_reusable(local_port)?;
    socket
        .listen(1)
        .map_err(|e| UnnError::Transport(format!("listen failed: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| UnnError::Transport(format!("set_nonblocking failed: {e}")))?;
    TcpListener::from_std(socket.into())
        .map_err(|e| UnnError::Transport(format!("tokio listener setup failed: {e}")))
}

fn dial_blocking(local_port: u16, remote: SocketAddr) -> Result<std::net::TcpStream, UnnError> {
    let socket = bind_reusable(local_port)?;
    let addr: SockAddr = remote.into();
    socket
        .connect_timeout(&addr, DIAL_TIMEOUT)
        .map_err(|e| UnnError::Transport(format!("TCP dial to {remote} failed: {e}")))?;
    Ok(socket.into())
}

async fn dial(local_port: u16, remote: SocketAddr) -> Result<TcpStream, UnnError> {
    let std_stream = tokio::task::spawn_blocking(move || dial_blocking(local_port, remote))
        .await
        .map_err(|e| UnnError::Transport(format!("dial task panicked: {e}")))??;
    std_stream
        .set_nonblocking(true)
        .map_err(|e| UnnError::Transport(format!("set_nonblocking failed: {e}")))?;
    TcpStream::from_std(std_stream)
        .map_err(|e| UnnError::Transport(format!("tokio stream setup failed: {e}")))
}

/// Race a listener against up to five parallel dials to `candidates`,
/// all sharing `local_port`. The first connection established wins.
pub async fn punch_tcp(local_port: u16, candidates: &[Candidate]) -> Result<TcpStream, UnnError> {
    let listener = bind_listener(local_port)?;

    let dial_futs: Vec<Pin<Box<dyn Future<Output = Result<TcpStream, UnnError>> + Send>>> =
        candidates
            .iter()
            .take(DIAL_ATTEMPTS)
            .map(|c| {
                let remote = c.socket_addr();
                Box::pin(dial(local_port, remote)) as _
            })
            .collect();
    let has_dials = !dial_futs.is_empty();

    tokio::select! {
        accepted = listener.accept() => {
            let (stream, _) = accepted.map_err(|e| UnnError::Transport(format!("TCP accept failed: {e}")))?;
            Ok(stream)
        }
        dialed = select_ok(dial_futs), if has_dials => {
            dialed.map(|(stream, _rest)| stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn dial_wins_against_empty_listener() {
        let acceptor = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let acceptor_port = acceptor.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = acceptor.accept().await;
        });

        let candidate = Candidate::host(Ipv4Addr::new(127, 0, 0, 1), acceptor_port);
        // local_port 0 lets the kernel pick an ephemeral port for our own
        // side; SO_REUSEADDR/SO_REUSEPORT are irrelevant to this assertion,
        // only that a dial to a listening peer succeeds.
        let result = punch_tcp(0, &[candidate]).await;
        assert!(result.is_ok());
    }
}
