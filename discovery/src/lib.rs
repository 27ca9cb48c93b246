//! Candidate discovery: local interface enumeration plus a hand-rolled
//! STUN client for the server-reflexive candidate.

pub mod interfaces;
pub mod stun;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;

use unn_common::Candidate;

/// Default public STUN servers, overridable via `--stun-server`.
pub const DEFAULT_STUN_SERVERS: &[&str] = &["stun.l.google.com:19302", "stun1.l.google.com:19302"];

/// Overall STUN discovery timeout.
const STUN_TIMEOUT: Duration = Duration::from_secs(3);

/// Discover every reachable candidate for `socket`'s local port: one host
/// candidate per non-loopback interface, plus a server-reflexive candidate
/// if any STUN server answers within the overall timeout. Ordered
/// server-reflexive first, duplicates removed.
pub async fn discover(socket: &UdpSocket, stun_servers: &[String]) -> Vec<Candidate> {
    let port = socket
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or_default();

    let mut candidates = interfaces::host_candidates(port);

    if let Some(reflexive) = timeout(STUN_TIMEOUT, query_stun_servers(socket, stun_servers))
        .await
        .ok()
        .flatten()
    {
        candidates.push(reflexive);
    }

    unn_common::candidate::order_and_dedup(candidates)
}

/// Try each STUN server in sequence; the first successful response wins.
/// Discovery failure (every server times out or is unreachable) is
/// non-fatal: `None` is returned and the caller falls back to host
/// candidates only.
async fn query_stun_servers(socket: &UdpSocket, servers: &[String]) -> Option<Candidate> {
    for server in servers {
        let server_addr: SocketAddr = match tokio::net::lookup_host(server).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => addr,
                None => continue,
            },
            Err(e) => {
                tracing::debug!(%server, error = %e, "failed to resolve STUN server");
                continue;
            }
        };

        match query_one_stun_server(socket, server_addr).await {
            Ok(addr) => {
                return Some(Candidate::server_reflexive(*addr.ip(), addr.port()));
            }
            Err(e) => {
                tracing::debug!(%server, error = %e, "STUN query failed");
            }
        }
    }

    None
}

async fn query_one_stun_server(
    socket: &UdpSocket,
    server_addr: SocketAddr,
) -> Result<std::net::SocketAddrV4, unn_common::UnnError> {
    let (request, txn) = stun::build_binding_request();
    socket
        .send_to(&request, server_addr)
        .await
        .map_err(|e| unn_common::UnnError::Transport(format!("STUN send failed: {e}")))?;

    let mut buf = [0u8; 512];
    let n = timeout(Duration::from_millis(900), socket.recv(&mut buf))
        .await
        .map_err(|_| unn_common::UnnError::Transport("STUN response timed out".into()))?
        .map_err(|e| unn_common::UnnError::Transport(format!("STUN recv failed: {e}")))?;

    stun::parse_binding_response(&buf[..n], &txn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovery_never_fatal_with_unreachable_servers() {
        let socket = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        // Port 9 (discard) on localhost never speaks STUN; this must not
        // hang past the overall timeout or return an Err.
        let candidates = discover(&socket, &["127.0.0.1:9".to_string()]).await;
        assert!(candidates.iter().all(|c| c.kind == unn_common::CandidateKind::Host));
    }
}
