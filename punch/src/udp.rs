//! UDP simultaneous-open.
//!
//! The coordinator never waits for a reply: it fires a fixed burst at
//! every remote candidate and hands the same socket straight back to the
//! caller, who hands it to the QUIC layer. QUIC's own handshake
//! retransmission is the liveness signal; a punch ACK would only
//! duplicate it.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use unn_common::Candidate;

/// Literal punch payload. Peers must recognize and drop this prefix on
/// their QUIC receive path.
pub const PUNCH_PAYLOAD: &[u8] = b"PUNCH";

const PUNCH_INTERVAL: Duration = Duration::from_millis(100);
const PUNCH_REPETITIONS: usize = 5;

/// Fire the punch burst at every candidate in the background and return
/// immediately; `socket` remains free for the caller's own use (QUIC
/// handshake, further STUN) while the burst runs.
pub fn spawn_punch(socket: Arc<UdpSocket>, candidates: Vec<Candidate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        for rep in 0..PUNCH_REPETITIONS {
            for candidate in &candidates {
                let addr = candidate.socket_addr();
                if let Err(e) = socket.send_to(PUNCH_PAYLOAD, addr).await {
                    tracing::debug!(%addr, error = %e, "punch datagram send failed");
                }
            }
            if rep + 1 < PUNCH_REPETITIONS {
                tokio::time::sleep(PUNCH_INTERVAL).await;
            }
        }
    })
}

/// `true` if a received datagram is a punch keepalive that must be
/// dropped before reaching the QUIC decoder.
pub fn is_punch_datagram(data: &[u8]) -> bool {
    data == PUNCH_PAYLOAD
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn burst_completes_and_sends_to_every_candidate() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target.local_addr().unwrap();
        let candidate = Candidate::host(Ipv4Addr::new(127, 0, 0, 1), target_addr.port());

        spawn_punch(socket, vec![candidate]).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, _) = target.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], PUNCH_PAYLOAD);
    }

    #[test]
    fn recognizes_punch_prefix() {
        assert!(is_punch_datagram(b"PUNCH"));
        assert!(!is_punch_datagram(b"PUNCHX"));
        assert!(!is_punch_datagram(&[1, 2, 3]));
    }
}
