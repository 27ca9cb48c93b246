//! Local interface enumeration.

use std::net::Ipv4Addr;

use unn_common::Candidate;

/// One host candidate per non-loopback IPv4 interface address, at the
/// given bound port.
pub fn host_candidates(port: u16) -> Vec<Candidate> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .filter(|v4| !v4.is_loopback())
        .map(|v4: Ipv4Addr| Candidate::host(v4, port))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_returns_loopback_candidates() {
        for candidate in host_candidates(4455) {
            assert!(!candidate.addr.is_loopback());
        }
    }
}
