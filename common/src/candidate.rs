//! Candidate parsing and formatting.
//!
//! A candidate is reachability information for one local UDP endpoint: a
//! kind (`host` or `srflx`), an IPv4 address and a port. The on-the-wire
//! representation is the compact string `<kind>:<ipv4>:<port>`, or the
//! two-field form `<ipv4>:<port>` with an implicit `host` kind.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::UnnError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
}

impl CandidateKind {
    fn as_wire_str(self) -> &'static str {
        match self {
            CandidateKind::Host => "host",
            CandidateKind::ServerReflexive => "srflx",
        }
    }

    /// Priority used to order a candidate list; server-reflexive sorts
    /// before host.
    pub fn priority(self) -> u32 {
        match self {
            CandidateKind::Host => 50,
            CandidateKind::ServerReflexive => 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub addr: Ipv4Addr,
    pub port: u16,
}

/// Candidates cross the wire as the compact string `<kind>:<ipv4>:<port>`,
/// not as a JSON object — every message that carries a candidate list
/// relies on this.
impl Serialize for Candidate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Candidate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

impl Candidate {
    pub fn host(addr: Ipv4Addr, port: u16) -> Self {
        Self {
            kind: CandidateKind::Host,
            addr,
            port,
        }
    }

    pub fn server_reflexive(addr: Ipv4Addr, port: u16) -> Self {
        Self {
            kind: CandidateKind::ServerReflexive,
            addr,
            port,
        }
    }

    pub fn priority(&self) -> u32 {
        self.kind.priority()
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.addr, self.port))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind.as_wire_str(), self.addr, self.port)
    }
}

impl FromStr for Candidate {
    type Err = UnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (kind, addr, port) = match parts.as_slice() {
            [addr, port] => (CandidateKind::Host, *addr, *port),
            [kind, addr, port] => {
                let kind = match *kind {
                    "host" => CandidateKind::Host,
                    "srflx" => CandidateKind::ServerReflexive,
                    other => {
                        return Err(UnnError::Protocol(format!(
                            "unknown candidate kind {other:?}"
                        )));
                    }
                };
                (kind, *addr, *port)
            }
            _ => {
                return Err(UnnError::Protocol(format!(
                    "malformed candidate string {s:?}"
                )));
            }
        };

        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| UnnError::Protocol(format!("invalid candidate address {addr:?}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| UnnError::Protocol(format!("invalid candidate port {port:?}")))?;

        Ok(Candidate { kind, addr, port })
    }
}

/// Sort a candidate list so that `srflx` candidates sort before `host`
/// candidates, and drop exact duplicates.
pub fn order_and_dedup(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.priority().cmp(&a.priority()));
    candidates.dedup();
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_host_three_field() {
        let c = Candidate::host(Ipv4Addr::new(192, 168, 1, 5), 4455);
        let s = c.to_string();
        assert_eq!(s, "host:192.168.1.5:4455");
        assert_eq!(s.parse::<Candidate>().unwrap(), c);
    }

    #[test]
    fn round_trip_srflx() {
        let c = Candidate::server_reflexive(Ipv4Addr::new(203, 0, 113, 9), 51820);
        let s = c.to_string();
        assert_eq!(s.parse::<Candidate>().unwrap(), c);
    }

    #[test]
    fn two_field_form_is_implicit_host() {
        let c: Candidate = "10.0.0.1:9000".parse().unwrap();
        assert_eq!(c.kind, CandidateKind::Host);
        assert_eq!(c.addr, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(c.port, 9000);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!("relay:10.0.0.1:9000".parse::<Candidate>().is_err());
    }

    #[test]
    fn srflx_sorts_before_host_and_dedups() {
        let host = Candidate::host(Ipv4Addr::new(10, 0, 0, 1), 1);
        let srflx = Candidate::server_reflexive(Ipv4Addr::new(1, 2, 3, 4), 2);
        let ordered = order_and_dedup(vec![host, srflx, host]);
        assert_eq!(ordered, vec![srflx, host]);
    }
}
