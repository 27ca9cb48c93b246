//! `unn://` URL parsing: `unn://<host>[:port]/<roomname>`, defaulting to
//! port 44322. An empty path means interactive room selection on the EP
//! session.

use std::str::FromStr;

use unn_common::room::RoomName;
use unn_common::UnnError;

pub const DEFAULT_EP_PORT: u16 = 44322;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnnUrl {
    pub host: String,
    pub port: u16,
    pub room_name: Option<RoomName>,
}

impl FromStr for UnnUrl {
    type Err = UnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("unn://")
            .ok_or_else(|| UnnError::Configuration(format!("not an unn:// URL: {s:?}")))?;
        if rest.is_empty() {
            return Err(UnnError::Configuration("empty unn:// URL".into()));
        }

        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if authority.is_empty() {
            return Err(UnnError::Configuration(format!("missing host in {s:?}")));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port_str)) if port_str.chars().all(|c| c.is_ascii_digit()) && !port_str.is_empty() => {
                let port = port_str
                    .parse()
                    .map_err(|_| UnnError::Configuration(format!("invalid port in {s:?}")))?;
                (host.to_string(), port)
            }
            _ => (authority.to_string(), DEFAULT_EP_PORT),
        };

        let room_name = if path.is_empty() { None } else { Some(RoomName::from(path)) };

        Ok(Self { host, port, room_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_port_and_room() {
        let url: UnnUrl = "unn://ep.example:44322/lab".parse().unwrap();
        assert_eq!(url.host, "ep.example");
        assert_eq!(url.port, 44322);
        assert_eq!(url.room_name.unwrap().as_str(), "lab");
    }

    #[test]
    fn missing_port_falls_back_to_default() {
        let url: UnnUrl = "unn://ep.example/lab".parse().unwrap();
        assert_eq!(url.port, DEFAULT_EP_PORT);
    }

    #[test]
    fn empty_path_means_interactive_selection() {
        let url: UnnUrl = "unn://ep.example:44322".parse().unwrap();
        assert!(url.room_name.is_none());
    }

    #[test]
    fn rejects_non_unn_scheme() {
        assert!("https://ep.example/lab".parse::<UnnUrl>().is_err());
    }
}
