//! The entry point's control protocol: newline-delimited JSON objects
//! `{"type": ..., "payload"-shaped fields...}`.
//!
//! One enum carries every message in both directions, so callers match
//! on the variant rather than on a direction-specific type.

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::ControlError;
use crate::room::{DoorName, PersonId, RoomName, RoomSummary};

/// EP→Room message delivered in answer to a person's `Visit`: the
/// person's authenticated identity and reachability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub person_id: PersonId,
    /// Authorized-keys line for the visiting person's public key.
    pub public_key: String,
    pub username: String,
    pub candidates: Vec<Candidate>,
}

/// Room→EP message, forwarded to the waiting person.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub person_id: PersonId,
    pub candidates: Vec<Candidate>,
    pub ssh_port: u16,
}

/// Every message exchanged over a control channel.
///
/// `List` carries an empty `rooms` when sent as a request; the EP's
/// reply populates it. `Ping`/`Pong` are a supplemental liveness probe,
/// folded in as a direct extension of `List`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EpMessage {
    Register {
        name: RoomName,
        doors: Vec<DoorName>,
        port: u16,
        public_keys: Vec<String>,
        population: u32,
        #[serde(default)]
        candidates: Vec<Candidate>,
    },
    Visit {
        room_name: RoomName,
        #[serde(default)]
        candidates: Vec<Candidate>,
    },
    List {
        #[serde(default)]
        rooms: Vec<RoomSummary>,
    },
    PunchOffer(Offer),
    PunchAnswer(Answer),
    Error {
        error: ControlError,
    },
    Ping,
    Pong,
}

impl EpMessage {
    /// Encode as one newline-delimited JSON line, newline included.
    pub fn to_line(&self) -> String {
        let mut s = serde_json::to_string(self).expect("EpMessage always serializes");
        s.push('\n');
        s
    }

    /// Parse a single line, trimming any trailing newline.
    pub fn from_line(line: &str) -> Result<Self, crate::error::UnnError> {
        serde_json::from_str(line.trim_end_matches(['\r', '\n'])).map_err(|e| {
            crate::error::UnnError::Protocol(format!("malformed control message: {e}"))
        })
    }

    /// `true` if this line looks like the start of JSON framing, used to
    /// decide when a connection switches out of its banner/prompt phase
    /// into structured mode.
    pub fn looks_like_json(line: &str) -> bool {
        line.trim_start().starts_with('{')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    #[test]
    fn register_round_trips() {
        let msg = EpMessage::Register {
            name: "treehouse".into(),
            doors: vec!["garden".into()],
            port: 44322,
            public_keys: vec!["ssh-ed25519 AAAA".into()],
            population: 1,
            candidates: vec![],
        };
        let line = msg.to_line();
        assert!(line.ends_with('\n'));
        let back = EpMessage::from_line(&line).unwrap();
        match back {
            EpMessage::Register { name, population, .. } => {
                assert_eq!(name.as_str(), "treehouse");
                assert_eq!(population, 1);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn punch_offer_round_trips() {
        let offer = Offer {
            person_id: Uuid::nil(),
            public_key: "ssh-ed25519 AAAA visitor".into(),
            username: "visitor".into(),
            candidates: vec![Candidate::host(Ipv4Addr::new(10, 0, 0, 2), 4000)],
        };
        let msg = EpMessage::PunchOffer(offer);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"punchOffer\""));
        let back: EpMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, EpMessage::PunchOffer(_)));
    }

    #[test]
    fn error_message_carries_typed_label() {
        let msg = EpMessage::Error {
            error: ControlError::RoomNameTaken,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: EpMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            back,
            EpMessage::Error {
                error: ControlError::RoomNameTaken
            }
        ));
    }

    #[test]
    fn list_request_omits_rooms() {
        let json = r#"{"type":"list"}"#;
        let msg = EpMessage::from_line(json).unwrap();
        assert!(matches!(msg, EpMessage::List { rooms } if rooms.is_empty()));
    }

    #[test]
    fn detects_json_framing_start() {
        assert!(EpMessage::looks_like_json("  {\"type\":\"ping\"}"));
        assert!(!EpMessage::looks_like_json("welcome to unn, type 'list'"));
    }
}
