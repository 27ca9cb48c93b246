//! Shared wire types, identity helpers and error taxonomy for the `unn`
//! rendezvous-and-traversal control plane.
//!
//! This crate has no network code of its own — it is consumed by
//! `unn-entrypoint`, `unn-room` and `unn-person` so that the message shapes
//! and error labels that cross the wire are defined exactly once.

pub mod candidate;
pub mod error;
pub mod identity;
pub mod logging;
pub mod message;
pub mod room;

pub use candidate::{Candidate, CandidateKind};
pub use error::{ControlError, UnnError};
pub use identity::{fingerprint, load_identity};
pub use logging::LogLevel;
pub use message::{Answer, EpMessage, Offer};
pub use room::{DoorName, PersonId, RoomName, RoomRecord, RoomSummary};

/// Application qualifier for `directories::ProjectDirs`, shared by every
/// binary that persists config/keys/logs under `~/.unn/`.
pub const APP_QUALIFIER: (&str, &str, &str) = ("network", "unn", "unn");
