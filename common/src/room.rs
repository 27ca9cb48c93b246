//! Shared room/person naming and the `RoomRecord` data model.

use std::time::Instant;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::candidate::Candidate;

/// A room's registered name. `ArcStr` over `String`: room names are read
/// far more often than written and are cheaply cloned into every `List`
/// response and every `RoomRecord` lookup key.
pub type RoomName = ArcStr;

/// Transient identifier assigned to a person's visit.
pub type PersonId = Uuid;

/// One door advertisement: a name a visitor can invoke.
pub type DoorName = ArcStr;

/// The entry point's view of one registered room.
///
/// Owned exclusively by the EP registry; never handed out by value to a
/// room or person — only its derived fields (via `List`) cross the wire.
#[derive(Debug, Clone)]
pub struct RoomRecord {
    pub name: RoomName,
    pub owner_fingerprint: String,
    pub doors: Vec<DoorName>,
    pub ssh_port: u16,
    pub host_public_keys: Vec<String>,
    pub population: u32,
    pub candidates: Vec<Candidate>,
    pub last_seen: Instant,
}

impl RoomRecord {
    pub fn new(
        name: RoomName,
        owner_fingerprint: String,
        doors: Vec<DoorName>,
        ssh_port: u16,
        host_public_keys: Vec<String>,
        population: u32,
        candidates: Vec<Candidate>,
    ) -> Self {
        Self {
            name,
            owner_fingerprint,
            doors,
            ssh_port,
            host_public_keys,
            population,
            candidates,
            last_seen: Instant::now(),
        }
    }

    /// Apply a re-Register: idempotent, only raises population; never
    /// lowers it. `owner_fingerprint` is the *authenticated connection's*
    /// fingerprint, which on a continuity re-register (proof via a
    /// matching host public key rather than the recorded owner
    /// fingerprint) may differ from the one already on file — the record
    /// always adopts the fingerprint of whoever just proved ownership, so
    /// a later disconnect evicts under the right identity.
    pub fn refresh(
        &mut self,
        owner_fingerprint: String,
        doors: Vec<DoorName>,
        ssh_port: u16,
        host_public_keys: Vec<String>,
        population: u32,
        candidates: Vec<Candidate>,
    ) {
        self.owner_fingerprint = owner_fingerprint;
        self.doors = doors;
        self.ssh_port = ssh_port;
        self.host_public_keys = host_public_keys;
        if population > self.population {
            self.population = population;
        }
        self.candidates = candidates;
        self.last_seen = Instant::now();
    }
}

/// Summary of a `RoomRecord` as returned by `List`: the
/// owner fingerprint and host keys are internal to the registry and are
/// never exposed to a `List` caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub name: RoomName,
    pub doors: Vec<DoorName>,
    pub population: u32,
    pub candidate_count: usize,
}

impl From<&RoomRecord> for RoomSummary {
    fn from(record: &RoomRecord) -> Self {
        Self {
            name: record.name.clone(),
            doors: record.doors.clone(),
            population: record.population,
            candidate_count: record.candidates.len(),
        }
    }
}
