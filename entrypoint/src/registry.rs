//! The entry point's directory service: a transport-free registry of
//! rooms and in-flight visits, driven by plain async methods so it can
//! be exercised in tests with no socket in sight. A pair of
//! `Arc<RwLock<HashMap<...>>>` maps — `rooms` and `persons` — back one
//! method per control message, with an eviction routine that walks both
//! maps together so a stale entry never lingers in one without the
//! other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use unn_common::candidate::Candidate;
use unn_common::error::ControlError;
use unn_common::message::{Answer, Offer};
use unn_common::room::{DoorName, PersonId, RoomName, RoomRecord, RoomSummary};

/// A visit that has been offered to a room and is awaiting its answer.
struct PersonSession {
    room: RoomName,
    reply: oneshot::Sender<Result<Answer, ControlError>>,
}

/// The live channel a registered room's session task listens on for
/// offers the registry forwards to it. Kept apart from `RoomRecord`
/// because it is connection state, not directory data — `RoomRecord` is
/// the thing a `List` caller sees projected as `RoomSummary`.
type OfferTx = mpsc::UnboundedSender<Offer>;

#[derive(Clone)]
pub struct Registry {
    rooms: Arc<RwLock<HashMap<RoomName, RoomRecord>>>,
    offer_channels: Arc<RwLock<HashMap<RoomName, OfferTx>>>,
    persons: Arc<RwLock<HashMap<PersonId, PersonSession>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            offer_channels: Arc::new(RwLock::new(HashMap::new())),
            persons: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register (or re-register) a room. A name is exclusive to the
    /// fingerprint that first claimed it; a later `Register` under the
    /// same name and a different fingerprint is rejected.
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        &self,
        owner_fingerprint: &str,
        name: RoomName,
        doors: Vec<DoorName>,
        port: u16,
        host_public_keys: Vec<String>,
        population: u32,
        candidates: Vec<Candidate>,
        offer_tx: OfferTx,
    ) -> Result<(), ControlError> {
        let mut rooms = self.rooms.write().await;
        match rooms.get_mut(&name) {
            Some(existing)
                if existing.owner_fingerprint != owner_fingerprint
                    && !host_public_keys
                        .iter()
                        .any(|k| existing.host_public_keys.contains(k)) =>
            {
                return Err(ControlError::RoomNameTaken);
            }
            Some(existing) => {
                existing.refresh(owner_fingerprint.to_string(), doors, port, host_public_keys, population, candidates);
            }
            None => {
                rooms.insert(
                    name.clone(),
                    RoomRecord::new(
                        name.clone(),
                        owner_fingerprint.to_string(),
                        doors,
                        port,
                        host_public_keys,
                        population,
                        candidates,
                    ),
                );
            }
        }
        self.offer_channels.write().await.insert(name, offer_tx);
        Ok(())
    }

    pub async fn list(&self) -> Vec<RoomSummary> {
        self.rooms.read().await.values().map(RoomSummary::from).collect()
    }

    /// Offer a visiting person to the named room and return a receiver
    /// that resolves once the room answers (or the visit is evicted).
    pub async fn visit(
        &self,
        room_name: RoomName,
        person_id: PersonId,
        public_key: String,
        username: String,
        candidates: Vec<Candidate>,
    ) -> Result<oneshot::Receiver<Result<Answer, ControlError>>, ControlError> {
        if !self.rooms.read().await.contains_key(&room_name) {
            return Err(ControlError::RoomNotFound);
        }
        let offer_tx = self
            .offer_channels
            .read()
            .await
            .get(&room_name)
            .cloned()
            .ok_or(ControlError::RoomNotFound)?;

        let (reply, receiver) = oneshot::channel();
        self.persons.write().await.insert(
            person_id,
            PersonSession {
                room: room_name,
                reply,
            },
        );

        let offer = Offer {
            person_id,
            public_key,
            username,
            candidates,
        };
        if offer_tx.send(offer).is_err() {
            self.persons.write().await.remove(&person_id);
            return Err(ControlError::PeerGone);
        }

        Ok(receiver)
    }

    /// Deliver a room's answer to the waiting visitor.
    /// Unknown or already-resolved `person_id`s are reported to the room
    /// as `PeerUnavailable` rather than silently dropped.
    pub async fn punch_answer(&self, answer: Answer) -> Result<(), ControlError> {
        let session = self
            .persons
            .write()
            .await
            .remove(&answer.person_id)
            .ok_or(ControlError::PeerUnavailable)?;
        let _ = session.reply.send(Ok(answer));
        Ok(())
    }

    /// Drop a room's registration, its offer channel, and fail every
    /// visit still waiting on it (`TraversalFailed`); removes from both
    /// maps together so a stale entry never lingers in one without the
    /// other.
    pub async fn evict(&self, room_name: &RoomName, owner_fingerprint: &str) {
        {
            let mut rooms = self.rooms.write().await;
            match rooms.get(room_name) {
                Some(record) if record.owner_fingerprint == owner_fingerprint => {
                    rooms.remove(room_name);
                }
                _ => return,
            }
        }
        self.offer_channels.write().await.remove(room_name);

        let mut persons = self.persons.write().await;
        let stale: Vec<PersonId> = persons
            .iter()
            .filter(|(_, session)| &session.room == room_name)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(session) = persons.remove(&id) {
                let _ = session.reply.send(Err(ControlError::TraversalFailed));
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use uuid::Uuid;

    fn candidate() -> Candidate {
        Candidate::host(Ipv4Addr::new(10, 0, 0, 1), 4000)
    }

    #[tokio::test]
    async fn register_then_list_reflects_room() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec!["garden".into()], 2222, vec![], 1, vec![candidate()], tx)
            .await
            .unwrap();

        let rooms = registry.list().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].name.as_str(), "treehouse");
    }

    #[tokio::test]
    async fn second_owner_cannot_steal_a_registered_name() {
        let registry = Registry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 1, vec![], tx_a)
            .await
            .unwrap();

        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let result = registry
            .register("fp-b", "treehouse".into(), vec![], 2223, vec![], 1, vec![], tx_b)
            .await;
        assert_eq!(result, Err(ControlError::RoomNameTaken));
    }

    #[tokio::test]
    async fn same_owner_may_refresh_its_own_room() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 1, vec![], tx.clone())
            .await
            .unwrap();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 3, vec![], tx)
            .await
            .unwrap();

        let rooms = registry.list().await;
        assert_eq!(rooms[0].population, 3);
    }

    #[tokio::test]
    async fn continuity_reregister_adopts_new_fingerprint_so_disconnect_evicts_it() {
        let registry = Registry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec!["ssh-ed25519 AAAA".into()], 1, vec![], tx_a)
            .await
            .unwrap();

        // Restart under a new signing key, proving continuity via the
        // already-registered host public key rather than the recorded
        // owner fingerprint.
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        registry
            .register("fp-b", "treehouse".into(), vec![], 2222, vec!["ssh-ed25519 AAAA".into()], 1, vec![], tx_b)
            .await
            .unwrap();

        // The new connection's fingerprint must now own the room, so its
        // disconnect (not the stale "fp-a") is what evicts it.
        registry.evict(&"treehouse".into(), "fp-a").await;
        assert_eq!(registry.list().await.len(), 1, "stale fingerprint must not evict");

        registry.evict(&"treehouse".into(), "fp-b").await;
        assert!(registry.list().await.is_empty(), "new fingerprint must evict");
    }

    #[tokio::test]
    async fn visit_unknown_room_is_rejected() {
        let registry = Registry::new();
        let result = registry
            .visit("nowhere".into(), Uuid::new_v4(), "key".into(), "visitor".into(), vec![])
            .await;
        assert_eq!(result.err(), Some(ControlError::RoomNotFound));
    }

    #[tokio::test]
    async fn visit_delivers_offer_and_punch_answer_resolves_it() {
        let registry = Registry::new();
        let (offer_tx, mut offer_rx) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 1, vec![], offer_tx)
            .await
            .unwrap();

        let person_id = Uuid::new_v4();
        let receiver = registry
            .visit("treehouse".into(), person_id, "ssh-ed25519 AAAA".into(), "visitor".into(), vec![candidate()])
            .await
            .unwrap();

        let offer = offer_rx.recv().await.unwrap();
        assert_eq!(offer.person_id, person_id);

        registry
            .punch_answer(Answer {
                person_id,
                candidates: vec![candidate()],
                ssh_port: 22,
            })
            .await
            .unwrap();

        let answer = receiver.await.unwrap().unwrap();
        assert_eq!(answer.person_id, person_id);
    }

    #[tokio::test]
    async fn punch_answer_for_unknown_person_reports_peer_unavailable() {
        let registry = Registry::new();
        let result = registry
            .punch_answer(Answer {
                person_id: Uuid::new_v4(),
                candidates: vec![],
                ssh_port: 22,
            })
            .await;
        assert_eq!(result, Err(ControlError::PeerUnavailable));
    }

    #[tokio::test]
    async fn eviction_fails_pending_visits_and_removes_room() {
        let registry = Registry::new();
        let (offer_tx, _offer_rx) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 1, vec![], offer_tx)
            .await
            .unwrap();

        let person_id = Uuid::new_v4();
        let receiver = registry
            .visit("treehouse".into(), person_id, "key".into(), "visitor".into(), vec![])
            .await
            .unwrap();

        registry.evict(&"treehouse".into(), "fp-a").await;

        assert!(registry.list().await.is_empty());
        let result = receiver.await.unwrap();
        assert_eq!(result, Err(ControlError::TraversalFailed));
    }

    #[tokio::test]
    async fn eviction_by_a_non_owner_is_a_no_op() {
        let registry = Registry::new();
        let (offer_tx, _offer_rx) = mpsc::unbounded_channel();
        registry
            .register("fp-a", "treehouse".into(), vec![], 2222, vec![], 1, vec![], offer_tx)
            .await
            .unwrap();

        registry.evict(&"treehouse".into(), "fp-impostor").await;
        assert_eq!(registry.list().await.len(), 1);
    }
}
