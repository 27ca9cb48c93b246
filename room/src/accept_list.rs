//! The room's visitor accept-list: a table of usernames authorized to
//! complete the direct SSH handshake, populated from `Offer`s relayed by
//! the entry point and consulted by the room's own `PublicKey` auth
//! callback.
//!
//! Entries are scoped to the `Offer`'s person-id, so a key installed for
//! one visit is never honored under a different username.

use std::collections::HashMap;
use std::sync::Arc;

use russh::keys::PublicKey;
use tokio::sync::Mutex;

use unn_common::message::Offer;
use unn_common::{fingerprint, PersonId};

struct AcceptEntry {
    person_id: PersonId,
    fingerprint: String,
}

#[derive(Clone, Default)]
pub struct AcceptList {
    entries: Arc<Mutex<HashMap<String, AcceptEntry>>>,
}

impl AcceptList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the visitor key carried in an `Offer`, keyed by its
    /// username.
    pub async fn install(&self, offer: &Offer) -> Result<(), unn_common::UnnError> {
        let key = PublicKey::from_openssh(&offer.public_key)
            .map_err(|e| unn_common::UnnError::Protocol(format!("malformed offer public key: {e}")))?;
        self.entries.lock().await.insert(
            offer.username.clone(),
            AcceptEntry {
                person_id: offer.person_id,
                fingerprint: fingerprint(&key),
            },
        );
        Ok(())
    }

    /// Consulted by the room's `PublicKey` auth callback during the direct
    /// visitor handshake: the username must have an installed entry and
    /// the presented key's fingerprint must match it exactly.
    pub async fn authorize(&self, username: &str, candidate: &PublicKey) -> bool {
        match self.entries.lock().await.get(username) {
            Some(entry) => entry.fingerprint == fingerprint(candidate),
            None => false,
        }
    }

    /// Remove every entry installed for `person_id`: called on session end
    /// and when the offering person's EP connection drops before the
    /// direct handshake completes, bounding a leaked entry to the Offer's
    /// EP-connection lifetime.
    pub async fn remove_for_person(&self, person_id: PersonId) {
        self.entries.lock().await.retain(|_, entry| entry.person_id != person_id);
    }

    pub async fn remove_username(&self, username: &str) {
        self.entries.lock().await.remove(username);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::keys::ssh_key::rand_core::OsRng;
    use russh::keys::{Algorithm, PrivateKey};
    use unn_common::candidate::Candidate;
    use uuid::Uuid;

    fn offer_for(username: &str, key: &PrivateKey, person_id: PersonId) -> Offer {
        Offer {
            person_id,
            public_key: key.public_key().to_openssh().unwrap(),
            username: username.to_string(),
            candidates: vec![Candidate::host(std::net::Ipv4Addr::new(10, 0, 0, 1), 4000)],
        }
    }

    #[tokio::test]
    async fn installed_key_authorizes_its_own_username() {
        let list = AcceptList::new();
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let offer = offer_for("visitor", &key, Uuid::new_v4());
        list.install(&offer).await.unwrap();

        assert!(list.authorize("visitor", key.public_key()).await);
    }

    #[tokio::test]
    async fn installed_key_is_not_honored_under_a_different_username() {
        let list = AcceptList::new();
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let offer = offer_for("visitor", &key, Uuid::new_v4());
        list.install(&offer).await.unwrap();

        assert!(!list.authorize("someone-else", key.public_key()).await);
    }

    #[tokio::test]
    async fn eviction_by_person_id_removes_only_that_entry() {
        let list = AcceptList::new();
        let key_a = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let key_b = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let person_a = Uuid::new_v4();
        let person_b = Uuid::new_v4();

        list.install(&offer_for("alice", &key_a, person_a)).await.unwrap();
        list.install(&offer_for("bob", &key_b, person_b)).await.unwrap();

        list.remove_for_person(person_a).await;

        assert!(!list.authorize("alice", key_a.public_key()).await);
        assert!(list.authorize("bob", key_b.public_key()).await);
    }
}
