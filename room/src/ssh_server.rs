//! The room's own SSH server for direct visitor sessions, run once per
//! QUIC stream the room accepts from a punched-through visitor: it
//! authenticates the visitor's key against the accept-list and runs an
//! SSH server session over the stream. Door execution and the
//! interactive terminal UI are out of scope; this handler's job ends at
//! authentication and acknowledging the channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use russh::keys::PublicKey;
use russh::server::{Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use unn_quic::QuicDuplex;

use crate::accept_list::AcceptList;

const WELCOME: &str = "connected to unn room\r\n";

pub struct VisitorSession {
    accept_list: AcceptList,
    peer_addr: Option<SocketAddr>,
    username: Option<String>,
    authenticated_username: Arc<Mutex<Option<String>>>,
}

impl russh::server::Handler for VisitorSession {
    type Error = anyhow::Error;

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        if self.accept_list.authorize(user, public_key).await {
            self.username = Some(user.to_string());
            *self.authenticated_username.lock().unwrap() = Some(user.to_string());
            info!(peer = ?self.peer_addr, %user, "visitor authenticated against accept-list");
            Ok(Auth::Accept)
        } else {
            warn!(peer = ?self.peer_addr, %user, "visitor key not in accept-list, rejecting");
            Ok(Auth::reject())
        }
    }

    async fn channel_open_session(&mut self, channel: Channel<Msg>, session: &mut Session) -> Result<bool, Self::Error> {
        debug!(username = ?self.username, "visitor channel opened");
        session.data(channel.id(), CryptoVec::from(WELCOME.as_bytes().to_vec()));
        Ok(true)
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        // Door execution and shell hosting over this channel are out of
        // scope here; an accepted visitor session is acknowledged but not
        // driven further.
        let _ = (channel, data, session);
        Ok(())
    }
}

/// Run one visitor SSH server session to completion over an already
/// QUIC-accepted stream, evicting that visitor's accept-list entry once
/// the session ends (entries are scoped to a single handshake attempt),
/// and keeping the room's advertised population in step with the number
/// of live visitor sessions.
pub async fn serve_visitor(
    config: Arc<russh::server::Config>,
    stream: QuicDuplex,
    peer_addr: SocketAddr,
    accept_list: AcceptList,
    population: Arc<AtomicU32>,
    population_tx: watch::Sender<u32>,
) -> anyhow::Result<()> {
    let authenticated_username = Arc::new(Mutex::new(None));
    let session = VisitorSession {
        accept_list: accept_list.clone(),
        peer_addr: Some(peer_addr),
        username: None,
        authenticated_username: authenticated_username.clone(),
    };

    let count = population.fetch_add(1, Ordering::SeqCst) + 1;
    let _ = population_tx.send(count);

    let result = russh::server::run_stream(config, stream, session).await;
    if let Err(e) = &result {
        debug!(error = %e, %peer_addr, "visitor session ended");
    }
    if let Some(username) = authenticated_username.lock().unwrap().take() {
        accept_list.remove_username(&username).await;
    }

    let count = population.fetch_sub(1, Ordering::SeqCst) - 1;
    let _ = population_tx.send(count);

    result.map(|_| ()).map_err(anyhow::Error::from)
}
