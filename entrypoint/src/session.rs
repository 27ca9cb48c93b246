//! The control-protocol server: one `russh` session per inbound
//! connection, carrying newline-delimited JSON over a single SSH
//! channel. Each accepted connection gets its own `EpSession` handler,
//! dispatching against the shared `Registry` by message variant.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::PublicKey;
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use unn_common::message::{EpMessage, Offer};
use unn_common::room::RoomName;
use unn_common::{fingerprint, ControlError};

use crate::registry::Registry;

const BANNER: &str = "unn entry point\r\ntype 'list', or begin sending control messages\r\n";

/// Listens for the registry's offer channel and relays every pending
/// `PunchOffer` down to this session's own channel, independent of the
/// `Handler::data` callback (which only fires on *inbound* bytes).
async fn forward_offers(handle: Handle, channel_id: ChannelId, mut offer_rx: mpsc::UnboundedReceiver<Offer>) {
    while let Some(offer) = offer_rx.recv().await {
        let line = EpMessage::PunchOffer(offer).to_line();
        if handle.data(channel_id, CryptoVec::from(line.into_bytes())).await.is_err() {
            break;
        }
    }
}

pub struct EpServer {
    pub registry: Registry,
}

impl russh::server::Server for EpServer {
    type Handler = EpSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> EpSession {
        EpSession {
            registry: self.registry.clone(),
            peer_addr,
            fingerprint: None,
            public_key_line: None,
            username: None,
            channel_id: None,
            buffer: String::new(),
            json_mode: false,
            room_name: None,
        }
    }
}

pub struct EpSession {
    registry: Registry,
    peer_addr: Option<SocketAddr>,
    fingerprint: Option<String>,
    /// The authenticated key's authorized-keys line, copied verbatim into
    /// every `Offer` this session raises so the room can install it into
    /// its accept-list.
    public_key_line: Option<String>,
    /// SSH login username, threaded into a visitor's `Offer` so the room's
    /// accept-list lookup and the inner SSH authentication agree.
    username: Option<String>,
    channel_id: Option<ChannelId>,
    buffer: String,
    json_mode: bool,
    /// Set once this session successfully `Register`s a room, so a
    /// dropped connection can evict exactly that room.
    room_name: Option<RoomName>,
}

impl Drop for EpSession {
    fn drop(&mut self) {
        if let (Some(room_name), Some(fp)) = (self.room_name.take(), self.fingerprint.clone()) {
            let registry = self.registry.clone();
            tokio::spawn(async move {
                registry.evict(&room_name, &fp).await;
            });
        }
    }
}

impl russh::server::Handler for EpSession {
    type Error = anyhow::Error;

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        // No restriction on visitor identity beyond having a key at all.
        self.fingerprint = Some(fingerprint(public_key));
        self.public_key_line = public_key.to_openssh().ok();
        self.username = Some(user.to_string());
        debug!(peer = ?self.peer_addr, fingerprint = ?self.fingerprint, "control connection authenticated");
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channel_id = Some(channel.id());
        session.data(channel.id(), CryptoVec::from(BANNER.as_bytes().to_vec()));
        Ok(true)
    }

    async fn data(&mut self, channel: ChannelId, data: &[u8], session: &mut Session) -> Result<(), Self::Error> {
        self.buffer.push_str(&String::from_utf8_lossy(data));

        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            self.handle_line(&line, channel, session).await?;
        }
        Ok(())
    }
}

impl EpSession {
    async fn handle_line(&mut self, line: &str, channel: ChannelId, session: &mut Session) -> anyhow::Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        if !self.json_mode && !EpMessage::looks_like_json(line) {
            // Pre-JSON banner phase: a human typing 'list' at a raw
            // terminal still gets something useful back.
            if line.trim() == "list" {
                let rooms = self.registry.list().await;
                self.send(channel, session, &EpMessage::List { rooms });
            } else {
                self.send_text(channel, session, "unrecognized; send 'list' or a JSON control message\r\n");
            }
            return Ok(());
        }
        self.json_mode = true;

        let message = match EpMessage::from_line(line) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "malformed control message, dropping");
                return Ok(());
            }
        };

        match message {
            EpMessage::Register {
                name,
                doors,
                port,
                public_keys,
                population,
                candidates,
            } => self.handle_register(channel, session, name, doors, port, public_keys, population, candidates).await,
            EpMessage::List { .. } => {
                let rooms = self.registry.list().await;
                self.send(channel, session, &EpMessage::List { rooms });
            }
            EpMessage::Visit { room_name, candidates } => {
                self.handle_visit(channel, session, room_name, candidates).await
            }
            EpMessage::PunchAnswer(answer) => self.handle_punch_answer(channel, session, answer).await,
            EpMessage::Ping => self.send(channel, session, &EpMessage::Pong),
            other => {
                warn!(?other, "unexpected message on entry-point control channel, dropping");
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_register(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
        name: RoomName,
        doors: Vec<unn_common::room::DoorName>,
        port: u16,
        public_keys: Vec<String>,
        population: u32,
        candidates: Vec<unn_common::candidate::Candidate>,
    ) {
        let Some(fp) = self.fingerprint.clone() else {
            self.send(channel, session, &EpMessage::Error { error: ControlError::AuthFailed });
            return;
        };

        let (offer_tx, offer_rx) = mpsc::unbounded_channel();
        match self
            .registry
            .register(&fp, name.clone(), doors, port, public_keys, population, candidates, offer_tx)
            .await
        {
            Ok(()) => {
                self.room_name = Some(name.clone());
                info!(room = %name, %population, "room registered");
                tokio::spawn(forward_offers(session.handle(), channel, offer_rx));
                self.send(channel, session, &EpMessage::List { rooms: self.registry.list().await });
            }
            Err(error) => self.send(channel, session, &EpMessage::Error { error }),
        }
    }

    async fn handle_visit(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
        room_name: RoomName,
        candidates: Vec<unn_common::candidate::Candidate>,
    ) {
        let Some(public_key_line) = self.public_key_line.clone() else {
            self.send(channel, session, &EpMessage::Error { error: ControlError::AuthFailed });
            return;
        };
        let username = self.username.clone().unwrap_or_else(|| "visitor".to_string());
        let person_id = uuid::Uuid::new_v4();
        let result = self
            .registry
            .visit(room_name, person_id, public_key_line, username, candidates)
            .await;

        match result {
            Ok(receiver) => {
                let handle = session.handle();
                tokio::spawn(async move {
                    let reply = match tokio::time::timeout(Duration::from_secs(300), receiver).await {
                        Ok(Ok(Ok(answer))) => EpMessage::PunchAnswer(answer),
                        Ok(Ok(Err(error))) => EpMessage::Error { error },
                        Ok(Err(_)) | Err(_) => EpMessage::Error {
                            error: ControlError::PeerGone,
                        },
                    };
                    let _ = handle.data(channel, CryptoVec::from(reply.to_line().into_bytes())).await;
                });
            }
            Err(error) => self.send(channel, session, &EpMessage::Error { error }),
        }
    }

    async fn handle_punch_answer(&mut self, channel: ChannelId, session: &mut Session, answer: unn_common::message::Answer) {
        if let Err(error) = self.registry.punch_answer(answer).await {
            self.send(channel, session, &EpMessage::Error { error });
        }
    }

    fn send(&self, channel: ChannelId, session: &mut Session, message: &EpMessage) {
        session.data(channel, CryptoVec::from(message.to_line().into_bytes()));
    }

    fn send_text(&self, channel: ChannelId, session: &mut Session, text: &str) {
        session.data(channel, CryptoVec::from(text.as_bytes().to_vec()));
    }
}
