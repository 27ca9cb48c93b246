//! Person-side session orchestration: keeps the EP control session alive
//! across visits, driving the hole-punch/QUIC/SSH sequence for each one
//! and handing stdin ownership back and forth through the `StdinMux`.
//! Each visit runs a bounded `Visit` → `PunchAnswer` → punch → QUIC →
//! SSH sequence rather than an open-ended subscription.

use std::io::Write as _;
use std::sync::Arc;

use russh::keys::PublicKey;
use russh::ChannelMsg;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{info, warn};

use unn_common::message::Answer;
use unn_common::room::RoomName;
use unn_common::UnnError;
use unn_quic::{QuicDuplex, QuicEndpoint};

use crate::control::PersonClient;
use crate::stdin_mux::StdinMux;

pub struct PersonSession {
    pub client: PersonClient,
    pub identity: russh::keys::PrivateKey,
    pub socket: Arc<UdpSocket>,
    pub quic_endpoint: Arc<QuicEndpoint>,
    pub stdin: Arc<StdinMux>,
    pub batch: bool,
}

impl PersonSession {
    /// Drive one or more visits until the EP connection closes or the
    /// user asks to stop (only reachable interactively, since batch mode
    /// visits exactly once and returns).
    pub async fn run(mut self, initial_room: Option<RoomName>) -> Result<(), UnnError> {
        let (mut handle, mut channel) = self.client.connect().await?;
        info!("connected to entry point");

        let mut next_room = initial_room;
        loop {
            let room_name = match next_room.take() {
                Some(name) => name,
                None => match self.prompt_for_room(&mut channel).await? {
                    Some(name) => name,
                    None => break,
                },
            };

            match self.visit_once(&mut channel, room_name).await {
                Ok(()) => {}
                Err(e) => warn!(error = %e, "visit failed"),
            }

            if self.batch {
                break;
            }
        }

        let _ = handle
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await;
        Ok(())
    }

    /// An empty room name means interactive room selection on the EP
    /// session: list rooms, then read one line of input routed through
    /// the EP slot of the stdin multiplexer.
    async fn prompt_for_room(&self, channel: &mut russh::Channel<russh::client::Msg>) -> Result<Option<RoomName>, UnnError> {
        if self.batch {
            return Ok(None);
        }

        let rooms = self.client.list(channel).await?;
        println!("available rooms:");
        for room in &rooms {
            println!("  {} (population {})", room.name, room.population);
        }
        print!("room> ");
        std::io::stdout().flush().ok();

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.stdin.activate_ep(tx);
        let mut line = Vec::new();
        while let Some(chunk) = rx.recv().await {
            if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
                line.extend_from_slice(&chunk[..pos]);
                break;
            }
            line.extend_from_slice(&chunk);
        }
        self.stdin.pause();

        let name = String::from_utf8_lossy(&line).trim().to_string();
        if name.is_empty() {
            return Ok(None);
        }
        Ok(Some(RoomName::from(name)))
    }

    async fn visit_once(&mut self, channel: &mut russh::Channel<russh::client::Msg>, room_name: RoomName) -> Result<(), UnnError> {
        let answer = self.client.visit(channel, room_name.clone()).await?;
        info!(%room_name, candidates = answer.candidates.len(), ssh_port = answer.ssh_port, "room answered");

        unn_punch::spawn_punch(self.socket.clone(), answer.candidates.clone());

        let connection = self.dial_room(&answer).await?;
        let stream = QuicDuplex::open(&connection).await?;

        self.run_inner_ssh(stream).await
    }

    /// Try every candidate the room offered, in priority order
    /// (server-reflexive first), until one QUIC dial succeeds. Dials
    /// through the QUIC endpoint built over the same local port STUN
    /// discovered and the punch sender's write-only fd shares, so the
    /// host-reflexive mapping is preserved across all three.
    async fn dial_room(&self, answer: &Answer) -> Result<quinn::Connection, UnnError> {
        let candidates = unn_common::candidate::order_and_dedup(answer.candidates.clone());
        let mut last_error = UnnError::Transport("room offered no candidates".into());
        for candidate in candidates {
            match self.quic_endpoint.connect(candidate.socket_addr()).await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    warn!(candidate = %candidate, error = %e, "QUIC dial failed, trying next candidate");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    /// Run the inner SSH client session over the punched-through QUIC
    /// stream. The interactive terminal UI is out of scope; this
    /// bridges raw bytes between the multiplexed stdin and
    /// the SSH channel until either side closes.
    async fn run_inner_ssh(&self, stream: QuicDuplex) -> Result<(), UnnError> {
        let config = Arc::new(russh::client::Config::default());
        let mut session = russh::client::connect_stream(config, stream, RoomSessionHandler)
            .await
            .map_err(|e| UnnError::Transport(format!("inner SSH connect failed: {e}")))?;

        let authenticated = session
            .authenticate_publickey(self.client.username.as_str(), Arc::new(self.identity.clone()))
            .await
            .map_err(|e| UnnError::Transport(format!("inner SSH authentication failed: {e}")))?;
        if !authenticated.success() {
            return Err(UnnError::Transport("room rejected our key".into()));
        }

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| UnnError::Transport(format!("inner channel open failed: {e}")))?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        self.stdin.activate_room(tx);

        loop {
            tokio::select! {
                input = rx.recv() => {
                    match input {
                        Some(bytes) => {
                            if channel.data(bytes.as_slice()).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                msg = channel.wait() => {
                    match msg {
                        Some(ChannelMsg::Data { data }) => {
                            std::io::stdout().write_all(&data).ok();
                            std::io::stdout().flush().ok();
                        }
                        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
                        Some(_) => {}
                    }
                }
            }
        }

        self.stdin.pause();
        let _ = session.disconnect(russh::Disconnect::ByApplication, "", "en").await;
        Ok(())
    }
}

/// Inner-session host-key check: the QUIC layer already forgoes
/// certificate verification, and this workspace doesn't require the
/// person to additionally pin the room's host key, only the EP's; any
/// server key is accepted here.
struct RoomSessionHandler;

impl russh::client::Handler for RoomSessionHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
