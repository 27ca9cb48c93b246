//! The room-side control client: maintains a resilient connection to the
//! entry point, discovers candidates, registers, and answers punch
//! offers over a plain `russh` client session driving this workspace's
//! own `unn-discovery`/`unn-punch`/`unn-quic` pipeline. The reconnect
//! loop is an explicit state machine with named transitions rather than
//! nested conditionals.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use russh::client::Config as ClientConfig;
use russh::keys::PublicKey;
use russh::{ChannelMsg, Disconnect};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use unn_common::message::{Answer, EpMessage, Offer};
use unn_common::room::{DoorName, PersonId, RoomName};
use unn_common::{fingerprint, ControlError, UnnError};

use crate::accept_list::AcceptList;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(256);
/// Liveness gap beyond which the room proactively re-`Register`s even
/// without a population change.
const LIVENESS_GAP: Duration = Duration::from_secs(90);

/// Explicit connection-state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registered,
    Offering,
}

/// A fatal error (e.g. `RoomNameTaken`) surfaces to the caller and ends
/// the process; a retryable one feeds the reconnect backoff.
enum RunOutcome {
    Retry(UnnError),
    Fatal(UnnError),
}

pub struct RoomControlClient {
    pub name: RoomName,
    pub entrypoint: (String, u16),
    pub doors: Vec<DoorName>,
    pub identity: russh::keys::PrivateKey,
    pub ep_known_hosts: PathBuf,
    pub accept_list: AcceptList,
    /// Discovered once, before the QUIC endpoint was built over this same
    /// socket; the NAT mapping stays put for as long as the socket does,
    /// so there is no need (and no safe way) to re-run STUN afterwards.
    pub candidates: Vec<unn_common::candidate::Candidate>,
    /// Write-only handle to the punch sender's datagram burst: a clone of
    /// the fd the QUIC endpoint now exclusively owns for receiving. Never
    /// call a read method on this handle, or it races the QUIC driver for
    /// the same incoming datagrams.
    pub socket: Arc<UdpSocket>,
    pub ssh_port: u16,
    pub population: watch::Receiver<u32>,
    state: ConnectionState,
}

impl RoomControlClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: RoomName,
        entrypoint: (String, u16),
        doors: Vec<DoorName>,
        identity: russh::keys::PrivateKey,
        ep_known_hosts: PathBuf,
        accept_list: AcceptList,
        candidates: Vec<unn_common::candidate::Candidate>,
        socket: Arc<UdpSocket>,
        ssh_port: u16,
        population: watch::Receiver<u32>,
    ) -> Self {
        Self {
            name,
            entrypoint,
            doors,
            identity,
            ep_known_hosts,
            accept_list,
            candidates,
            socket,
            ssh_port,
            population,
            state: ConnectionState::Disconnected,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the reconnect loop until a fatal error (name collision,
    /// authorization failure) ends the process; never returns otherwise.
    pub async fn run(mut self) -> ! {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            self.state = ConnectionState::Connecting;
            match self.connect_and_serve().await {
                Ok(()) => {
                    backoff = INITIAL_BACKOFF;
                }
                Err(RunOutcome::Fatal(e)) => {
                    error!(error = %e, fingerprint = %fingerprint(self.identity.public_key()), "fatal registration error, exiting");
                    std::process::exit(e.exit_code());
                }
                Err(RunOutcome::Retry(e)) => {
                    self.state = ConnectionState::Disconnected;
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "entry point unreachable, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }

    async fn connect_and_serve(&mut self) -> Result<(), RunOutcome> {
        let candidates = self.candidates.clone();

        let handler = EpClientHandler {
            known_hosts_path: self.ep_known_hosts.clone(),
            ep_label: format!("{}:{}", self.entrypoint.0, self.entrypoint.1),
        };
        let config = Arc::new(ClientConfig::default());
        let addr = (self.entrypoint.0.as_str(), self.entrypoint.1);
        let mut session = russh::client::connect(config, addr, handler)
            .await
            .map_err(|e| RunOutcome::Retry(UnnError::Transport(format!("connect to entry point failed: {e}"))))?;

        let authenticated = session
            .authenticate_publickey("room", Arc::new(self.identity.clone()))
            .await
            .map_err(|e| RunOutcome::Retry(UnnError::Transport(format!("authentication failed: {e}"))))?;
        if !authenticated.success() {
            return Err(RunOutcome::Retry(UnnError::Transport("entry point rejected our key".into())));
        }

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| RunOutcome::Retry(UnnError::Transport(format!("channel open failed: {e}"))))?;

        self.register(&mut channel, candidates).await?;
        self.state = ConnectionState::Registered;
        info!(room = %self.name, "registered with entry point");

        let outcome = self.serve(&mut channel).await;
        let _ = session.disconnect(Disconnect::ByApplication, "", "en").await;
        outcome
    }

    async fn register(
        &self,
        channel: &mut russh::Channel<russh::client::Msg>,
        candidates: Vec<unn_common::candidate::Candidate>,
    ) -> Result<(), RunOutcome> {
        let message = EpMessage::Register {
            name: self.name.clone(),
            doors: self.doors.clone(),
            port: self.ssh_port,
            public_keys: vec![self.identity.public_key().to_openssh().unwrap_or_default()],
            population: *self.population.borrow(),
            candidates,
        };
        channel
            .data(message.to_line().as_bytes())
            .await
            .map_err(|e| RunOutcome::Retry(UnnError::Transport(format!("register send failed: {e}"))))?;

        match self.read_message(channel).await {
            Ok(Some(EpMessage::Error { error })) => match error {
                ControlError::RoomNameTaken | ControlError::NotAuthorized => Err(RunOutcome::Fatal(UnnError::Registration(error))),
                other => Err(RunOutcome::Retry(UnnError::Registration(other))),
            },
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(RunOutcome::Retry(UnnError::Transport("entry point closed the channel".into()))),
            Err(e) => Err(RunOutcome::Retry(e)),
        }
    }

    async fn serve(&mut self, channel: &mut russh::Channel<russh::client::Msg>) -> Result<(), RunOutcome> {
        let mut buffer = String::new();
        let mut liveness = tokio::time::interval(LIVENESS_GAP);
        liveness.tick().await;

        loop {
            tokio::select! {
                msg = channel.wait() => {
                    let Some(msg) = msg else {
                        return Err(RunOutcome::Retry(UnnError::Transport("entry point connection closed".into())));
                    };
                    if let ChannelMsg::Data { data } = msg {
                        buffer.push_str(&String::from_utf8_lossy(&data));
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].to_string();
                            buffer.drain(..=pos);
                            if let Err(e) = self.handle_line(&line, channel).await {
                                warn!(error = %e, "error handling entry-point message");
                            }
                        }
                    }
                }
                _ = liveness.tick() => {
                    debug!("sending liveness Register (90s gap)");
                    self.register(channel, self.candidates.clone()).await?;
                }
                changed = self.population.changed() => {
                    if changed.is_err() {
                        return Err(RunOutcome::Retry(UnnError::Transport("population watch closed".into())));
                    }
                    self.register(channel, self.candidates.clone()).await?;
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str, channel: &mut russh::Channel<russh::client::Msg>) -> Result<(), UnnError> {
        let message = EpMessage::from_line(line)?;
        match message {
            EpMessage::PunchOffer(offer) => self.handle_offer(offer, channel).await,
            EpMessage::Pong => Ok(()),
            other => {
                debug!(?other, "ignoring unexpected message on room control channel");
                Ok(())
            }
        }
    }

    async fn handle_offer(&mut self, offer: Offer, channel: &mut russh::Channel<russh::client::Msg>) -> Result<(), UnnError> {
        self.state = ConnectionState::Offering;
        info!(person_id = %offer.person_id, username = %offer.username, "punch offer received");

        self.accept_list.install(&offer).await?;

        let candidates: Vec<_> = offer.candidates.clone();
        unn_punch::spawn_punch(self.socket.clone(), candidates);

        let answer = Answer {
            person_id: offer.person_id,
            candidates: self.candidates.clone(),
            ssh_port: self.ssh_port,
        };
        let message = EpMessage::PunchAnswer(answer);
        channel
            .data(message.to_line().as_bytes())
            .await
            .map_err(|e| UnnError::Transport(format!("punch answer send failed: {e}")))?;

        self.state = ConnectionState::Registered;
        Ok(())
    }

    async fn read_message(&self, channel: &mut russh::Channel<russh::client::Msg>) -> Result<Option<EpMessage>, UnnError> {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    let line = String::from_utf8_lossy(&data);
                    for candidate in line.split('\n') {
                        if candidate.trim().is_empty() {
                            continue;
                        }
                        return Ok(Some(EpMessage::from_line(candidate)?));
                    }
                }
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Evict an accept-list entry whose visit never reached a direct
    /// handshake; called when the EP session that originated an offer
    /// drops before that happens.
    pub async fn evict_abandoned_offer(&self, person_id: PersonId) {
        self.accept_list.remove_for_person(person_id).await;
    }
}

/// `russh::client::Handler` for the room's outbound connection to the
/// entry point: verifies the EP's host key against a pinned fingerprint,
/// trusting it on first use so later impersonation attempts can be
/// detected.
pub struct EpClientHandler {
    known_hosts_path: PathBuf,
    ep_label: String,
}

impl russh::client::Handler for EpClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let actual = fingerprint(server_public_key);
        match read_pinned_fingerprint(&self.known_hosts_path, &self.ep_label) {
            Some(expected) if expected != actual => {
                error!(expected, actual, ep = %self.ep_label, "entry point host key mismatch");
                Ok(false)
            }
            Some(_) => Ok(true),
            None => {
                info!(fingerprint = %actual, ep = %self.ep_label, "pinning entry point host key on first use");
                if let Err(e) = pin_fingerprint(&self.known_hosts_path, &self.ep_label, &actual) {
                    warn!(error = %e, "failed to persist pinned entry point fingerprint");
                }
                Ok(true)
            }
        }
    }
}

fn read_pinned_fingerprint(path: &Path, label: &str) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        let (entry_label, fp) = line.split_once(' ')?;
        (entry_label == label).then(|| fp.to_string())
    })
}

fn pin_fingerprint(path: &Path, label: &str, fingerprint: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{label} {fingerprint}")?;
    Ok(())
}

/// Address the room's control client dials, resolved from the `--entrypoint
/// host[:port]` CLI flag.
pub fn parse_entrypoint(address: &str, default_port: u16) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => {
            (host.to_string(), port.parse().unwrap_or(default_port))
        }
        _ => (address.to_string(), default_port),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        assert_eq!(parse_entrypoint("ep.example:44322", 7766), ("ep.example".into(), 44322));
    }

    #[test]
    fn falls_back_to_default_port_without_one() {
        assert_eq!(parse_entrypoint("ep.example", 7766), ("ep.example".into(), 7766));
    }

    #[test]
    fn backoff_sequence_doubles_and_caps() {
        // Successive failed connects should produce sleep durations
        // {1, 2, 4, ..., 256, 256, 256} seconds.
        let mut backoff = INITIAL_BACKOFF;
        let mut seen = vec![backoff.as_secs()];
        for _ in 0..10 {
            backoff = (backoff * 2).min(MAX_BACKOFF);
            seen.push(backoff.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 64, 128, 256, 256, 256]);
    }
}
