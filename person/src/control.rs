//! The person's control client: opens the EP control connection, lists
//! rooms, sends `Visit`, and waits for the room's `PunchAnswer`. The
//! client-handler shape mirrors `unn-room`'s own outbound EP
//! connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use russh::client::Config as ClientConfig;
use russh::keys::PublicKey;
use russh::{Channel, ChannelMsg};
use tracing::{error, info};

use unn_common::message::{Answer, EpMessage};
use unn_common::room::RoomName;
use unn_common::{fingerprint, ControlError, UnnError};

/// How long a person waits for a room's answer before reporting
/// traversal failure.
const VISIT_TIMEOUT: Duration = Duration::from_secs(300);

pub struct PersonClient {
    pub entrypoint: (String, u16),
    pub identity: russh::keys::PrivateKey,
    pub ep_known_hosts: PathBuf,
    /// Discovered once at startup, before the QUIC endpoint took
    /// exclusive ownership of the underlying socket for receiving.
    pub candidates: Vec<unn_common::candidate::Candidate>,
    /// SSH login name for the EP control connection. The entry point
    /// threads this verbatim into every `Offer` it raises on our behalf
    /// so the inner SSH session to the room must authenticate under
    /// this same name.
    pub username: String,
}

impl PersonClient {
    /// Open and authenticate the control connection, returning the shell
    /// channel a caller drives for `List`/`Visit` and, afterwards, for
    /// manual interactive use.
    pub async fn connect(&self) -> Result<(russh::client::Handle<EpClientHandler>, Channel<russh::client::Msg>), UnnError> {
        let handler = EpClientHandler {
            known_hosts_path: self.ep_known_hosts.clone(),
            ep_label: format!("{}:{}", self.entrypoint.0, self.entrypoint.1),
        };
        let config = Arc::new(ClientConfig::default());
        let addr = (self.entrypoint.0.as_str(), self.entrypoint.1);
        let mut session = russh::client::connect(config, addr, handler)
            .await
            .map_err(|e| UnnError::Transport(format!("connect to entry point failed: {e}")))?;

        let authenticated = session
            .authenticate_publickey(self.username.as_str(), Arc::new(self.identity.clone()))
            .await
            .map_err(|e| UnnError::Transport(format!("authentication failed: {e}")))?;
        if !authenticated.success() {
            return Err(UnnError::Transport("entry point rejected our key".into()));
        }

        let channel = session
            .channel_open_session()
            .await
            .map_err(|e| UnnError::Transport(format!("channel open failed: {e}")))?;

        Ok((session, channel))
    }

    pub async fn list(&self, channel: &mut Channel<russh::client::Msg>) -> Result<Vec<unn_common::room::RoomSummary>, UnnError> {
        channel
            .data(EpMessage::List { rooms: vec![] }.to_line().as_bytes())
            .await
            .map_err(|e| UnnError::Transport(format!("list send failed: {e}")))?;

        match read_message(channel).await? {
            Some(EpMessage::List { rooms }) => Ok(rooms),
            Some(EpMessage::Error { error }) => Err(UnnError::Registration(error)),
            Some(_) | None => Err(UnnError::Transport("entry point closed the channel".into())),
        }
    }

    /// Send `Visit` carrying our own discovered candidates, then wait up
    /// to `VISIT_TIMEOUT` for the room's `PunchAnswer`.
    pub async fn visit(&self, channel: &mut Channel<russh::client::Msg>, room_name: RoomName) -> Result<Answer, UnnError> {
        let candidates = self.candidates.clone();
        info!(%room_name, candidate_count = candidates.len(), "sending visit");

        channel
            .data(EpMessage::Visit { room_name, candidates }.to_line().as_bytes())
            .await
            .map_err(|e| UnnError::Transport(format!("visit send failed: {e}")))?;

        let reply = tokio::time::timeout(VISIT_TIMEOUT, read_message(channel))
            .await
            .map_err(|_| UnnError::Registration(ControlError::TraversalFailed))??;

        match reply {
            Some(EpMessage::PunchAnswer(answer)) => Ok(answer),
            Some(EpMessage::Error { error }) => Err(UnnError::Registration(error)),
            Some(_) | None => Err(UnnError::Transport("entry point closed the channel".into())),
        }
    }
}

async fn read_message(channel: &mut Channel<russh::client::Msg>) -> Result<Option<EpMessage>, UnnError> {
    let mut buffer = String::new();
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { data }) => {
                buffer.push_str(&String::from_utf8_lossy(&data));
                if let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].to_string();
                    if line.trim().is_empty() || !EpMessage::looks_like_json(&line) {
                        buffer.drain(..=pos);
                        continue;
                    }
                    return Ok(Some(EpMessage::from_line(&line)?));
                }
            }
            Some(_) => continue,
            None => return Ok(None),
        }
    }
}

/// `russh::client::Handler` for the person's connection to the entry
/// point: pins the EP's host-key fingerprint on first use, exactly as the
/// room's own control client does.
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
                    tracing::warn!(error = %e, "failed to persist pinned entry point fingerprint");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_then_read_round_trips() {
        let dir = std::env::temp_dir().join(format!("unn-person-known-hosts-{}", std::process::id()));
        let path = dir.join("ep_known_hosts");
        pin_fingerprint(&path, "ep.example:44322", "SHA256:abc").unwrap();
        assert_eq!(
            read_pinned_fingerprint(&path, "ep.example:44322"),
            Some("SHA256:abc".to_string())
        );
        assert_eq!(read_pinned_fingerprint(&path, "other:1"), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
