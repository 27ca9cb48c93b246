//! The person's stdin multiplexer: a single writer protected by a mutex
//! plus a condition variable, rather than a polling loop.
//!
//! One background task owns the real stdin handle and blocks on reads;
//! each read is routed to whichever of {EP session, inner room session}
//! is currently active, selected by `ActiveSession` under a plain mutex.
//! A `tokio::sync::Notify` lets a session wait until it becomes the
//! active one, or until the mux is paused again, without polling.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Notify};

enum ActiveSession {
    Paused,
    Ep(mpsc::UnboundedSender<Vec<u8>>),
    Room(mpsc::UnboundedSender<Vec<u8>>),
}

pub struct StdinMux {
    active: Mutex<ActiveSession>,
    notify: Notify,
}

impl StdinMux {
    /// Spawn the background blocking reader and return the shared handle.
    /// Starts paused: no session owns the keyboard until one activates.
    pub fn spawn() -> Arc<Self> {
        let mux = Arc::new(Self {
            active: Mutex::new(ActiveSession::Paused),
            notify: Notify::new(),
        });
        let reader = mux.clone();
        tokio::task::spawn_blocking(move || reader.read_loop());
        mux
    }

    fn read_loop(self: Arc<Self>) {
        use std::io::Read;
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    let target = match &*self.active.lock().unwrap() {
                        ActiveSession::Ep(tx) => Some(tx.clone()),
                        ActiveSession::Room(tx) => Some(tx.clone()),
                        ActiveSession::Paused => None,
                    };
                    if let Some(tx) = target {
                        if tx.send(chunk).is_err() {
                            // Active session's receiver dropped; fall back to
                            // paused so keystrokes aren't routed nowhere.
                            self.pause();
                        }
                    }
                }
                Err(_) => break,
            }
        }
        self.pause();
    }

    /// Grant the EP session exclusive ownership of stdin.
    pub fn activate_ep(&self, sender: mpsc::UnboundedSender<Vec<u8>>) {
        *self.active.lock().unwrap() = ActiveSession::Ep(sender);
        self.notify.notify_waiters();
    }

    /// Grant the inner room SSH session exclusive ownership of stdin.
    pub fn activate_room(&self, sender: mpsc::UnboundedSender<Vec<u8>>) {
        *self.active.lock().unwrap() = ActiveSession::Room(sender);
        self.notify.notify_waiters();
    }

    /// Release the keyboard; neither session receives further bytes until
    /// one of them re-activates.
    pub fn pause(&self) {
        *self.active.lock().unwrap() = ActiveSession::Paused;
        self.notify.notify_waiters();
    }

    /// Wait until the mux is paused (the previously active session gave
    /// up the keyboard), without spinning.
    pub async fn wait_until_paused(&self) {
        loop {
            if matches!(&*self.active.lock().unwrap(), ActiveSession::Paused) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_paused() {
        let mux = Arc::new(StdinMux {
            active: Mutex::new(ActiveSession::Paused),
            notify: Notify::new(),
        });
        mux.wait_until_paused().await;
    }

    #[tokio::test]
    async fn activation_then_pause_unblocks_waiter() {
        let mux = Arc::new(StdinMux {
            active: Mutex::new(ActiveSession::Paused),
            notify: Notify::new(),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        mux.activate_ep(tx);

        let waiter = {
            let mux = mux.clone();
            tokio::spawn(async move {
                mux.wait_until_paused().await;
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());
        mux.pause();
        waiter.await.unwrap();
    }
}
