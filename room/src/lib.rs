//! The `unn` room: a long-lived endpoint that registers with an entry
//! point, answers punch offers, and hosts direct visitor SSH sessions.

pub mod accept_list;
pub mod cli;
pub mod config;
pub mod control;
pub mod doors;
pub mod ssh_server;
