//! The `unn` person: a short-lived client that visits a room over the
//! rendezvous-and-traversal control plane.

pub mod cli;
pub mod config;
pub mod control;
pub mod session;
pub mod stdin_mux;
pub mod url;
