//! Command-line surface: flags for bind address, port, doors directory,
//! room name, host-key path, entry-point address, identity path, files
//! directory, and headless toggle.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use unn_common::LogLevel;

#[derive(Parser, Debug)]
#[command(author, version, about = "unn room: a long-lived endpoint hosting interactive sessions", long_about = None)]
pub struct Args {
    /// Name to register under at the entry point.
    #[arg(long)]
    pub name: Option<String>,

    /// Entry-point address, `host[:port]`.
    #[arg(long)]
    pub entrypoint: Option<String>,

    /// Local address to bind the room's UDP socket to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Local UDP port to bind (0 lets the kernel choose).
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Directory of door executables to advertise.
    #[arg(long)]
    pub doors_dir: Option<PathBuf>,

    /// Directory exposed to visitors for file transfers (out of scope
    /// functionally; carried as ambient CLI surface).
    #[arg(long)]
    pub files_dir: Option<PathBuf>,

    /// Path to this room's own persistent host key, overriding the default
    /// selection precedence.
    #[arg(long)]
    pub host_key: Option<PathBuf>,

    /// Path recording the entry point's pinned host-key fingerprint,
    /// checked on every connect for impersonation detection.
    #[arg(long)]
    pub ep_known_hosts: Option<PathBuf>,

    /// STUN server to query, repeatable.
    #[arg(long = "stun-server")]
    pub stun_servers: Vec<String>,

    /// Disable the room's own interactive local console. A no-op here
    /// since that console is out of scope; kept for CLI surface parity.
    #[arg(long)]
    pub headless: bool,

    /// Terminal and file log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::default())]
    pub log_level: LogLevel,

    /// Persisted config file path, overriding `~/.unn/config.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
