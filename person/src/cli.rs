//! Command-line surface: URL, verbosity, identity path, batch
//! (non-interactive) mode, downloads directory.

use std::path::PathBuf;

use clap::Parser;
use unn_common::LogLevel;

#[derive(Parser, Debug)]
#[command(author, version, about = "unn person: visit a room over the unn rendezvous network", long_about = None)]
pub struct Args {
    /// `unn://host[:port]/roomname` target. A missing room name falls back
    /// to interactive selection on the entry-point session.
    pub url: String,

    /// Path to the signing key for the control connection, overriding the
    /// default precedence.
    #[arg(long)]
    pub identity: Option<PathBuf>,

    /// Fail instead of prompting when no room name is given on the URL.
    #[arg(long)]
    pub batch: bool,

    /// Directory files offered by a room's doors are saved to (out of
    /// scope functionally; carried as ambient CLI surface).
    #[arg(long)]
    pub downloads_dir: Option<PathBuf>,

    /// STUN server to query, repeatable.
    #[arg(long = "stun-server")]
    pub stun_servers: Vec<String>,

    /// Terminal and file log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::default())]
    pub log_level: LogLevel,

    /// Persisted config file path, overriding `~/.unn/config.toml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}
