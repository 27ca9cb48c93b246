//! Command-line surface. The entry point keeps no persisted config file,
//! so there is no `--config` flag here, unlike `unn-room`/`unn-person`.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use unn_common::LogLevel;

#[derive(Parser, Debug)]
#[command(author, version, about = "unn entry point: room registry and rendezvous signaling", long_about = None)]
pub struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on for control connections.
    #[arg(short, long, default_value_t = 44322)]
    pub port: u16,

    /// Terminal and file log verbosity.
    #[arg(long, value_enum, default_value_t = LogLevel::default())]
    pub log_level: LogLevel,

    /// Explicit host key path, overriding the default selection
    /// precedence.
    #[arg(long)]
    pub identity: Option<PathBuf>,
}
