//! Person binary: visits a room named by an `unn://` URL, or falls into
//! interactive room selection when the URL carries none.

use std::sync::Arc;

use clap::Parser;
use directories::ProjectDirs;
use tokio::net::UdpSocket as TokioUdpSocket;
use tracing::error;

use unn_common::APP_QUALIFIER;
use unn_person::cli::Args;
use unn_person::config::Config;
use unn_person::control::PersonClient;
use unn_person::session::PersonSession;
use unn_person::stdin_mux::StdinMux;
use unn_person::url::UnnUrl;
use unn_quic::QuicEndpoint;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref());

    let project_dirs = ProjectDirs::from(APP_QUALIFIER.0, APP_QUALIFIER.1, APP_QUALIFIER.2);
    let log_dir = project_dirs
        .as_ref()
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let _log_guard = match unn_common::logging::init(args.log_level, &log_dir, "person") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let url: UnnUrl = match args.url.parse() {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "invalid unn:// URL");
            std::process::exit(1);
        }
    };

    if args.batch && url.room_name.is_none() {
        error!("batch mode requires a room name in the URL");
        std::process::exit(1);
    }

    let identity_path = args.identity.clone().or(config.identity.clone());
    let identity = match unn_common::load_identity(identity_path.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            error!(error = %e, "failed to load identity");
            std::process::exit(e.exit_code());
        }
    };

    let ep_known_hosts = project_dirs
        .as_ref()
        .map(|dirs| dirs.config_dir().join("ep_known_hosts"))
        .unwrap_or_else(|| std::path::PathBuf::from("ep_known_hosts"));

    let stun_servers = if args.stun_servers.is_empty() {
        config.stun_servers.clone()
    } else {
        args.stun_servers.clone()
    };

    let std_socket = match std::net::UdpSocket::bind("0.0.0.0:0") {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to bind UDP socket");
            std::process::exit(1);
        }
    };
    if let Err(e) = std_socket.set_nonblocking(true) {
        error!(error = %e, "failed to set socket nonblocking");
        std::process::exit(1);
    }

    // Discover candidates on the one socket before QUIC ever touches it:
    // the STUN exchange needs to both send and receive on it, which only
    // works while nothing else is reading from the same queue.
    let discovery_socket = match TokioUdpSocket::from_std(std_socket) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to adopt UDP socket into the async runtime");
            std::process::exit(1);
        }
    };
    let candidates = unn_discovery::discover(&discovery_socket, &stun_servers).await;
    let std_socket = match discovery_socket.into_std() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to reclaim UDP socket after discovery");
            std::process::exit(1);
        }
    };

    // The punch sender gets its own fd, used only to send datagrams; the
    // QUIC endpoint below takes exclusive ownership of the original for
    // receiving, so the two never race over the same incoming queue.
    let punch_std_socket = match std_socket.try_clone() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to clone UDP socket for the punch sender");
            std::process::exit(1);
        }
    };
    let socket = match TokioUdpSocket::from_std(punch_std_socket) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to adopt punch socket into the async runtime");
            std::process::exit(1);
        }
    };

    let quic_endpoint = match QuicEndpoint::from_socket(std_socket) {
        Ok(ep) => Arc::new(ep),
        Err(e) => {
            error!(error = %e, "failed to build QUIC endpoint");
            std::process::exit(e.exit_code());
        }
    };

    let username = std::env::var("USER").unwrap_or_else(|_| "person".to_string());
    let client = PersonClient {
        entrypoint: (url.host.clone(), url.port),
        identity: identity.clone(),
        ep_known_hosts,
        candidates,
        username,
    };

    let stdin = StdinMux::spawn();
    let session = PersonSession {
        client,
        identity,
        socket,
        quic_endpoint,
        stdin,
        batch: args.batch,
    };

    if let Err(e) = session.run(url.room_name).await {
        error!(error = %e, "session ended with error");
        std::process::exit(e.exit_code());
    }
}
