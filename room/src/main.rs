//! Room binary: binds the shared UDP socket, builds the QUIC endpoint
//! over it, scans doors, and runs the control client alongside an accept
//! loop that hosts direct visitor SSH sessions.

use std::net::SocketAddr;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;

use clap::Parser;
use directories::ProjectDirs;
use tokio::net::UdpSocket as TokioUdpSocket;
use tokio::sync::watch;
use tracing::{error, info, warn};

use unn_common::APP_QUALIFIER;
use unn_quic::QuicEndpoint;
use unn_room::accept_list::AcceptList;
use unn_room::cli::Args;
use unn_room::config::Config;
use unn_room::control::{parse_entrypoint, RoomControlClient};
use unn_room::doors::DoorRegistry;
use unn_room::ssh_server;

const DEFAULT_EP_PORT: u16 = 44322;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = Config::load_or_default(args.config.as_deref());

    let project_dirs = ProjectDirs::from(APP_QUALIFIER.0, APP_QUALIFIER.1, APP_QUALIFIER.2);
    let log_dir = project_dirs
        .as_ref()
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let _log_guard = match unn_common::logging::init(args.log_level, &log_dir, "room") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let name = args
        .name
        .clone()
        .or(config.name.clone())
        .unwrap_or_else(|| format!("room-{}", &uuid::Uuid::new_v4().to_string()[..8]));
    let entrypoint_spec = match args.entrypoint.clone().or(config.entrypoint.clone()) {
        Some(spec) => spec,
        None => {
            error!("no entry point given; pass --entrypoint or set it in the config file");
            std::process::exit(1);
        }
    };
    let entrypoint = parse_entrypoint(&entrypoint_spec, DEFAULT_EP_PORT);
    let doors_dir = args.doors_dir.clone().or(config.doors_dir.clone());
    let stun_servers = if args.stun_servers.is_empty() {
        config.stun_servers.clone()
    } else {
        args.stun_servers.clone()
    };

    let identity = match unn_common::load_identity(args.host_key.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            error!(error = %e, "failed to load room identity");
            std::process::exit(e.exit_code());
        }
    };

    let ep_known_hosts = args.ep_known_hosts.clone().unwrap_or_else(|| {
        project_dirs
            .as_ref()
            .map(|dirs| dirs.config_dir().join("ep_known_hosts"))
            .unwrap_or_else(|| std::path::PathBuf::from("ep_known_hosts"))
    });

    let std_socket = match std::net::UdpSocket::bind((args.bind, args.port)) {
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
    let ssh_port = std_socket
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(args.port);

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
    let punch_socket = match TokioUdpSocket::from_std(punch_std_socket) {
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

    let doors = DoorRegistry::scan(doors_dir.as_deref()).names();
    let accept_list = AcceptList::new();
    let population = Arc::new(AtomicU32::new(0));
    let (population_tx, population_rx) = watch::channel(0u32);

    let ssh_config = Arc::new(russh::server::Config {
        keys: vec![identity.clone()],
        ..Default::default()
    });

    tokio::spawn(run_visitor_accept_loop(
        quic_endpoint,
        ssh_config,
        accept_list.clone(),
        population,
        population_tx,
    ));

    info!(%name, entrypoint = %entrypoint_spec, port = ssh_port, "room starting");

    let client = RoomControlClient::new(
        name.into(),
        entrypoint,
        doors,
        identity,
        ep_known_hosts,
        accept_list,
        candidates,
        punch_socket,
        ssh_port,
        population_rx,
    );
    client.run().await
}

/// Accept inbound QUIC connections opened by visiting persons after a
/// successful hole punch, and run one SSH server session per stream.
async fn run_visitor_accept_loop(
    endpoint: Arc<QuicEndpoint>,
    ssh_config: Arc<russh::server::Config>,
    accept_list: AcceptList,
    population: Arc<std::sync::atomic::AtomicU32>,
    population_tx: watch::Sender<u32>,
) {
    loop {
        let Some(incoming) = endpoint.accept().await else {
            warn!("QUIC endpoint closed, visitor accept loop exiting");
            return;
        };
        let ssh_config = ssh_config.clone();
        let accept_list = accept_list.clone();
        let population = population.clone();
        let population_tx = population_tx.clone();
        tokio::spawn(async move {
            let connection = match incoming.await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "visitor QUIC handshake failed");
                    return;
                }
            };
            let peer_addr: SocketAddr = connection.remote_address();
            loop {
                let stream = match unn_quic::QuicDuplex::accept(&connection).await {
                    Ok(s) => s,
                    Err(_) => return,
                };
                let ssh_config = ssh_config.clone();
                let accept_list = accept_list.clone();
                let population = population.clone();
                let population_tx = population_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) =
                        ssh_server::serve_visitor(ssh_config, stream, peer_addr, accept_list, population, population_tx).await
                    {
                        warn!(error = %e, %peer_addr, "visitor SSH session ended with error");
                    }
                });
            }
        });
    }
}
