//! Entry-point binary: accepts control connections and runs the
//! directory service.

use std::sync::Arc;

use clap::Parser;
use directories::ProjectDirs;
use tracing::{error, info};

use unn_common::APP_QUALIFIER;
use unn_entrypoint::cli::Args;
use unn_entrypoint::session::EpServer;
use unn_entrypoint::Registry;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from(APP_QUALIFIER.0, APP_QUALIFIER.1, APP_QUALIFIER.2);
    let log_dir = project_dirs
        .as_ref()
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let _log_guard = match unn_common::logging::init(args.log_level, &log_dir, "entrypoint") {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            std::process::exit(e.exit_code());
        }
    };

    let key = match unn_common::load_identity(args.identity.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            error!(error = %e, "failed to load host identity");
            std::process::exit(e.exit_code());
        }
    };

    let server_config = Arc::new(russh::server::Config {
        keys: vec![key],
        ..Default::default()
    });

    let server = EpServer {
        registry: Registry::new(),
    };

    info!(bind = %args.bind, port = args.port, "entry point listening");
    if let Err(e) = russh::server::run(server_config, (args.bind, args.port), server).await {
        error!(error = %e, "control server exited");
        std::process::exit(unn_common::UnnError::Transport(e.to_string()).exit_code());
    }
}
