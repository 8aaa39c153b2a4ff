//! Process entrypoint: parses `Config`, connects the engine reflector,
//! builds the `Coordinator`, and serves the network-driver protocol over a
//! UNIX socket until shutdown.

use std::sync::Arc;

use clap::Parser;
use net_dhcp::config::Config;
use net_dhcp::coordinator::Coordinator;
use net_dhcp::engine::EngineClient;
use net_dhcp::protocol;
use tokio::net::UnixListener;
use tokio::signal;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let config = Config::parse();

    env_logger::Builder::new()
        .parse_filters(&config.log_level)
        .init();

    let engine = match EngineClient::connect(&config.engine_socket).await {
        Ok(engine) => engine,
        Err(e) => {
            log::error!("failed to connect to engine at {}: {e}", config.engine_socket);
            return std::process::ExitCode::FAILURE;
        }
    };

    let socket_path = config.socket.clone();
    let coordinator = Arc::new(Coordinator::new(config, engine));
    let app = protocol::router(coordinator.clone());

    // Address reuse for a UNIX stream socket means removing a stale file
    // left behind by a previous run rather than SO_REUSEADDR, which has no
    // meaning for SOCK_STREAM AF_UNIX sockets.
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = std::path::Path::new(&socket_path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("failed to bind socket {socket_path}: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    log::info!("net-dhcp listening on {socket_path}");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        log::error!("server error: {e}");
        coordinator.shutdown().await;
        let _ = std::fs::remove_file(&socket_path);
        return std::process::ExitCode::FAILURE;
    }

    coordinator.shutdown().await;
    let _ = std::fs::remove_file(&socket_path);
    std::process::ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("shutdown signal received, stopping dhcp supervisors");
}
