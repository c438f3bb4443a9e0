//! HTTP server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use gremlin_gateway_telemetry::{log_listening, log_shutdown};
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::GatewayConfig;
use crate::gateway::QueryGateway;
use crate::http::{create_router, AppState};

/// Serve until Ctrl-C or SIGTERM, then drain in-flight requests.
pub async fn run(config: Arc<GatewayConfig>) -> anyhow::Result<()> {
    if config.auth.uses_default_secret() {
        tracing::warn!("JWT_SECRET_KEY is not set, sessions are signed with the development key");
    }
    if config.engine.skip_cert_verify {
        tracing::warn!(url = %config.engine.url, "TLS certificate verification is disabled for the gremlin server");
    }

    let gateway = QueryGateway::new(Arc::clone(&config));
    let app = create_router(AppState::new(Arc::clone(&config), gateway));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    log_listening!(
        addr = %addr,
        gremlin_server = %config.engine.url,
        static_dir = %config.static_dir.display(),
        "gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log_shutdown!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}
