use std::net::SocketAddr;

use tokio::signal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use session_control_plane::config::Config;
use session_control_plane::k8s::Gateway;
use session_control_plane::store::AppState;
use session_control_plane::{api, janitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("PLATFORM_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    let cfg = Config::load();
    let backend = Gateway::backend().await?;
    let state = AppState::new(backend, cfg);

    let app = api::router().with_state(state.clone());

    let addr: SocketAddr = state.config.listen.parse()?;
    tracing::info!(%addr, "starting session control plane");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    let janitor_handle = tokio::spawn(janitor::run(state, shutdown_rx));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    let _ = janitor_handle.await;

    tracing::info!("session control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
