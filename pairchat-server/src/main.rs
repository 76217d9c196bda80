use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pairchat_server::{app, sweeper, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pairchat_server=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::parse();
    config.validate()?;

    let state = AppState::new(&config);

    let shutdown = CancellationToken::new();
    let sweeper = sweeper::spawn(
        state.coordinator.clone(),
        config.sweep_interval(),
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!(addr = %listener.local_addr()?, "pairchat server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    Ok(())
}
