use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use invoicer_api::app::{build_app, build_services};
use invoicer_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    invoicer_observability::init();

    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };
    info!(region = %config.region, "configuration loaded");

    let runtime = build_services(&config).await?;
    let app = build_app(runtime.services.clone());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let worker = runtime.worker;
    tokio::task::spawn_blocking(move || worker.shutdown()).await?;
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
    }
}
