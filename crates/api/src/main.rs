use anyhow::Context;

use gatekeep_api::{app, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatekeep_observability::init();

    let config = AppConfig::from_env();
    let services = app::services::build_from_config(&config).await?;
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
