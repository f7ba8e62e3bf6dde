use std::sync::Arc;

use anyhow::Context;
use lessonbook_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    lessonbook_observability::init().context("invalid logging configuration")?;

    let config = AppConfig::from_env()?;
    let services = lessonbook_api::app::services::build_services(&config).await?;
    let app = lessonbook_api::app::build_app(Arc::new(services));

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
