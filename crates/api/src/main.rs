use anyhow::Context;

use ssogate_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ssogate_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let bind = config.bind;

    let app = ssogate_api::app::build_app(config)
        .await
        .context("failed to initialise stores")?;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
