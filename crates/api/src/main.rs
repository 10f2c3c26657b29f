use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use playsort_infra::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    playsort_observability::init();

    let settings = Settings::from_env().context("invalid configuration")?;
    let services = Arc::new(playsort_api::app::services::build_services(&settings).await?);

    let shutdown = CancellationToken::new();
    let consumer = services.spawn_retry_consumer(shutdown.clone());

    let app = playsort_api::app::build_app(services);

    let addr = format!("0.0.0.0:{}", settings.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            signal.cancel();
        })
        .await
        .context("server error")?;

    consumer.shutdown().await;
    tracing::info!("shut down");
    Ok(())
}
