use anyhow::Context;
use severity_server::{config::ServerConfig, model, server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServerConfig::from_env();
    tracing::info!("loading model from {}", cfg.model_path.display());

    let mdl = model::load(&cfg.model_path, cfg.meta_path.as_deref())
        .with_context(|| format!("cannot start without a model ({})", cfg.model_path.display()))?;
    // Warmup: score the default row once before serving
    model::warmup(mdl.as_ref())?;
    tracing::info!("loaded {}", mdl.describe());

    let app = server::router(mdl);

    tracing::info!("listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
