use anyhow::Result;
use std::sync::Arc;
use technique_rag::config::Config;
use technique_rag::http::start_http_server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TRAG_LOG")
                .unwrap_or_else(|_| EnvFilter::new("technique_rag=info")),
        )
        .init();

    let config = Config::load()?;
    info!(
        "Starting technique-rag server (pipeline: {} {})",
        config.pipeline.interpreter,
        config.pipeline.script.display()
    );

    start_http_server(Arc::new(config)).await?;

    Ok(())
}
