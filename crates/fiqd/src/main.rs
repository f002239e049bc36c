use anyhow::{Context, Result};
use fiq_core::QualityEngine;
use tracing_subscriber::EnvFilter;

mod config;
mod server;
mod transport;

use config::Config;
use server::{Exit, Server};
use transport::ZmqTransport;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let (major, minor, patch) = QualityEngine::version();
    tracing::info!(version = %format!("{major}.{minor}.{patch}"), "fiqd starting");

    // Socket is bound before the engine loads its models.
    let transport = ZmqTransport::bind(&config.endpoint)
        .await
        .with_context(|| format!("failed to bind {}", config.endpoint))?;

    let engine = QualityEngine::initialize(&config.config_dir, &config.config_file)
        .with_context(|| {
            format!(
                "failed to initialize engine from {}",
                config.config_dir.join(&config.config_file).display()
            )
        })?;

    tracing::info!(
        endpoint = %config.endpoint,
        idle_timeout_secs = config.idle_timeout_secs,
        "fiqd ready"
    );

    let mut server = Server::new(transport, engine, config.idle_timeout());
    match server.run().await.context("transport failure")? {
        Exit::Shutdown => tracing::info!("fiqd shutting down on request"),
        Exit::IdleTimeout => tracing::info!("fiqd shutting down after idle timeout"),
    }

    Ok(())
}
