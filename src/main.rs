use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use anyhow::Context;
use hybrid_rag::{api, app, config, logging};
use tokio::net::TcpListener;

/// Ports probed when `SERVER_PORT` is unset.
const FALLBACK_PORTS: RangeInclusive<u16> = 8000..=8099;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::init_config();
    logging::init_tracing(logging::ConsoleStream::Stdout);

    let services = app::build_services(config)
        .await
        .context("Failed to initialize ingestion and query services")?;
    let router = api::create_router(Arc::new(services));

    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!(
        port,
        data_dir = %config.data_dir.display(),
        vector_store = config.qdrant_url.is_some(),
        "Hybrid RAG server listening"
    );
    axum::serve(listener, router).await.context("Server error")?;
    Ok(())
}

async fn bind_listener(configured: Option<u16>) -> std::io::Result<(TcpListener, u16)> {
    if let Some(port) = configured {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port in use");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "no free port between {} and {}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
