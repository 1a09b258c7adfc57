//! Server module
//!
//! JSON HTTP surface next to the IVR: health and call inspection.

pub mod http;

pub use http::{build_router, cors_layer, AppState};

use std::future::Future;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Serve HTTP until `shutdown` resolves
pub async fn run_server<F>(
    config: &ServerConfig,
    state: AppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    let app = build_router(state).layer(cors_layer(&config.cors_origins));

    let port = listener.local_addr().map(|a| a.port()).unwrap_or(config.port);
    info!(address = %addr, "IVR waiting for calls on {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
