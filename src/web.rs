//! Health-check web server.
//!
//! Hosting platforms probe `GET /` to decide whether the process is alive.

use axum::{response::Html, routing::get, Router};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Terabox Courier</title>
</head>
<body>
  <h1>⚡ Terabox Courier is running</h1>
  <p>Send a Terabox share link to the bot in Telegram.</p>
</body>
</html>
"#;

/// Router serving the static status page
pub fn router() -> Router {
    Router::new().route("/", get(|| async { Html(INDEX_HTML) }))
}

/// Serve the status page on `0.0.0.0:<port>` until the process exits.
///
/// # Errors
///
/// Returns an error if the port cannot be bound or the server stops.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting health-check server");
    serve_on(listener).await
}

/// Serve the status page on an already bound listener
///
/// # Errors
///
/// Returns an error if the server stops with an I/O error.
pub async fn serve_on(listener: TcpListener) -> anyhow::Result<()> {
    axum::serve(listener, router()).await?;
    Ok(())
}
