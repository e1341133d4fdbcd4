//! Tiny HTTP endpoint so hosting platforms see the process as alive.

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

pub const BODY: &str = "Bot is running";

pub fn router() -> Router {
    Router::new().route("/", get(|| async { BODY }))
}

pub async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding keep-alive port {port}"))?;
    serve_on(listener).await
}

pub async fn serve_on(listener: TcpListener) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("keep-alive listening on {}", addr);
    }
    axum::serve(listener, router())
        .await
        .context("keep-alive server stopped")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_answers_with_status_text() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_on(listener));

        let resp = reqwest::get(format!("http://{addr}/")).await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), BODY);

        let missing = reqwest::get(format!("http://{addr}/nope")).await.unwrap();
        assert_eq!(missing.status(), 404);
    }
}
