//! Greeter over gRPC-Web on HTTP/1.1
//!
//! - `POST /helloworld.Greeter/SayHello` (unary)
//! - `POST /helloworld.Greeter/SayHelloStream` (server streaming)
//! - `POST /helloworld.Greeter/SayHelloUpload` (client streaming, answered UNIMPLEMENTED)
//! - `GET /health` served by the axum fallback
//!
//! Run with: cargo run --bin hello-server
//! Test with: cargo run --bin hello-client

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use grpcweb_bridge::prelude::*;
use grpcweb_bridge_examples::{greeter, server_addr};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,grpcweb_bridge=debug")),
        )
        .init();

    let mut registry = HandlerRegistry::new();
    registry.add_provider(greeter());

    let app: Router = Router::new().route("/health", get(|| async { "ok" }));

    // hyper has already removed chunked framing by the time the body is read
    let service = GrpcWebService::new(registry)
        .decode_chunked(false)
        .server_timeout(Duration::from_secs(30))
        .with_fallback(app);

    let addr = server_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gRPC-Web greeter listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let service = TowerToHyperService::new(service.clone());

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                tracing::debug!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}
