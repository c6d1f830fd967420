//! `chainrelay`: live lot monitoring gateway.
//!
//! ```text
//! ALCHEMY_API_KEY=... chainrelay --port 8081
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use chainrelay_core::reader::ChainReader;
use chainrelay_history::ChainHistoryAssembler;
use chainrelay_http::client::HttpRpcClient;
use chainrelay_http::evm::EvmRpcClient;
use chainrelay_server::config::Config;
use chainrelay_server::logging::init_tracing;
use chainrelay_server::{router, AppState};
use chainrelay_ws::{LiveRelay, UpstreamDialer, WsDialer};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    init_tracing(&config.log())?;

    let dialer = WsDialer::new(&config.ws_url, &config.api_key);
    tracing::info!(endpoint = dialer.endpoint(), feed = %config.feed, "starting upstream relay");
    let relay = LiveRelay::new(dialer, config.relay());
    relay
        .start()
        .await
        .context("initial upstream connection failed")?;

    let transport = HttpRpcClient::new(config.rpc_url(), config.http())
        .context("building HTTP JSON-RPC client")?;
    let reader: Arc<dyn ChainReader> = Arc::new(EvmRpcClient::new(transport));
    let history = Arc::new(ChainHistoryAssembler::new(reader, config.scan()));

    let app = router(AppState {
        relay,
        history,
        port: config.port,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!(%addr, "gateway listening");
    tracing::info!("  WebSocket: ws://{addr}/ws/monitor/{{contractAddress}}");
    tracing::info!("  History:   http://{addr}/api/v1/lotes/{{contractAddress}}/cadena");
    tracing::info!("  Status:    http://{addr}/api/v1/monitor/status");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
