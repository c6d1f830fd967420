//! Server configuration from flags and environment.

use std::time::Duration;

use clap::Parser;

use chainrelay_history::ScanConfig;
use chainrelay_http::client::HttpClientConfig;
use chainrelay_ws::{ConnectorConfig, RelayConfig};

use crate::logging::LogConfig;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "chainrelay",
    about = "Live lot monitoring and lot history over one shared upstream feed",
    long_about = "
ChainRelay keeps a single upstream WebSocket subscription feed open and fans
notifications out to every downstream client watching the same lot contract.
Lot histories are rebuilt from contract logs over HTTP JSON-RPC.

Every flag can also be set through the environment variable shown next to it;
a .env file in the working directory is loaded first.
",
    version
)]
pub struct Config {
    /// Upstream WebSocket base URL; the API key is appended as the last path segment
    #[arg(long, env = "ALCHEMY_WS_URL", default_value = "wss://eth-sepolia.g.alchemy.com/v2")]
    pub ws_url: String,

    /// Upstream API key
    #[arg(long, env = "ALCHEMY_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// HTTP JSON-RPC endpoint for history and lot state reads
    /// [default: https://eth-sepolia.g.alchemy.com/v2/<api key>]
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: Option<String>,

    /// Port the gateway listens on
    #[arg(long, env = "PORT", default_value_t = 8081)]
    pub port: u16,

    /// Upstream subscription feed name
    #[arg(long, env = "UPSTREAM_FEED", default_value = chainrelay_ws::connector::DEFAULT_FEED)]
    pub feed: String,

    /// Seconds between upstream reconnection attempts
    #[arg(long, env = "RECONNECT_DELAY_SECS", default_value_t = 5)]
    pub reconnect_delay_secs: u64,

    /// Send eth_unsubscribe when the last client of a contract leaves
    #[arg(long, env = "UNSUBSCRIBE_UPSTREAM", default_value_t = true, action = clap::ArgAction::Set)]
    pub unsubscribe_upstream: bool,

    /// Blocks per eth_getLogs range query
    #[arg(long, env = "SCAN_BATCH_SIZE", default_value_t = 10)]
    pub scan_batch_size: u64,

    /// How many blocks behind the head a history scan reaches
    #[arg(long, env = "SCAN_LOOKBACK_BLOCKS", default_value_t = 1000)]
    pub scan_lookback_blocks: u64,

    /// Range queries in flight at once (1 = sequential)
    #[arg(long, env = "SCAN_CONCURRENCY", default_value_t = 1)]
    pub scan_concurrency: usize,

    /// Per-request timeout for HTTP JSON-RPC calls, in seconds
    #[arg(long, env = "HTTP_TIMEOUT_SECS", default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Log level or EnvFilter directive string
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Per-crate levels on top of the log level, e.g. chainrelay-ws=debug,chainrelay-history=trace
    #[arg(long, env = "LOG_COMPONENTS", value_delimiter = ',', value_parser = parse_component_level)]
    pub log_components: Vec<(String, String)>,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON", default_value_t = false, action = clap::ArgAction::Set)]
    pub log_json: bool,
}

impl Config {
    pub fn rpc_url(&self) -> String {
        match &self.rpc_url {
            Some(url) => url.clone(),
            None => format!("https://eth-sepolia.g.alchemy.com/v2/{}", self.api_key),
        }
    }

    pub fn relay(&self) -> RelayConfig {
        RelayConfig {
            connector: ConnectorConfig {
                feed: self.feed.clone(),
                reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            },
            unsubscribe_upstream: self.unsubscribe_upstream,
        }
    }

    pub fn scan(&self) -> ScanConfig {
        ScanConfig {
            batch_size: self.scan_batch_size,
            lookback: self.scan_lookback_blocks,
            concurrency: self.scan_concurrency,
        }
    }

    pub fn http(&self) -> HttpClientConfig {
        HttpClientConfig {
            request_timeout: Duration::from_secs(self.http_timeout_secs),
            ..HttpClientConfig::default()
        }
    }

    pub fn log(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            components: self.log_components.iter().cloned().collect(),
            json: self.log_json,
        }
    }
}

/// `component=level`
fn parse_component_level(s: &str) -> Result<(String, String), String> {
    let (component, level) = s
        .split_once('=')
        .ok_or_else(|| format!("expected component=level, got `{s}`"))?;
    let (component, level) = (component.trim(), level.trim());
    if component.is_empty() || level.is_empty() {
        return Err(format!("expected component=level, got `{s}`"));
    }
    Ok((component.to_string(), level.to_string()))
}
