//! chainrelay-ws: one shared upstream subscription feed, many listeners.
//!
//! # Features
//! - Single persistent upstream WebSocket with a dedicated reconnection task
//! - Deduplicated reconnect signal; fixed delay between attempts
//! - One upstream `eth_subscribe` per contract address, shared by every listener
//! - Resubscribe of every tracked address after reconnect
//! - Isolated per-listener fan-out with eviction of failed listeners
//! - Acknowledgements correlated by request id; stale and rejected requests never misroute

pub mod connector;
pub mod dialer;
pub mod error;
pub mod listener;
pub mod registry;
pub mod relay;
pub mod router;

pub use connector::{ConnectionState, ConnectorConfig, UpstreamConnector};
pub use dialer::{UpstreamDialer, UpstreamSink, UpstreamSource, WsDialer};
pub use error::RelayError;
pub use listener::{ListenerHandle, ListenerId, ListenerSink, PushError};
pub use registry::{
    AckMatch, SubscribeOutcome, SubscriptionId, SubscriptionRegistry, SubscriptionStatus, UpstreamRequester,
};
pub use relay::{LiveRelay, RelayConfig};
pub use router::{NotificationRouter, RouteOutcome};
