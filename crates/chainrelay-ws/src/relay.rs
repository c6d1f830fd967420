//! Wiring of connector, registry and router into one live relay.

use std::sync::Arc;

use crate::connector::{ConnectionState, ConnectorConfig, UpstreamConnector};
use crate::dialer::UpstreamDialer;
use crate::error::RelayError;
use crate::listener::{ListenerHandle, ListenerId};
use crate::registry::{SubscribeOutcome, SubscriptionRegistry, SubscriptionStatus};
use crate::router::NotificationRouter;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub connector: ConnectorConfig,
    /// Send `eth_unsubscribe` when the last listener of an address leaves.
    pub unsubscribe_upstream: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            connector: ConnectorConfig::default(),
            unsubscribe_upstream: true,
        }
    }
}

/// Shared handle to the running relay. Cheap to clone.
#[derive(Clone)]
pub struct LiveRelay {
    connector: Arc<UpstreamConnector>,
    registry: Arc<SubscriptionRegistry>,
    router: Arc<NotificationRouter>,
}

impl LiveRelay {
    pub fn new(dialer: impl UpstreamDialer, config: RelayConfig) -> Self {
        let connector = Arc::new(UpstreamConnector::new(dialer, config.connector));
        let registry = Arc::new(
            SubscriptionRegistry::new(connector.clone())
                .with_upstream_unsubscribe(config.unsubscribe_upstream),
        );
        let router = Arc::new(NotificationRouter::new(Arc::clone(&registry)));
        Self {
            connector,
            registry,
            router,
        }
    }

    /// Open the upstream connection and start its background tasks.
    pub async fn start(&self) -> Result<(), RelayError> {
        self.connector
            .start(Arc::clone(&self.registry), Arc::clone(&self.router))
            .await
    }

    pub async fn subscribe(
        &self,
        contract_address: &str,
        listener: ListenerHandle,
    ) -> Result<SubscribeOutcome, RelayError> {
        self.registry.subscribe(contract_address, listener).await
    }

    pub async fn unsubscribe(&self, listener: ListenerId) {
        self.registry.unsubscribe(listener).await;
    }

    pub fn statuses(&self) -> Vec<SubscriptionStatus> {
        self.registry.statuses()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connector.state()
    }

    pub fn connector(&self) -> &Arc<UpstreamConnector> {
        &self.connector
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}
