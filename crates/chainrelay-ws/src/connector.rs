//! The single persistent upstream connection.
//!
//! State machine: `Disconnected → Connecting → Connected → Reconnecting →
//! Connecting …`. A read loop owns the read half while connected; on the first
//! read error it marks the connection lost, signals the reconnection task and
//! exits. The reconnection task retries `connect` with a fixed delay until it
//! succeeds, restarts the read loop and resubscribes every tracked address.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use chainrelay_core::error::TransportError;
use chainrelay_core::request::JsonRpcRequest;
use chainrelay_core::subscription::{subscribe_request, unsubscribe_request};

use crate::dialer::{UpstreamDialer, UpstreamSink, UpstreamSource};
use crate::error::RelayError;
use crate::registry::{SubscriptionId, SubscriptionRegistry, UpstreamRequester};
use crate::router::NotificationRouter;

/// Default upstream feed: full transactions mined to a watched address.
pub const DEFAULT_FEED: &str = "alchemy_minedTransactions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// First `eth_subscribe` parameter.
    pub feed: String,
    /// Fixed pause between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            feed: DEFAULT_FEED.into(),
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

pub struct UpstreamConnector {
    dialer: Box<dyn UpstreamDialer>,
    config: ConnectorConfig,
    writer: tokio::sync::Mutex<Option<Box<dyn UpstreamSink>>>,
    state: Mutex<ConnectionState>,
    /// Capacity 1: concurrent failures collapse into one pending reconnect.
    reconnect_tx: mpsc::Sender<()>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<()>>>,
    next_id: AtomicU64,
    /// Bumped on every successful connect.
    epoch: AtomicU64,
    reconnects: AtomicU64,
}

impl UpstreamConnector {
    pub fn new(dialer: impl UpstreamDialer, config: ConnectorConfig) -> Self {
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        Self {
            dialer: Box::new(dialer),
            config,
            writer: tokio::sync::Mutex::new(None),
            state: Mutex::new(ConnectionState::Disconnected),
            reconnect_tx,
            reconnect_rx: Mutex::new(Some(reconnect_rx)),
            next_id: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Completed reconnections since start.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    pub fn endpoint(&self) -> &str {
        self.dialer.endpoint()
    }

    /// Open the connection and install its write half. The read half is
    /// returned for the caller to drive.
    pub async fn connect(&self) -> Result<Box<dyn UpstreamSource>, TransportError> {
        self.set_state(ConnectionState::Connecting);
        match self.dialer.dial().await {
            Ok((sink, source)) => {
                {
                    let mut writer = self.writer.lock().await;
                    *writer = Some(sink);
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                }
                self.set_state(ConnectionState::Connected);
                tracing::info!(endpoint = %self.endpoint(), "upstream connected");
                Ok(source)
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Write one request on the active connection.
    pub async fn send(&self, req: &JsonRpcRequest) -> Result<(), TransportError> {
        let text = serde_json::to_string(req)?;
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(sink) if self.state() == ConnectionState::Connected => sink.send_text(text).await,
            _ => Err(TransportError::NotConnected),
        }
    }

    /// Connect, then spawn the read loop and the reconnection task. An error
    /// here means the very first connection attempt failed.
    pub async fn start(
        self: &Arc<Self>,
        registry: Arc<SubscriptionRegistry>,
        router: Arc<NotificationRouter>,
    ) -> Result<(), RelayError> {
        let reconnect_rx = self
            .reconnect_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RelayError::AlreadyStarted)?;

        let source = self.connect().await?;
        tokio::spawn(Arc::clone(self).read_loop(source, Arc::clone(&router)));
        tokio::spawn(Arc::clone(self).reconnection_loop(reconnect_rx, registry, router));
        Ok(())
    }

    async fn read_loop(self: Arc<Self>, mut source: Box<dyn UpstreamSource>, router: Arc<NotificationRouter>) {
        loop {
            match source.next_text().await {
                Ok(text) => {
                    router.route(&text).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "upstream read failed, connection lost");
                    self.set_state(ConnectionState::Reconnecting);
                    *self.writer.lock().await = None;
                    self.request_reconnect();
                    return;
                }
            }
        }
    }

    fn request_reconnect(&self) {
        match self.reconnect_tx.try_send(()) {
            Ok(()) => tracing::debug!("reconnect requested"),
            Err(TrySendError::Full(())) => tracing::debug!("reconnect already pending"),
            Err(TrySendError::Closed(())) => tracing::warn!("reconnection task is gone"),
        }
    }

    async fn reconnection_loop(
        self: Arc<Self>,
        mut signals: mpsc::Receiver<()>,
        registry: Arc<SubscriptionRegistry>,
        router: Arc<NotificationRouter>,
    ) {
        while signals.recv().await.is_some() {
            let mut attempt = 0u32;
            let source = loop {
                attempt += 1;
                match self.connect().await {
                    Ok(source) => break source,
                    Err(e) => {
                        self.set_state(ConnectionState::Reconnecting);
                        tracing::warn!(
                            attempt,
                            error = %e,
                            "upstream reconnect failed, retrying in {:?}",
                            self.config.reconnect_delay
                        );
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            };
            self.reconnects.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(Arc::clone(&self).read_loop(source, Arc::clone(&router)));

            let addresses = registry.snapshot();
            tracing::info!(attempt, subscriptions = addresses.len(), "upstream reconnected, resubscribing");
            for address in addresses {
                match registry.resubscribe(&address).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(%address, "resubscribe not needed"),
                    Err(e) => tracing::warn!(%address, error = %e, "resubscribe failed"),
                }
            }
        }
    }
}

#[async_trait]
impl UpstreamRequester for UpstreamConnector {
    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn connection_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, request_id: u64, contract_address: &str) -> Result<(), TransportError> {
        self.send(&subscribe_request(request_id, &self.config.feed, contract_address))
            .await
    }

    async fn unsubscribe(
        &self,
        request_id: u64,
        subscription: &SubscriptionId,
    ) -> Result<(), TransportError> {
        self.send(&unsubscribe_request(request_id, &subscription.0)).await
    }
}
