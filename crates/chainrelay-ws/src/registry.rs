//! Contract address → listeners, plus the upstream subscription backing them.
//!
//! One upstream `eth_subscribe` exists per tracked address no matter how many
//! listeners share it. All state sits behind a single reader/writer lock that
//! is never held across an upstream send.
//!
//! # Acknowledgement correlation
//! Every subscription remembers the request id of its in-flight subscribe and
//! the connection it was sent on. Request ids that stop backing a subscription
//! (replaced on resubscribe, or dropped with the last listener) are retired;
//! a late acknowledgement for one is stale and never attached to anything.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use chainrelay_core::error::TransportError;
use chainrelay_core::types::normalize_address;

use crate::error::RelayError;
use crate::listener::{ListenerHandle, ListenerId};

/// Retired request ids kept for stale-ack detection.
const RETIRED_CAPACITY: usize = 1024;

/// Subscription id assigned by the upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The upstream side the registry drives. Implemented by the connector.
#[async_trait]
pub trait UpstreamRequester: Send + Sync {
    fn next_request_id(&self) -> u64;

    /// Identifies the live connection. Changes on every successful connect.
    fn connection_epoch(&self) -> u64;

    async fn subscribe(&self, request_id: u64, contract_address: &str)
        -> Result<(), TransportError>;

    async fn unsubscribe(
        &self,
        request_id: u64,
        subscription: &SubscriptionId,
    ) -> Result<(), TransportError>;
}

struct Subscription {
    upstream_id: Option<SubscriptionId>,
    /// Request id of the in-flight `eth_subscribe`, cleared on acknowledgement.
    pending_request: Option<u64>,
    /// Connection epoch the latest subscribe was sent on.
    epoch: u64,
    listeners: IndexMap<ListenerId, ListenerHandle>,
}

impl Subscription {
    fn pending(request_id: u64, epoch: u64, listener: ListenerHandle) -> Self {
        let mut listeners = IndexMap::new();
        listeners.insert(listener.id(), listener);
        Self {
            upstream_id: None,
            pending_request: Some(request_id),
            epoch,
            listeners,
        }
    }

    fn route(&self, contract_address: &str) -> Route {
        Route {
            contract_address: contract_address.to_string(),
            listeners: self.listeners.values().cloned().collect(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    /// Insertion ordered: "oldest unassigned" is the first match.
    subscriptions: IndexMap<String, Subscription>,
    /// Oldest first.
    retired: IndexSet<u64>,
}

impl RegistryState {
    fn retire(&mut self, request_id: u64) {
        self.retired.insert(request_id);
        while self.retired.len() > RETIRED_CAPACITY {
            self.retired.shift_remove_index(0);
        }
    }

    /// Remove every subscription without listeners, retiring their pending
    /// requests. Returns the removed addresses with their upstream ids.
    fn drain_empty(&mut self) -> Vec<(String, Option<SubscriptionId>)> {
        let empty: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.listeners.is_empty())
            .map(|(address, _)| address.clone())
            .collect();

        let mut removed = Vec::with_capacity(empty.len());
        for address in empty {
            let Some(sub) = self.subscriptions.shift_remove(&address) else {
                continue;
            };
            if let Some(request_id) = sub.pending_request {
                self.retire(request_id);
            }
            removed.push((address, sub.upstream_id));
        }
        removed
    }
}

/// Result of [`SubscriptionRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// First listener for the address; an upstream subscribe was sent.
    Created,
    /// Joined an existing subscription.
    Joined,
}

/// Result of [`SubscriptionRegistry::assign_upstream_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckMatch {
    /// The id now backs the subscription for this address.
    Assigned(String),
    /// Answers a retired request; the upstream subscription has no owner.
    Stale,
    /// No subscription is waiting for an id.
    Unmatched,
}

/// Listeners to notify for one upstream subscription id.
#[derive(Debug, Clone)]
pub struct Route {
    pub contract_address: String,
    pub listeners: Vec<ListenerHandle>,
}

/// Externally visible state of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub contract_address: String,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,
    pub listeners: usize,
}

pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    upstream: Arc<dyn UpstreamRequester>,
    unsubscribe_upstream: bool,
}

impl SubscriptionRegistry {
    pub fn new(upstream: Arc<dyn UpstreamRequester>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            upstream,
            unsubscribe_upstream: true,
        }
    }

    /// Whether deleting a subscription sends `eth_unsubscribe` for its id.
    pub fn with_upstream_unsubscribe(mut self, enabled: bool) -> Self {
        self.unsubscribe_upstream = enabled;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `listener` to the subscription for `contract_address`, creating it
    /// (and sending the upstream subscribe) if this is the first listener.
    pub async fn subscribe(
        &self,
        contract_address: &str,
        listener: ListenerHandle,
    ) -> Result<SubscribeOutcome, RelayError> {
        let address = normalize_address(contract_address);
        let listener_id = listener.id();

        let request_id = {
            let mut state = self.write();
            if let Some(sub) = state.subscriptions.get_mut(&address) {
                sub.listeners.insert(listener_id, listener);
                tracing::debug!(%address, %listener_id, listeners = sub.listeners.len(), "listener joined subscription");
                return Ok(SubscribeOutcome::Joined);
            }
            let request_id = self.upstream.next_request_id();
            let epoch = self.upstream.connection_epoch();
            state
                .subscriptions
                .insert(address.clone(), Subscription::pending(request_id, epoch, listener));
            request_id
        };

        tracing::info!(%address, %listener_id, request_id, "subscribing upstream");
        self.upstream.subscribe(request_id, &address).await?;
        Ok(SubscribeOutcome::Created)
    }

    /// Remove `listener` from every subscription. Returns how many
    /// subscriptions were deleted because they became empty.
    pub async fn unsubscribe(&self, listener: ListenerId) -> usize {
        let removed = {
            let mut state = self.write();
            for sub in state.subscriptions.values_mut() {
                sub.listeners.shift_remove(&listener);
            }
            state.drain_empty()
        };
        let count = removed.len();
        self.release_upstream(removed).await;
        count
    }

    /// Remove one listener from one subscription after a failed push.
    /// Returns `true` if the listener was present.
    pub async fn evict(&self, contract_address: &str, listener: ListenerId) -> bool {
        let (found, removed) = {
            let mut state = self.write();
            let found = state
                .subscriptions
                .get_mut(contract_address)
                .map(|sub| sub.listeners.shift_remove(&listener).is_some())
                .unwrap_or(false);
            (found, state.drain_empty())
        };
        self.release_upstream(removed).await;
        found
    }

    async fn release_upstream(&self, removed: Vec<(String, Option<SubscriptionId>)>) {
        for (address, upstream_id) in removed {
            tracing::info!(%address, "last listener left, subscription removed");
            if let Some(id) = upstream_id {
                self.discard_upstream(&id).await;
            }
        }
    }

    /// Send `eth_unsubscribe` for an upstream id nothing routes to any more.
    /// No-op when upstream unsubscribe is disabled.
    pub async fn discard_upstream(&self, id: &SubscriptionId) {
        if !self.unsubscribe_upstream {
            return;
        }
        let request_id = self.upstream.next_request_id();
        if let Err(e) = self.upstream.unsubscribe(request_id, id).await {
            tracing::warn!(subscription = %id, error = %e, "upstream unsubscribe failed");
        }
    }

    /// Tracked contract addresses, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.read().subscriptions.keys().cloned().collect()
    }

    pub fn find_by_subscription_id(&self, id: &str) -> Option<Route> {
        let state = self.read();
        state
            .subscriptions
            .iter()
            .find(|(_, sub)| sub.upstream_id.as_ref().is_some_and(|s| s.0 == id))
            .map(|(address, sub)| sub.route(address))
    }

    /// Attach an acknowledged upstream id. The subscription whose pending
    /// request id matches wins. An ack for a retired request is stale. Only an
    /// ack carrying no id, or an id this registry never issued, falls back to
    /// the oldest subscription without an id.
    pub fn assign_upstream_id(&self, request_id: Option<u64>, upstream_id: SubscriptionId) -> AckMatch {
        let mut state = self.write();
        let state = &mut *state;

        let mut index = None;
        if let Some(rid) = request_id {
            index = state
                .subscriptions
                .values()
                .position(|s| s.upstream_id.is_none() && s.pending_request == Some(rid));
            if index.is_none() && state.retired.shift_remove(&rid) {
                return AckMatch::Stale;
            }
        }
        let index = index.or_else(|| {
            state
                .subscriptions
                .values()
                .position(|s| s.upstream_id.is_none())
        });

        let Some((address, sub)) = index.and_then(|i| state.subscriptions.get_index_mut(i)) else {
            return AckMatch::Unmatched;
        };
        // A fallback match leaves the subscription's own request unanswered.
        let superseded = sub.pending_request.take().filter(|p| Some(*p) != request_id);
        sub.upstream_id = Some(upstream_id);
        let address = address.clone();
        if let Some(superseded) = superseded {
            state.retire(superseded);
        }
        AckMatch::Assigned(address)
    }

    /// Drop the subscription whose pending subscribe the upstream refused.
    /// Returns it so its listeners can be told.
    pub fn reject(&self, request_id: u64) -> Option<Route> {
        let mut state = self.write();
        if state.retired.shift_remove(&request_id) {
            return None;
        }
        let index = state
            .subscriptions
            .values()
            .position(|s| s.upstream_id.is_none() && s.pending_request == Some(request_id))?;
        let (address, sub) = state.subscriptions.shift_remove_index(index)?;
        Some(sub.route(&address))
    }

    /// Re-issue the upstream subscribe for `contract_address` on a fresh
    /// connection. Ids from the previous connection are discarded. Returns
    /// `false` if the address is no longer tracked or was already subscribed
    /// on the current connection.
    pub async fn resubscribe(&self, contract_address: &str) -> Result<bool, RelayError> {
        let request_id = {
            let mut state = self.write();
            let epoch = self.upstream.connection_epoch();
            let Some(sub) = state.subscriptions.get_mut(contract_address) else {
                return Ok(false);
            };
            if sub.epoch == epoch {
                tracing::debug!(address = %contract_address, epoch, "already subscribed on this connection");
                return Ok(false);
            }
            let request_id = self.upstream.next_request_id();
            sub.upstream_id = None;
            sub.epoch = epoch;
            let replaced = sub.pending_request.replace(request_id);
            if let Some(replaced) = replaced {
                state.retire(replaced);
            }
            request_id
        };
        self.upstream.subscribe(request_id, contract_address).await?;
        Ok(true)
    }

    pub fn statuses(&self) -> Vec<SubscriptionStatus> {
        self.read()
            .subscriptions
            .iter()
            .map(|(address, sub)| SubscriptionStatus {
                contract_address: address.clone(),
                is_active: sub.upstream_id.is_some(),
                subscription_id: sub.upstream_id.clone(),
                listeners: sub.listeners.len(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().subscriptions.is_empty()
    }
}
