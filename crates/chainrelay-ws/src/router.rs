//! Classifies inbound upstream messages and fans notifications out to the
//! listeners registered for the originating subscription.

use std::sync::Arc;

use chainrelay_core::subscription::UpstreamMessage;
use chainrelay_core::types::DownstreamMessage;

use crate::registry::{AckMatch, SubscriptionRegistry};

/// What [`NotificationRouter::route`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// An acknowledgement assigned an upstream id to this address.
    Assigned { contract_address: String },
    /// A notification was pushed to `delivered` listeners; `evicted` failed.
    Delivered {
        contract_address: String,
        delivered: usize,
        evicted: usize,
    },
    /// The upstream refused a pending subscribe; the subscription was removed
    /// and its `notified` listeners were sent an error.
    Rejected {
        contract_address: String,
        notified: usize,
    },
    /// Could not be correlated with any subscription.
    Dropped,
    /// Neither an acknowledgement nor a notification.
    Ignored,
}

pub struct NotificationRouter {
    registry: Arc<SubscriptionRegistry>,
}

impl NotificationRouter {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn route(&self, text: &str) -> RouteOutcome {
        match UpstreamMessage::parse(text) {
            UpstreamMessage::Ack {
                id,
                subscription_id,
            } => {
                let sub = subscription_id.clone();
                match self.registry.assign_upstream_id(id.as_u64(), sub.into()) {
                    AckMatch::Assigned(contract_address) => {
                        tracing::info!(%contract_address, subscription = %subscription_id, request_id = %id, "upstream subscription confirmed");
                        RouteOutcome::Assigned { contract_address }
                    }
                    AckMatch::Stale => {
                        tracing::info!(subscription = %subscription_id, request_id = %id, "acknowledgement for a retired request, releasing upstream id");
                        self.registry.discard_upstream(&subscription_id.into()).await;
                        RouteOutcome::Dropped
                    }
                    AckMatch::Unmatched => {
                        tracing::warn!(subscription = %subscription_id, request_id = %id, "acknowledgement with no pending subscription");
                        RouteOutcome::Dropped
                    }
                }
            }
            UpstreamMessage::Notification {
                subscription_id,
                payload,
            } => {
                let Some(route) = self.registry.find_by_subscription_id(&subscription_id) else {
                    tracing::warn!(subscription = %subscription_id, "notification for unknown subscription");
                    return RouteOutcome::Dropped;
                };

                let envelope = DownstreamMessage::transaction(&route.contract_address, payload);
                let mut delivered = 0;
                let mut failed = Vec::new();
                for listener in &route.listeners {
                    match listener.push(&envelope) {
                        Ok(()) => delivered += 1,
                        Err(e) => {
                            tracing::warn!(contract_address = %route.contract_address, error = %e, "evicting listener");
                            failed.push(listener.id());
                        }
                    }
                }
                for id in &failed {
                    self.registry.evict(&route.contract_address, *id).await;
                }

                tracing::debug!(contract_address = %route.contract_address, delivered, evicted = failed.len(), "notification delivered");
                RouteOutcome::Delivered {
                    contract_address: route.contract_address,
                    delivered,
                    evicted: failed.len(),
                }
            }
            UpstreamMessage::Rejected { id, error } => {
                let Some(route) = id.as_u64().and_then(|rid| self.registry.reject(rid)) else {
                    tracing::warn!(request_id = %id, error = %error, "upstream rejected request");
                    return RouteOutcome::Ignored;
                };
                tracing::warn!(contract_address = %route.contract_address, request_id = %id, error = %error, "upstream rejected subscription");

                let envelope = DownstreamMessage::error(
                    &route.contract_address,
                    format!("upstream subscription rejected: {error}"),
                );
                let notified = route
                    .listeners
                    .iter()
                    .filter(|listener| listener.push(&envelope).is_ok())
                    .count();
                RouteOutcome::Rejected {
                    contract_address: route.contract_address,
                    notified,
                }
            }
            UpstreamMessage::Unrecognized => {
                tracing::debug!(message = %text, "unrecognized upstream message");
                RouteOutcome::Ignored
            }
        }
    }
}
