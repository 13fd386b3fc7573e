use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use firewatch_common::{haversine_m, DeliveryError, FireEvent, StoreError, Subscriber};

use super::alert::Alert;
use crate::stats::FanoutStats;
use crate::traits::{PushTransport, SubscriberStore};

/// Alerts subscribers near a newly persisted fire.
///
/// Sends run concurrently up to `max_concurrent_sends` and are all awaited
/// before `notify` returns. One subscriber's failure never blocks another.
pub struct NotificationFanout {
    subscribers: Arc<dyn SubscriberStore>,
    transport: Arc<dyn PushTransport>,
    alert_radius_m: f64,
    max_concurrent_sends: usize,
}

enum Delivery {
    Sent,
    Failed,
    TokenCleared,
}

impl NotificationFanout {
    pub const DEFAULT_ALERT_RADIUS_M: f64 = 50_000.0;
    pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 16;

    pub fn new(subscribers: Arc<dyn SubscriberStore>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            subscribers,
            transport,
            alert_radius_m: Self::DEFAULT_ALERT_RADIUS_M,
            max_concurrent_sends: Self::DEFAULT_MAX_CONCURRENT_SENDS,
        }
    }

    pub fn with_alert_radius(mut self, alert_radius_m: f64) -> Self {
        self.alert_radius_m = alert_radius_m;
        self
    }

    pub fn with_max_concurrent_sends(mut self, max: usize) -> Self {
        self.max_concurrent_sends = max.max(1);
        self
    }

    /// Alert every subscriber within the alert radius of `event`.
    ///
    /// Fails only if the subscriber list cannot be read.
    pub async fn notify(&self, event: &FireEvent) -> Result<FanoutStats, StoreError> {
        let subscribers = self.subscribers.subscribers().await?;
        let mut stats = FanoutStats {
            subscribers: subscribers.len() as u32,
            ..Default::default()
        };

        let targets: Vec<(Subscriber, String, f64)> = subscribers
            .into_iter()
            .filter_map(|sub| {
                let location = sub.location?;
                let token = sub.push_token.clone()?;
                let distance_m = haversine_m(location, event.point());
                (distance_m <= self.alert_radius_m).then_some((sub, token, distance_m))
            })
            .collect();
        stats.in_range = targets.len() as u32;

        if targets.is_empty() {
            debug!(event_id = %event.id, "No subscribers in range");
            return Ok(stats);
        }

        let outcomes: Vec<Delivery> = stream::iter(targets)
            .map(|(sub, token, distance_m)| self.deliver(event, sub, token, distance_m))
            .buffer_unordered(self.max_concurrent_sends)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Delivery::Sent => stats.sent += 1,
                Delivery::Failed => stats.failed += 1,
                Delivery::TokenCleared => {
                    stats.failed += 1;
                    stats.tokens_cleared += 1;
                }
            }
        }

        info!(
            event_id = %event.id,
            in_range = stats.in_range,
            sent = stats.sent,
            failed = stats.failed,
            tokens_cleared = stats.tokens_cleared,
            "Fan-out complete"
        );
        Ok(stats)
    }

    async fn deliver(
        &self,
        event: &FireEvent,
        subscriber: Subscriber,
        token: String,
        distance_m: f64,
    ) -> Delivery {
        let alert = Alert::for_event(event, distance_m);
        match self.transport.send(&token, &alert).await {
            Ok(()) => Delivery::Sent,
            Err(DeliveryError::InvalidToken) => {
                match self.subscribers.clear_subscriber_token(&subscriber.id).await {
                    Ok(()) => {
                        info!(subscriber = %subscriber.id, "Cleared invalid push token");
                        Delivery::TokenCleared
                    }
                    Err(e) => {
                        warn!(subscriber = %subscriber.id, error = %e, "Failed to clear invalid push token");
                        Delivery::Failed
                    }
                }
            }
            Err(DeliveryError::Other(reason)) => {
                warn!(subscriber = %subscriber.id, error = %reason, "Push delivery failed");
                Delivery::Failed
            }
        }
    }
}
