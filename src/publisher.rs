//! Fan-out of coupon domain events over NATS

use crate::domain::events::CouponEvent;

pub const SUBJECT_PREFIX: &str = "coupons";

/// Publishes events when a NATS client is configured; otherwise drops them.
#[derive(Clone, Debug, Default)]
pub struct EventPublisher { client: Option<async_nats::Client> }

impl EventPublisher {
    pub fn new(client: Option<async_nats::Client>) -> Self { Self { client } }
    pub fn disabled() -> Self { Self::default() }
    pub fn is_enabled(&self) -> bool { self.client.is_some() }

    pub fn subject(event: &CouponEvent) -> String { format!("{SUBJECT_PREFIX}.{}", event.kind()) }

    pub async fn publish(&self, events: Vec<CouponEvent>) {
        let Some(client) = &self.client else { return };
        for event in events {
            let subject = Self::subject(&event);
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { tracing::warn!(%subject, error = %e, "could not encode coupon event"); continue; }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(%subject, error = %e, "could not publish coupon event");
            }
        }
    }
}
