//! In-process publish/subscribe event bus.
//!
//! Mirrors the reference `InMemoryBus`: an optional per-topic validator
//! runs synchronously before publish, then every subscriber is fanned out
//! to via its own spawned task so a slow or failing subscriber never
//! blocks the publisher. Subscriber storage uses `dashmap` instead of a
//! single `asyncio.Lock`-guarded dict, since nothing here needs a single
//! global critical section.

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub type Validator = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;
pub type Subscriber = Arc<dyn Fn(String, Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Handle returned from [`EventBus::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

#[derive(Default)]
pub struct EventBus {
    subscribers: DashMap<String, Vec<(SubscriptionId, Subscriber)>>,
    validators: DashMap<String, Validator>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_validator(&self, topic: impl Into<String>, validator: Validator) {
        self.validators.insert(topic.into(), validator);
    }

    /// Validates (if a validator is registered), then fans the message out
    /// to every current subscriber on its own task. A validation failure
    /// aborts the publish before any subscriber is invoked.
    pub fn publish(&self, topic: &str, message: Value) -> Result<(), String> {
        if let Some(validator) = self.validators.get(topic) {
            validator(&message)?;
        }

        let Some(subs) = self.subscribers.get(topic) else {
            return Ok(());
        };

        for (_, sub) in subs.iter() {
            let sub = sub.clone();
            let topic = topic.to_string();
            let message = message.clone();
            tokio::spawn(async move {
                sub(topic, message).await;
            });
        }

        Ok(())
    }

    pub fn subscribe(&self, topic: impl Into<String>, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers
            .entry(topic.into())
            .or_default()
            .push((id, subscriber));
        id
    }

    pub fn unsubscribe(&self, topic: &str, id: SubscriptionId) {
        if let Some(mut subs) = self.subscribers.get_mut(topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let counter = counter.clone();
            bus.subscribe(
                "detections",
                Arc::new(move |_topic, _msg| {
                    let counter = counter.clone();
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            );
        }

        bus.publish("detections", serde_json::json!({"type": "smoke"})).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let id = bus.subscribe(
            "detections",
            Arc::new(move |_topic, _msg| {
                let counter = counter_clone.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            }),
        );

        bus.unsubscribe("detections", id);
        bus.publish("detections", serde_json::json!({})).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn validator_failure_prevents_publish() {
        let bus = EventBus::new();
        bus.set_validator(
            "missions",
            Arc::new(|msg| {
                if msg.get("lat").is_none() {
                    Err("missing lat".to_string())
                } else {
                    Ok(())
                }
            }),
        );

        let result = bus.publish("missions", serde_json::json!({}));
        assert!(result.is_err());
    }
}
