use crate::features::event_bus::{
    EventBus, EventBusError, EventBusResult, EventHandler, SubscriptionId,
};
use async_trait::async_trait;
use ctrlplane_core::{Event, EventType};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

struct Subscription {
    id: SubscriptionId,
    handler: Arc<dyn EventHandler>,
    event_types: Vec<EventType>,
}

impl Subscription {
    fn wants(&self, event_type: EventType) -> bool {
        self.event_types.is_empty() || self.event_types.contains(&event_type)
    }
}

/// Synchronous in-process bus.
///
/// `publish` awaits every matching handler in subscription order. A failing
/// handler does not stop delivery to the ones after it; the first failure is
/// returned once all of them have run.
#[derive(Default)]
pub struct InMemoryEventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .read()
            .map(|subscriptions| subscriptions.len())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn poisoned() -> EventBusError {
        EventBusError::Handler("subscription table lock poisoned".to_string())
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> EventBusResult<()> {
        if self.is_closed() {
            return Err(EventBusError::Closed);
        }

        // Handlers run without the lock held so they may touch the bus.
        let handlers: Vec<(SubscriptionId, Arc<dyn EventHandler>)> = {
            let subscriptions = self.subscriptions.read().map_err(|_| Self::poisoned())?;
            subscriptions
                .iter()
                .filter(|subscription| subscription.wants(event.event_type))
                .map(|subscription| (subscription.id, Arc::clone(&subscription.handler)))
                .collect()
        };

        debug!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            subscribers = handlers.len(),
            "Publishing event"
        );

        let mut first_error = None;
        for (id, handler) in handlers {
            if let Err(e) = handler.handle(&event).await {
                warn!(
                    subscription = %id,
                    event_type = %event.event_type,
                    error = %e,
                    "Event handler failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        event_types: Vec<EventType>,
    ) -> EventBusResult<SubscriptionId> {
        if self.is_closed() {
            return Err(EventBusError::Closed);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut subscriptions = self.subscriptions.write().map_err(|_| Self::poisoned())?;
        subscriptions.push(Subscription {
            id,
            handler,
            event_types,
        });
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.subscriptions.write() {
            Ok(mut subscriptions) => {
                let before = subscriptions.len();
                subscriptions.retain(|subscription| subscription.id != id);
                subscriptions.len() != before
            }
            Err(_) => false,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        label: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recording {
        async fn handle(&self, event: &Event) -> EventBusResult<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.label, event.event_type));
            if self.fail {
                Err(EventBusError::Handler(format!("{} refused", self.label)))
            } else {
                Ok(())
            }
        }
    }

    fn recorder(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Recording> {
        Arc::new(Recording {
            label,
            fail: false,
            log: Arc::clone(log),
        })
    }

    #[tokio::test]
    async fn test_delivers_in_subscription_order() {
        let bus = InMemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(recorder("a", &log), vec![]).await.unwrap();
        bus.subscribe(recorder("b", &log), vec![]).await.unwrap();

        bus.publish(Event::new(EventType::InstanceCreated, "acme"))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:instance.created", "b:instance.created"]
        );
    }

    #[tokio::test]
    async fn test_filters_by_event_type() {
        let bus = InMemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(recorder("stops", &log), vec![EventType::InstanceStopped])
            .await
            .unwrap();

        bus.publish(Event::new(EventType::InstanceStarted, "acme"))
            .await
            .unwrap();
        bus.publish(Event::new(EventType::InstanceStopped, "acme"))
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["stops:instance.stopped"]);
    }

    #[tokio::test]
    async fn test_handler_error_returned_after_full_delivery() {
        let bus = InMemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            Arc::new(Recording {
                label: "bad",
                fail: true,
                log: Arc::clone(&log),
            }),
            vec![],
        )
        .await
        .unwrap();
        bus.subscribe(recorder("good", &log), vec![]).await.unwrap();

        let err = bus
            .publish(Event::new(EventType::InstanceFailed, "acme"))
            .await
            .unwrap_err();

        assert_eq!(err, EventBusError::Handler("bad refused".to_string()));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = InMemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(recorder("a", &log), vec![]).await.unwrap();

        assert!(bus.unsubscribe(id).await);
        assert!(!bus.unsubscribe(id).await);

        bus.publish(Event::new(EventType::InstanceCreated, "acme"))
            .await
            .unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_publish_and_subscribe() {
        let bus = InMemoryEventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(recorder("a", &log), vec![]).await.unwrap();

        bus.close().await;
        assert!(bus.is_closed());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.publish(Event::new(EventType::InstanceCreated, "acme"))
                .await,
            Err(EventBusError::Closed)
        );
        assert!(matches!(
            bus.subscribe(recorder("b", &log), vec![]).await,
            Err(EventBusError::Closed)
        ));
    }
}
