// In-process event fan-out.
//
// serenity delivers every gateway event to one handler. Extensions each want
// their own slice of that, so the Discord layer forwards events into a bus
// and extensions subscribe to it. Generic over the event type, so it has
// NO Discord dependencies and can be tested with plain values.

use crate::core::errors::BoxError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

#[async_trait]
pub trait EventHandler<E>: Send + Sync {
    async fn handle(&self, event: &E) -> Result<(), BoxError>;
}

/// Adapter so plain async closures can subscribe. The closure gets its own
/// copy of the event.
pub struct FnEventHandler<F>(pub F);

#[async_trait]
impl<E, F, Fut> EventHandler<E> for FnEventHandler<F>
where
    E: Clone + Send + Sync + 'static,
    F: Fn(E) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), BoxError>> + Send,
{
    async fn handle(&self, event: &E) -> Result<(), BoxError> {
        (self.0)(event.clone()).await
    }
}

pub type EventFilter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

/// What happened during one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub ran: usize,
    /// Skipped because their filter said no.
    pub filtered: usize,
    pub failed: usize,
}

struct Subscription<E> {
    id: HandlerId,
    owner: String,
    name: String,
    filter: Option<EventFilter<E>>,
    handler: Arc<dyn EventHandler<E>>,
}

impl<E> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            owner: self.owner.clone(),
            name: self.name.clone(),
            filter: self.filter.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

pub struct EventBus<E> {
    subscriptions: RwLock<Vec<Subscription<E>>>,
    next_id: AtomicU64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E: Send + Sync> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `handler`. `owner` groups handlers (usually the extension
    /// name) so they can be removed together.
    pub fn subscribe(
        &self,
        owner: &str,
        name: &str,
        handler: Arc<dyn EventHandler<E>>,
    ) -> HandlerId {
        self.insert(owner, name, None, handler)
    }

    /// Like `subscribe`, but the handler only sees events `filter` accepts.
    pub fn subscribe_filtered(
        &self,
        owner: &str,
        name: &str,
        filter: EventFilter<E>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> HandlerId {
        self.insert(owner, name, Some(filter), handler)
    }

    fn insert(
        &self,
        owner: &str,
        name: &str,
        filter: Option<EventFilter<E>>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Subscription {
                id,
                owner: owner.to_string(),
                name: name.to_string(),
                filter,
                handler,
            });
        id
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Remove every handler `owner` subscribed. Returns how many.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = subscriptions.len();
        subscriptions.retain(|s| s.owner != owner);
        before - subscriptions.len()
    }

    /// Run every handler in subscription order. A failing handler is logged
    /// and counted; the rest still run.
    pub async fn dispatch(&self, event: &E) -> DispatchReport {
        // Snapshot so no lock is held across awaits and handlers may
        // subscribe or unsubscribe while running.
        let subscriptions: Vec<Subscription<E>> = self
            .subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let mut report = DispatchReport::default();
        for subscription in subscriptions {
            if let Some(filter) = &subscription.filter {
                if !filter(event) {
                    report.filtered += 1;
                    continue;
                }
            }

            report.ran += 1;
            if let Err(e) = subscription.handler.handle(event).await {
                report.failed += 1;
                warn!(
                    owner = %subscription.owner,
                    handler = %subscription.name,
                    "Event handler failed: {}",
                    e
                );
            }
        }
        report
    }

    pub fn len(&self) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(owner, handler name)` pairs in dispatch order.
    pub fn handler_names(&self) -> Vec<(String, String)> {
        self.subscriptions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|s| (s.owner.clone(), s.name.clone()))
            .collect()
    }
}
