// Routing for button and select-menu presses.
//
// Commands register a handler under a custom id (or an id prefix) when they
// send components, and the event handler dispatches every component
// interaction here. Works on plain ids, NO Discord dependencies.

use crate::core::errors::BoxError;
use crate::core::ratelimit::DedupCache;
use async_trait::async_trait;
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Discord rejects custom ids longer than this.
pub const MAX_CUSTOM_ID_LEN: usize = 100;
const CUSTOM_ID_SUFFIX_LEN: usize = 16;

/// A component interaction, reduced to what handlers need.
#[derive(Debug, Clone, Default)]
pub struct ComponentEvent {
    pub interaction_id: u64,
    pub custom_id: String,
    pub user_id: u64,
    pub channel_id: u64,
    pub guild_id: Option<u64>,
    pub message_id: u64,
    /// Selected values for select menus; empty for buttons.
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentResponse {
    /// Acknowledge without changing anything.
    Acknowledge,
    /// Send a new message in reply.
    Reply { content: String, ephemeral: bool },
    /// Edit the message the component is attached to.
    Update { content: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentOutcome {
    Handled(ComponentResponse),
    /// Pressed by someone other than the registration's owner.
    NotOwner { owner: u64 },
    Expired,
    /// No handler for this custom id.
    Unknown,
    /// This interaction was already dispatched.
    Duplicate,
    Failed(String),
}

#[async_trait]
pub trait ComponentHandler: Send + Sync {
    async fn handle(&self, event: &ComponentEvent) -> Result<ComponentResponse, BoxError>;
}

/// Adapter so plain async closures can be registered.
pub struct FnComponentHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ComponentHandler for FnComponentHandler<F>
where
    F: Fn(ComponentEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentResponse, BoxError>> + Send,
{
    async fn handle(&self, event: &ComponentEvent) -> Result<ComponentResponse, BoxError> {
        (self.0)(event.clone()).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRegistration {
    pub custom_id: String,
    /// Only this user may press the component.
    pub owner: Option<u64>,
    pub expires_after: Option<Duration>,
    /// Remove the registration after the first successful dispatch.
    pub once: bool,
}

impl ComponentRegistration {
    pub fn new(custom_id: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            owner: None,
            expires_after: None,
            once: false,
        }
    }

    pub fn owned_by(mut self, user_id: u64) -> Self {
        self.owner = Some(user_id);
        self
    }

    pub fn expires_after(mut self, ttl: Duration) -> Self {
        self.expires_after = Some(ttl);
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

#[derive(Clone)]
struct Entry {
    registration: ComponentRegistration,
    handler: Arc<dyn ComponentHandler>,
    registered_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.registration
            .expires_after
            .is_some_and(|ttl| now.saturating_duration_since(self.registered_at) >= ttl)
    }
}

enum Route {
    Exact,
    Prefix(String),
}

pub struct ComponentRegistry {
    exact: DashMap<String, Entry>,
    prefixes: DashMap<String, Entry>,
    seen: DedupCache,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            exact: DashMap::new(),
            prefixes: DashMap::new(),
            // Interactions must be answered within 15 minutes; nothing is
            // redelivered after that.
            seen: DedupCache::new(Duration::from_secs(15 * 60)),
        }
    }

    /// A fresh custom id: `<prefix>:<random>`, capped at Discord's length limit.
    /// A long prefix is shortened; the random part is always kept whole.
    pub fn new_custom_id(prefix: &str) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CUSTOM_ID_SUFFIX_LEN)
            .map(char::from)
            .collect();
        let room = MAX_CUSTOM_ID_LEN - CUSTOM_ID_SUFFIX_LEN - 1;
        let mut cut = prefix.len().min(room);
        while !prefix.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}:{}", &prefix[..cut], suffix)
    }

    pub fn register(
        &self,
        registration: ComponentRegistration,
        handler: impl ComponentHandler + 'static,
    ) {
        self.register_arc(registration, Arc::new(handler));
    }

    pub fn register_arc(
        &self,
        registration: ComponentRegistration,
        handler: Arc<dyn ComponentHandler>,
    ) {
        debug!(custom_id = %registration.custom_id, "Registered component handler");
        self.exact.insert(
            registration.custom_id.clone(),
            Entry {
                registration,
                handler,
                registered_at: Instant::now(),
            },
        );
    }

    /// Route every custom id starting with `registration.custom_id`.
    pub fn register_prefix(
        &self,
        registration: ComponentRegistration,
        handler: impl ComponentHandler + 'static,
    ) {
        debug!(prefix = %registration.custom_id, "Registered component prefix");
        self.prefixes.insert(
            registration.custom_id.clone(),
            Entry {
                registration,
                handler: Arc::new(handler),
                registered_at: Instant::now(),
            },
        );
    }

    /// Remove an exact registration or a prefix route.
    pub fn unregister(&self, custom_id: &str) -> bool {
        self.exact.remove(custom_id).is_some() || self.prefixes.remove(custom_id).is_some()
    }

    fn lookup(&self, custom_id: &str) -> Option<(Route, Entry)> {
        if let Some(entry) = self.exact.get(custom_id) {
            return Some((Route::Exact, entry.clone()));
        }

        self.prefixes
            .iter()
            .filter(|entry| custom_id.starts_with(entry.key().as_str()))
            .max_by_key(|entry| entry.key().len())
            .map(|entry| (Route::Prefix(entry.key().clone()), entry.value().clone()))
    }

    fn remove_route(&self, route: &Route, custom_id: &str) -> Option<Entry> {
        match route {
            Route::Exact => self.exact.remove(custom_id).map(|(_, entry)| entry),
            Route::Prefix(prefix) => self.prefixes.remove(prefix).map(|(_, entry)| entry),
        }
    }

    fn restore_route(&self, route: &Route, custom_id: &str, entry: Entry) {
        match route {
            Route::Exact => self.exact.insert(custom_id.to_string(), entry),
            Route::Prefix(prefix) => self.prefixes.insert(prefix.clone(), entry),
        };
    }

    pub async fn dispatch(&self, event: &ComponentEvent) -> ComponentOutcome {
        if !self.seen.claim(&event.interaction_id.to_string()) {
            debug!(interaction_id = event.interaction_id, "Duplicate component interaction");
            return ComponentOutcome::Duplicate;
        }

        let Some((route, entry)) = self.lookup(&event.custom_id) else {
            return ComponentOutcome::Unknown;
        };

        if entry.is_expired(Instant::now()) {
            self.remove_route(&route, &event.custom_id);
            return ComponentOutcome::Expired;
        }

        if let Some(owner) = entry.registration.owner {
            if owner != event.user_id {
                return ComponentOutcome::NotOwner { owner };
            }
        }

        // A one-shot registration is taken out before running so two presses
        // can't both win it.
        let entry = if entry.registration.once {
            match self.remove_route(&route, &event.custom_id) {
                Some(entry) => entry,
                None => return ComponentOutcome::Unknown,
            }
        } else {
            entry
        };

        match entry.handler.handle(event).await {
            Ok(response) => ComponentOutcome::Handled(response),
            Err(e) => {
                warn!(custom_id = %event.custom_id, "Component handler failed: {}", e);
                if entry.registration.once {
                    self.restore_route(&route, &event.custom_id, entry);
                }
                ComponentOutcome::Failed(e.to_string())
            }
        }
    }

    /// Drop expired registrations and old dedup keys. Returns registrations removed.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        // Counted inside retain: registrations may land while this runs.
        let mut removed = 0;
        let mut keep = |entry: &Entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        };
        self.exact.retain(|_, entry| keep(entry));
        self.prefixes.retain(|_, entry| keep(entry));
        self.seen.sweep(now);
        removed
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    static NEXT_INTERACTION: AtomicU64 = AtomicU64::new(1);

    fn press(custom_id: &str, user_id: u64) -> ComponentEvent {
        ComponentEvent {
            interaction_id: NEXT_INTERACTION.fetch_add(1, Ordering::Relaxed),
            custom_id: custom_id.to_string(),
            user_id,
            ..Default::default()
        }
    }

    fn reply(text: &'static str) -> impl ComponentHandler {
        FnComponentHandler(move |_event: ComponentEvent| async move {
            Ok::<_, BoxError>(ComponentResponse::Update {
                content: text.to_string(),
            })
        })
    }

    struct Flaky {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ComponentHandler for Flaky {
        async fn handle(&self, _: &ComponentEvent) -> Result<ComponentResponse, BoxError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("first call fails".into())
            } else {
                Ok(ComponentResponse::Acknowledge)
            }
        }
    }

    #[tokio::test]
    async fn exact_ids_beat_prefixes_and_longest_prefix_wins() {
        let registry = ComponentRegistry::new();
        registry.register_prefix(ComponentRegistration::new("poll:"), reply("poll"));
        registry.register_prefix(ComponentRegistration::new("poll:abc:"), reply("poll abc"));
        registry.register(ComponentRegistration::new("poll:abc:close"), reply("close"));

        let outcome = |text: &str| ComponentOutcome::Handled(ComponentResponse::Update {
            content: text.to_string(),
        });
        assert_eq!(registry.dispatch(&press("poll:abc:close", 1)).await, outcome("close"));
        assert_eq!(registry.dispatch(&press("poll:abc:yes", 1)).await, outcome("poll abc"));
        assert_eq!(registry.dispatch(&press("poll:xyz:yes", 1)).await, outcome("poll"));
        assert_eq!(registry.dispatch(&press("other", 1)).await, ComponentOutcome::Unknown);
    }

    #[tokio::test]
    async fn duplicate_interactions_are_dropped() {
        let registry = ComponentRegistry::new();
        registry.register(ComponentRegistration::new("btn"), reply("ok"));

        let event = press("btn", 1);
        assert!(matches!(registry.dispatch(&event).await, ComponentOutcome::Handled(_)));
        assert_eq!(registry.dispatch(&event).await, ComponentOutcome::Duplicate);
    }

    #[tokio::test]
    async fn owner_and_expiry_are_enforced() {
        let registry = ComponentRegistry::new();
        registry.register(ComponentRegistration::new("mine").owned_by(5), reply("ok"));
        registry.register(
            ComponentRegistration::new("stale").expires_after(Duration::ZERO),
            reply("ok"),
        );

        assert_eq!(
            registry.dispatch(&press("mine", 6)).await,
            ComponentOutcome::NotOwner { owner: 5 }
        );
        assert!(matches!(registry.dispatch(&press("mine", 5)).await, ComponentOutcome::Handled(_)));
        assert_eq!(registry.dispatch(&press("stale", 5)).await, ComponentOutcome::Expired);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn once_registrations_survive_failures_only() {
        let registry = ComponentRegistry::new();
        registry.register(
            ComponentRegistration::new("confirm").once(),
            Flaky {
                calls: AtomicUsize::new(0),
            },
        );

        assert!(matches!(
            registry.dispatch(&press("confirm", 1)).await,
            ComponentOutcome::Failed(_)
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.dispatch(&press("confirm", 1)).await,
            ComponentOutcome::Handled(ComponentResponse::Acknowledge)
        );
        assert_eq!(registry.dispatch(&press("confirm", 1)).await, ComponentOutcome::Unknown);
        assert!(registry.is_empty());
    }

    #[test]
    fn custom_ids_are_unique_and_bounded() {
        let a = ComponentRegistry::new_custom_id("poll");
        let b = ComponentRegistry::new_custom_id("poll");
        assert_ne!(a, b);
        assert!(a.starts_with("poll:"));

        let long = ComponentRegistry::new_custom_id(&"x".repeat(150));
        assert_eq!(long.len(), MAX_CUSTOM_ID_LEN);

        // The random part survives a prefix that alone fills the limit.
        let c = ComponentRegistry::new_custom_id(&"p".repeat(100));
        let d = ComponentRegistry::new_custom_id(&"p".repeat(100));
        assert_ne!(c, d);
        assert!(c.len() <= MAX_CUSTOM_ID_LEN);
        let (_, random) = c.rsplit_once(':').unwrap();
        assert_eq!(random.len(), 16);

        let accented = ComponentRegistry::new_custom_id(&"é".repeat(60));
        assert!(accented.len() <= MAX_CUSTOM_ID_LEN);
        assert!(accented.starts_with('é'));
    }

    #[test]
    fn sweep_and_unregister() {
        let registry = ComponentRegistry::new();
        registry.register(
            ComponentRegistration::new("a").expires_after(Duration::from_secs(1)),
            reply("a"),
        );
        registry.register(ComponentRegistration::new("b"), reply("b"));

        assert_eq!(registry.sweep_expired(Instant::now() + Duration::from_secs(2)), 1);
        assert!(registry.unregister("b"));
        assert!(!registry.unregister("b"));
        assert!(registry.is_empty());
    }
}
