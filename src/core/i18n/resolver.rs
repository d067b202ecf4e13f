use super::{I18nError, Locale};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// What a resolver knows about an invocation.
#[derive(Debug, Clone, Default)]
pub struct LocaleRequest {
    pub user_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    /// Locale of the user's Discord client (interactions only).
    pub client_locale: Option<String>,
    /// The guild's "preferred locale" setting.
    pub guild_locale: Option<String>,
}

/// One way of picking a locale. `None` means "no opinion, ask the next one".
#[async_trait]
pub trait LocaleResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, request: &LocaleRequest) -> Option<Locale>;
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Locale preferences set with the `locale` command.
#[async_trait]
pub trait LocaleStore: Send + Sync {
    async fn user_locale(&self, user_id: u64) -> Result<Option<Locale>, I18nError>;
    async fn set_user_locale(&self, user_id: u64, locale: &Locale) -> Result<(), I18nError>;
    async fn clear_user_locale(&self, user_id: u64) -> Result<(), I18nError>;

    async fn guild_locale(&self, guild_id: u64) -> Result<Option<Locale>, I18nError>;
    async fn set_guild_locale(&self, guild_id: u64, locale: &Locale) -> Result<(), I18nError>;
    async fn clear_guild_locale(&self, guild_id: u64) -> Result<(), I18nError>;
}

// ============================================================================
// BUILT-IN RESOLVERS
// ============================================================================

/// A user's stored preference, then their guild's.
pub struct StoredPreferenceResolver {
    store: Arc<dyn LocaleStore>,
}

impl StoredPreferenceResolver {
    pub fn new(store: Arc<dyn LocaleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl LocaleResolver for StoredPreferenceResolver {
    fn name(&self) -> &'static str {
        "stored-preference"
    }

    async fn resolve(&self, request: &LocaleRequest) -> Option<Locale> {
        match self.store.user_locale(request.user_id).await {
            Ok(Some(locale)) => return Some(locale),
            Ok(None) => {}
            Err(e) => warn!(user_id = request.user_id, "Failed to load user locale: {}", e),
        }

        let guild_id = request.guild_id?;
        match self.store.guild_locale(guild_id).await {
            Ok(locale) => locale,
            Err(e) => {
                warn!(guild_id, "Failed to load guild locale: {}", e);
                None
            }
        }
    }
}

/// The locale of the user's Discord client.
pub struct ClientLocaleResolver;

#[async_trait]
impl LocaleResolver for ClientLocaleResolver {
    fn name(&self) -> &'static str {
        "client"
    }

    async fn resolve(&self, request: &LocaleRequest) -> Option<Locale> {
        request
            .client_locale
            .as_deref()
            .and_then(|raw| Locale::parse(raw).ok())
    }
}

/// The guild's preferred locale (community servers set this).
pub struct GuildLocaleResolver;

#[async_trait]
impl LocaleResolver for GuildLocaleResolver {
    fn name(&self) -> &'static str {
        "guild"
    }

    async fn resolve(&self, request: &LocaleRequest) -> Option<Locale> {
        request
            .guild_locale
            .as_deref()
            .and_then(|raw| Locale::parse(raw).ok())
    }
}

// ============================================================================
// CHAIN
// ============================================================================

/// Asks each resolver in turn; the first answer wins.
///
/// With `available` set, an answer only counts if it (or one of its
/// fallbacks) is available, and the available tag is returned.
pub struct LocaleResolverChain {
    resolvers: Vec<Arc<dyn LocaleResolver>>,
    default_locale: Locale,
    available: Option<Vec<Locale>>,
}

impl LocaleResolverChain {
    pub fn new(default_locale: Locale) -> Self {
        Self {
            resolvers: Vec::new(),
            default_locale,
            available: None,
        }
    }

    /// Stored preference, client locale, guild locale.
    pub fn standard(default_locale: Locale, store: Arc<dyn LocaleStore>) -> Self {
        Self::new(default_locale)
            .with(StoredPreferenceResolver::new(store))
            .with(ClientLocaleResolver)
            .with(GuildLocaleResolver)
    }

    pub fn with(mut self, resolver: impl LocaleResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    pub fn with_available(mut self, locales: Vec<Locale>) -> Self {
        self.available = Some(locales);
        self
    }

    pub fn default_locale(&self) -> &Locale {
        &self.default_locale
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    fn accept(&self, locale: Locale) -> Option<Locale> {
        match &self.available {
            None => Some(locale),
            Some(available) => locale
                .fallbacks()
                .into_iter()
                .find(|candidate| available.contains(candidate)),
        }
    }

    pub async fn resolve(&self, request: &LocaleRequest) -> Locale {
        for resolver in &self.resolvers {
            if let Some(locale) = resolver.resolve(request).await.and_then(|l| self.accept(l)) {
                return locale;
            }
        }
        self.default_locale.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    #[derive(Default)]
    struct MapStore {
        users: DashMap<u64, Locale>,
        guilds: DashMap<u64, Locale>,
    }

    #[async_trait]
    impl LocaleStore for MapStore {
        async fn user_locale(&self, user_id: u64) -> Result<Option<Locale>, I18nError> {
            Ok(self.users.get(&user_id).map(|l| l.clone()))
        }
        async fn set_user_locale(&self, user_id: u64, locale: &Locale) -> Result<(), I18nError> {
            self.users.insert(user_id, locale.clone());
            Ok(())
        }
        async fn clear_user_locale(&self, user_id: u64) -> Result<(), I18nError> {
            self.users.remove(&user_id);
            Ok(())
        }
        async fn guild_locale(&self, guild_id: u64) -> Result<Option<Locale>, I18nError> {
            Ok(self.guilds.get(&guild_id).map(|l| l.clone()))
        }
        async fn set_guild_locale(&self, guild_id: u64, locale: &Locale) -> Result<(), I18nError> {
            self.guilds.insert(guild_id, locale.clone());
            Ok(())
        }
        async fn clear_guild_locale(&self, guild_id: u64) -> Result<(), I18nError> {
            self.guilds.remove(&guild_id);
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl LocaleStore for BrokenStore {
        async fn user_locale(&self, _: u64) -> Result<Option<Locale>, I18nError> {
            Err(I18nError::Storage("down".into()))
        }
        async fn set_user_locale(&self, _: u64, _: &Locale) -> Result<(), I18nError> {
            Err(I18nError::Storage("down".into()))
        }
        async fn clear_user_locale(&self, _: u64) -> Result<(), I18nError> {
            Err(I18nError::Storage("down".into()))
        }
        async fn guild_locale(&self, _: u64) -> Result<Option<Locale>, I18nError> {
            Err(I18nError::Storage("down".into()))
        }
        async fn set_guild_locale(&self, _: u64, _: &Locale) -> Result<(), I18nError> {
            Err(I18nError::Storage("down".into()))
        }
        async fn clear_guild_locale(&self, _: u64) -> Result<(), I18nError> {
            Err(I18nError::Storage("down".into()))
        }
    }

    fn locale(tag: &str) -> Locale {
        Locale::parse(tag).unwrap()
    }

    fn request() -> LocaleRequest {
        LocaleRequest {
            user_id: 1,
            guild_id: Some(10),
            channel_id: 100,
            client_locale: Some("fr".into()),
            guild_locale: Some("de".into()),
        }
    }

    #[tokio::test]
    async fn stored_preference_beats_client_and_guild() {
        let store = Arc::new(MapStore::default());
        let chain = LocaleResolverChain::standard(locale("en-US"), store.clone());

        assert_eq!(chain.resolve(&request()).await, locale("fr"));

        store.set_guild_locale(10, &locale("es")).await.unwrap();
        assert_eq!(chain.resolve(&request()).await, locale("es"));

        store.set_user_locale(1, &locale("pt-BR")).await.unwrap();
        assert_eq!(chain.resolve(&request()).await, locale("pt-BR"));
    }

    #[tokio::test]
    async fn falls_through_to_guild_then_default() {
        let chain = LocaleResolverChain::standard(locale("en-US"), Arc::new(BrokenStore));

        let mut req = request();
        req.client_locale = None;
        assert_eq!(chain.resolve(&req).await, locale("de"));

        req.guild_locale = Some("not a locale".into());
        assert_eq!(chain.resolve(&req).await, locale("en-US"));
    }

    #[tokio::test]
    async fn available_locales_filter_answers() {
        let chain = LocaleResolverChain::new(locale("en-US"))
            .with(ClientLocaleResolver)
            .with(GuildLocaleResolver)
            .with_available(vec![locale("en-US"), locale("de")]);

        let mut req = request();
        req.client_locale = Some("fr-CA".into());
        assert_eq!(chain.resolve(&req).await, locale("de"));

        req.guild_locale = Some("de-AT".into());
        assert_eq!(chain.resolve(&req).await, locale("de"));
        assert_eq!(chain.resolver_names(), vec!["client", "guild"]);
    }
}
