// This is the entry point of the Discord bot.
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Load extensions and plugins
// 4. Set up the Discord framework

use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use rust_discord_ext::core::checks::CommandGuards;
use rust_discord_ext::core::components::ComponentRegistry;
use rust_discord_ext::core::errors::ErrorFunnel;
use rust_discord_ext::core::events::EventBus;
use rust_discord_ext::core::i18n::{
    ClientLocaleResolver, GuildLocaleResolver, Locale, LocaleResolverChain, LocaleStore,
    StoredPreferenceResolver, Translations, TranslationsProvider,
};
use rust_discord_ext::core::plugins::{resolve_load_order, PluginManager, PluginSource};
use rust_discord_ext::core::settings::{BotSettings, LocaleResolverKind};
use rust_discord_ext::discord::extensions::{builtin_extensions, plugin_catalog};
use rust_discord_ext::discord::framework::bot_builder::{build_framework, gateway_intents};
use rust_discord_ext::discord::framework::data::BotExtensions;
use rust_discord_ext::discord::Data;
use rust_discord_ext::infra::i18n::{
    InMemoryLocaleStore, JsonTranslationsProvider, SqliteLocaleStore,
};
use rust_discord_ext::infra::plugins::DirectoryPluginSource;
use rust_discord_ext::infra::reporting::{TracingReporter, WebhookReporter};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn resolver_chain(
    settings: &BotSettings,
    store: Arc<dyn LocaleStore>,
    available: Vec<Locale>,
) -> LocaleResolverChain {
    let mut chain = LocaleResolverChain::new(settings.default_locale.clone());
    for kind in &settings.locale_resolvers {
        chain = match kind {
            LocaleResolverKind::Stored => chain.with(StoredPreferenceResolver::new(store.clone())),
            LocaleResolverKind::Client => chain.with(ClientLocaleResolver),
            LocaleResolverKind::Guild => chain.with(GuildLocaleResolver),
        };
    }
    // With no bundles loaded every answer would be rejected, so only filter
    // once there's something to filter against.
    if available.is_empty() {
        chain
    } else {
        chain.with_available(available)
    }
}

async fn locale_store(settings: &BotSettings) -> Arc<dyn LocaleStore> {
    let path = settings.database_path();
    match SqliteLocaleStore::new(&path.to_string_lossy()).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                path = %path.display(),
                "Locale preferences won't persist, SQLite unavailable: {:#}", e
            );
            Arc::new(InMemoryLocaleStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Arc::new(
        BotSettings::from_env()
            .context("Invalid configuration. Create a .env file with at least DISCORD_TOKEN")?,
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let translations = match JsonTranslationsProvider::new(&settings.locales_dir)
        .load(&settings.default_locale)
        .await
    {
        Ok(translations) => translations,
        Err(e) => {
            error!("Failed to load translations, using built-in English: {}", e);
            Translations::new(settings.default_locale.clone())
        }
    };
    let available: Vec<Locale> = translations.locales().into_iter().cloned().collect();
    info!(locales = ?available, "Translations loaded");

    let locale_store = locale_store(&settings).await;
    let locales = resolver_chain(&settings, locale_store.clone(), available);

    let mut errors = ErrorFunnel::new(settings.reply_on_unexpected_error)
        .with_reporter(Arc::new(TracingReporter));
    if let Some(url) = &settings.error_webhook_url {
        match WebhookReporter::new(url.as_str()) {
            Ok(reporter) => errors = errors.with_reporter(Arc::new(reporter)),
            Err(e) => warn!("Error webhook disabled: {}", e),
        }
    }

    let guards = Arc::new(CommandGuards::new());
    guards.set_owners(settings.owners.iter().copied());
    guards.set_skip_for_owners(settings.skip_checks_for_owners);
    guards.rate_limiter().set_default(settings.default_rate_limit);

    let events = Arc::new(EventBus::new());
    let extensions = Arc::new(BotExtensions::new(events.clone(), guards.clone()));

    // ========================================================================
    // EXTENSIONS AND PLUGINS
    // ========================================================================

    for extension in builtin_extensions(&settings) {
        extensions.add(extension)?;
    }
    for (name, e) in extensions.load_all() {
        error!(extension = %name, "Failed to load extension: {}", e);
    }

    let discovery = DirectoryPluginSource::new(settings.plugin_paths.clone())
        .discover()
        .await;
    for problem in &discovery.problems {
        warn!("Plugin problem: {}", problem);
    }
    let plugins = Arc::new(PluginManager::new());
    plugins.load(
        resolve_load_order(discovery.descriptors),
        &plugin_catalog(),
        &extensions,
    );

    let commands = extensions.take_commands();
    info!(
        commands = commands.len(),
        handlers = events.len(),
        "Extensions ready"
    );

    let data = Data {
        settings: settings.clone(),
        extensions,
        events,
        guards,
        components: Arc::new(ComponentRegistry::new()),
        translations: Arc::new(translations),
        locales: Arc::new(locales),
        locale_store,
        errors: Arc::new(errors),
        plugins,
    };

    // ========================================================================
    // CLIENT
    // ========================================================================

    let framework = build_framework(&settings, commands, data);
    let intents = gateway_intents(&settings.intents);
    let mut client = serenity::ClientBuilder::new(&settings.token, intents)
        .framework(framework)
        .await
        .context("Failed to create Discord client")?;

    client.start().await.context("Discord client stopped")?;
    Ok(())
}
