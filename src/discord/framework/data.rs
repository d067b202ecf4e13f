// Shared state handed to every command, hook and event handler.
//
// This is the glue between poise and the core: the services live in core,
// and `Data` just holds them behind Arcs so poise can share them across
// tasks.

use crate::core::checks::CommandGuards;
use crate::core::components::ComponentRegistry;
use crate::core::errors::ErrorFunnel;
use crate::core::events::EventBus;
use crate::core::extensions::{Extension, ExtensionRegistry, NamedCommand};
use crate::core::i18n::{Locale, LocaleResolverChain, LocaleStore, Translations};
use crate::core::plugins::{PluginCatalog, PluginManager};
use crate::core::settings::BotSettings;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
pub type PoiseCommand = poise::Command<Data, Error>;

/// A gateway event together with the client context it arrived on. This is
/// what extensions' event handlers receive from the bus.
#[derive(Clone)]
pub struct BotEvent {
    pub ctx: serenity::Context,
    pub event: serenity::FullEvent,
}

pub type BotExtension = dyn Extension<PoiseCommand, BotEvent>;
pub type BotExtensions = ExtensionRegistry<PoiseCommand, BotEvent>;
pub type BotPluginCatalog = PluginCatalog<PoiseCommand, BotEvent>;

impl NamedCommand for PoiseCommand {
    fn qualified_names(&self) -> Vec<String> {
        let mut names = vec![self.qualified_name.clone()];
        for subcommand in &self.subcommands {
            names.extend(subcommand.qualified_names());
        }
        names
    }
}

pub struct Data {
    pub settings: Arc<BotSettings>,
    pub extensions: Arc<BotExtensions>,
    pub events: Arc<EventBus<BotEvent>>,
    pub guards: Arc<CommandGuards>,
    pub components: Arc<ComponentRegistry>,
    pub translations: Arc<Translations>,
    pub locales: Arc<LocaleResolverChain>,
    pub locale_store: Arc<dyn LocaleStore>,
    pub errors: Arc<ErrorFunnel>,
    pub plugins: Arc<PluginManager>,
}

impl Data {
    /// Translate with the built-in English text as the fallback template.
    pub fn translate(
        &self,
        key: &str,
        locale: &Locale,
        args: &[(&str, String)],
        fallback: &str,
    ) -> String {
        self.translations.translate_or(key, locale, args, fallback)
    }

    /// Locales that have a translation bundle, for the `locale` command.
    pub fn available_locales(&self) -> Vec<Locale> {
        self.translations.locales().into_iter().cloned().collect()
    }
}
