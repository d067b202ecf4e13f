// The core module contains the framework's platform-agnostic logic.
// Nothing in here touches serenity or poise; the Discord layer adapts
// these types to gateway events and poise commands.

#[path = "parsing/string_parser.rs"]
pub mod parsing;

#[path = "converters/mod.rs"]
pub mod converters;

#[path = "checks/check_service.rs"]
pub mod checks;

#[path = "ratelimit/mod.rs"]
pub mod ratelimit;

#[path = "i18n/mod.rs"]
pub mod i18n;

#[path = "pagination/paginator.rs"]
pub mod pagination;

#[path = "components/component_registry.rs"]
pub mod components;

#[path = "events/event_bus.rs"]
pub mod events;

#[path = "extensions/mod.rs"]
pub mod extensions;

#[path = "plugins/plugin_service.rs"]
pub mod plugins;

#[path = "settings/bot_settings.rs"]
pub mod settings;

#[path = "errors/error_funnel.rs"]
pub mod errors;
