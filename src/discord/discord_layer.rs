// Discord layer - the poise framework glue and the bundled extensions.

#[path = "framework/poise_framework.rs"]
pub mod framework;

#[path = "extensions/extension_catalog.rs"]
pub mod extensions;

pub use framework::data::{BotEvent, Context, Data, Error, PoiseCommand};
