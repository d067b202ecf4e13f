// Extensions that ship with the bot, and the plugin code compiled into it.

pub mod builtin;
pub mod plugins;
pub mod utility;

use crate::core::settings::BotSettings;
use crate::discord::framework::data::BotExtension;
use std::sync::Arc;

pub use plugins::plugin_catalog;

/// Always added at startup, in this order.
pub fn builtin_extensions(settings: &BotSettings) -> Vec<Arc<BotExtension>> {
    vec![
        Arc::new(builtin::CoreExtension),
        Arc::new(utility::UtilityExtension::new(settings.prefix.clone())),
    ]
}
