// A Discord bot framework built from extensions.
//
// **Architecture Overview:**
// - `core/` = Framework logic (parsing, checks, i18n, extensions...) with no
//   Discord dependencies
// - `infra/` = Implementations of core traits (files, SQLite, webhooks)
// - `discord/` = poise/serenity adapters and the bundled extensions

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "discord/discord_layer.rs"]
pub mod discord;
#[path = "infra/infra_layer.rs"]
pub mod infra;
