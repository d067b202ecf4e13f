// Plugin code compiled into the bot. Each entry only runs when a
// `plugin.json` with the same id is found on the plugin paths.

use crate::core::errors::{BoxError, RelayedError};
use crate::core::events::{EventFilter, FnEventHandler};
use crate::core::extensions::{Extension, ExtensionError, ExtensionSetup};
use crate::core::i18n::format_template;
use crate::core::plugins::{PluginDescriptor, PluginError};
use crate::discord::framework::data::{
    BotEvent, BotExtension, BotPluginCatalog, Context, Error, PoiseCommand,
};
use crate::discord::framework::locale_context::tr;
use poise::serenity_prelude::{self as serenity, Mentionable};
use rand::Rng;
use std::sync::Arc;
use tracing::warn;

pub fn plugin_catalog() -> BotPluginCatalog {
    let mut catalog = BotPluginCatalog::new();
    catalog
        .register("dice", |descriptor| {
            let dice: Arc<BotExtension> = Arc::new(DiceExtension::from_descriptor(descriptor)?);
            Ok(vec![dice])
        })
        .register("greeter", |descriptor| {
            let greeter: Arc<BotExtension> =
                Arc::new(GreeterExtension::from_descriptor(descriptor)?);
            Ok(vec![greeter])
        });
    catalog
}

fn config_error(descriptor: &PluginDescriptor, reason: impl Into<String>) -> PluginError {
    PluginError::Factory {
        id: descriptor.id.clone(),
        reason: reason.into(),
    }
}

// ============================================================================
// DICE
// ============================================================================

const DEFAULT_MAX_DICE: u32 = 20;

pub struct DiceExtension {
    max_dice: u32,
}

impl DiceExtension {
    /// Reads `max_dice` from the plugin config.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, PluginError> {
        let max_dice = match descriptor.config.get("max_dice") {
            None => DEFAULT_MAX_DICE,
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| config_error(descriptor, "max_dice must be a positive integer"))?,
        };
        Ok(Self { max_dice })
    }
}

impl Extension<PoiseCommand, BotEvent> for DiceExtension {
    fn name(&self) -> &str {
        "dice"
    }

    fn description(&self) -> &str {
        "Dice rolling"
    }

    fn setup(
        &self,
        setup: &mut ExtensionSetup<PoiseCommand, BotEvent>,
    ) -> Result<(), ExtensionError> {
        let mut command = roll();
        // The limit travels with the command so the handler can see it.
        command.custom_data = Box::new(self.max_dice);
        setup.command(command);
        Ok(())
    }
}

/// Parse `NdM` (or `dM` for one die).
pub fn parse_dice(spec: &str, max_dice: u32) -> Option<(u32, u32)> {
    let spec = spec.trim().to_ascii_lowercase();
    let (count, sides) = spec.split_once('d')?;
    let count: u32 = if count.is_empty() { 1 } else { count.parse().ok()? };
    let sides: u32 = sides.parse().ok()?;
    if count == 0 || count > max_dice || !(2..=1000).contains(&sides) {
        return None;
    }
    Some((count, sides))
}

/// Roll dice, e.g. `2d6` or `d20`.
#[poise::command(slash_command, prefix_command)]
pub async fn roll(
    ctx: Context<'_>,
    #[description = "Dice to roll, e.g. 2d6"] dice: Option<String>,
) -> Result<(), Error> {
    let max_dice = ctx
        .command()
        .custom_data
        .downcast_ref::<u32>()
        .copied()
        .unwrap_or(DEFAULT_MAX_DICE);
    let spec = dice.unwrap_or_else(|| "1d6".to_string());

    let Some((count, sides)) = parse_dice(&spec, max_dice) else {
        let message = tr(
            ctx,
            "dice.invalid",
            &[("dice", spec), ("max", max_dice.to_string())],
            "`{dice}` isn't a roll I understand. Use NdM with at most {max} dice.",
        )
        .await;
        return Err(RelayedError::Message(message).into());
    };

    let rolls: Vec<u32> = {
        let mut rng = rand::thread_rng();
        (0..count).map(|_| rng.gen_range(1..=sides)).collect()
    };
    let total: u32 = rolls.iter().sum();
    let shown = rolls
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(" + ");

    ctx.say(format!("🎲 {} → {} = **{}**", spec, shown, total))
        .await?;
    Ok(())
}

// ============================================================================
// GREETER
// ============================================================================

const DEFAULT_GREETING: &str = "Welcome to {guild}, {user}!";

pub struct GreeterExtension {
    template: String,
    channel_id: Option<u64>,
}

impl GreeterExtension {
    /// Reads `message` (a `{user}`/`{guild}` template) and an optional
    /// `channel_id` from the plugin config.
    pub fn from_descriptor(descriptor: &PluginDescriptor) -> Result<Self, PluginError> {
        let template = match descriptor.config.get("message") {
            None => DEFAULT_GREETING.to_string(),
            Some(value) => value
                .as_str()
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| config_error(descriptor, "message must be a non-empty string"))?,
        };
        let channel_id = match descriptor.config.get("channel_id") {
            None => None,
            Some(value) => Some(
                value
                    .as_u64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| config_error(descriptor, "channel_id must be a snowflake"))?,
            ),
        };
        Ok(Self {
            template,
            channel_id,
        })
    }

    pub fn greeting(&self, user: &str, guild: &str) -> String {
        format_template(
            &self.template,
            &[("user", user.to_string()), ("guild", guild.to_string())],
        )
    }
}

impl Extension<PoiseCommand, BotEvent> for GreeterExtension {
    fn name(&self) -> &str {
        "greeter"
    }

    fn description(&self) -> &str {
        "Greets new members"
    }

    fn setup(
        &self,
        setup: &mut ExtensionSetup<PoiseCommand, BotEvent>,
    ) -> Result<(), ExtensionError> {
        let filter: EventFilter<BotEvent> = Arc::new(|event: &BotEvent| {
            matches!(event.event, serenity::FullEvent::GuildMemberAddition { .. })
        });
        let greeter = Arc::new(Self {
            template: self.template.clone(),
            channel_id: self.channel_id,
        });
        setup.event_handler_filtered(
            "greet-new-member",
            filter,
            Arc::new(FnEventHandler(move |event: BotEvent| {
                let greeter = Arc::clone(&greeter);
                async move { greeter.greet(event).await }
            })),
        );
        Ok(())
    }
}

impl GreeterExtension {
    async fn greet(&self, event: BotEvent) -> Result<(), BoxError> {
        let serenity::FullEvent::GuildMemberAddition { new_member } = &event.event else {
            return Ok(());
        };

        // Cache refs can't be held across an await.
        let (guild_name, system_channel) = match event.ctx.cache.guild(new_member.guild_id) {
            Some(guild) => (guild.name.clone(), guild.system_channel_id),
            None => ("the server".to_string(), None),
        };
        let Some(channel_id) = self
            .channel_id
            .map(serenity::ChannelId::new)
            .or(system_channel)
        else {
            warn!(guild_id = new_member.guild_id.get(), "No channel to greet new members in");
            return Ok(());
        };

        let content = self.greeting(&new_member.user.mention().to_string(), &guild_name);
        channel_id
            .send_message(
                &event.ctx.http,
                serenity::CreateMessage::new()
                    .content(content)
                    .allowed_mentions(
                        serenity::CreateAllowedMentions::new().users(vec![new_member.user.id]),
                    ),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(id: &str, config: serde_json::Value) -> PluginDescriptor {
        let mut descriptor = PluginDescriptor::new(id);
        descriptor.config = config;
        descriptor
    }

    #[test]
    fn dice_specs() {
        assert_eq!(parse_dice("2d6", 20), Some((2, 6)));
        assert_eq!(parse_dice("D20", 20), Some((1, 20)));
        assert_eq!(parse_dice("21d6", 20), None);
        assert_eq!(parse_dice("0d6", 20), None);
        assert_eq!(parse_dice("2d1", 20), None);
        assert_eq!(parse_dice("two dice", 20), None);
    }

    #[test]
    fn dice_config_is_validated() {
        let dice = DiceExtension::from_descriptor(&descriptor("dice", json!({"max_dice": 5})));
        assert_eq!(dice.unwrap().max_dice, 5);

        let dice = DiceExtension::from_descriptor(&descriptor("dice", json!({})));
        assert_eq!(dice.unwrap().max_dice, DEFAULT_MAX_DICE);

        let bad = DiceExtension::from_descriptor(&descriptor("dice", json!({"max_dice": "lots"})));
        assert!(matches!(bad, Err(PluginError::Factory { .. })));
    }

    #[test]
    fn greeter_fills_its_template() {
        let greeter = GreeterExtension::from_descriptor(&descriptor(
            "greeter",
            json!({"message": "Hi {user}, this is {guild}.", "channel_id": "123"}),
        ))
        .unwrap();
        assert_eq!(greeter.channel_id, Some(123));
        assert_eq!(greeter.greeting("<@1>", "Rustaceans"), "Hi <@1>, this is Rustaceans.");

        let default = GreeterExtension::from_descriptor(&descriptor("greeter", json!({}))).unwrap();
        assert_eq!(default.greeting("Ann", "Home"), "Welcome to Home, Ann!");
    }

    #[test]
    fn catalog_knows_the_bundled_plugins() {
        assert_eq!(plugin_catalog().ids(), vec!["dice", "greeter"]);
    }
}
