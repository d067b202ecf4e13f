// Turns settings and loaded extensions into a running poise framework.

use super::data::{Data, Error, PoiseCommand};
use super::hooks::{command_check, event_handler, on_error};
use crate::core::settings::BotSettings;
use poise::serenity_prelude as serenity;
use tracing::{info, warn};

fn intent_from_name(name: &str) -> Option<serenity::GatewayIntents> {
    use serenity::GatewayIntents as I;
    let intent = match name {
        "GUILDS" => I::GUILDS,
        "GUILD_MEMBERS" => I::GUILD_MEMBERS,
        "GUILD_MODERATION" => I::GUILD_MODERATION,
        "GUILD_EMOJIS_AND_STICKERS" => I::GUILD_EMOJIS_AND_STICKERS,
        "GUILD_INTEGRATIONS" => I::GUILD_INTEGRATIONS,
        "GUILD_WEBHOOKS" => I::GUILD_WEBHOOKS,
        "GUILD_INVITES" => I::GUILD_INVITES,
        "GUILD_VOICE_STATES" => I::GUILD_VOICE_STATES,
        "GUILD_PRESENCES" => I::GUILD_PRESENCES,
        "GUILD_MESSAGES" => I::GUILD_MESSAGES,
        "GUILD_MESSAGE_REACTIONS" => I::GUILD_MESSAGE_REACTIONS,
        "GUILD_MESSAGE_TYPING" => I::GUILD_MESSAGE_TYPING,
        "DIRECT_MESSAGES" => I::DIRECT_MESSAGES,
        "DIRECT_MESSAGE_REACTIONS" => I::DIRECT_MESSAGE_REACTIONS,
        "DIRECT_MESSAGE_TYPING" => I::DIRECT_MESSAGE_TYPING,
        "MESSAGE_CONTENT" => I::MESSAGE_CONTENT,
        "GUILD_SCHEDULED_EVENTS" => I::GUILD_SCHEDULED_EVENTS,
        "AUTO_MODERATION_CONFIGURATION" => I::AUTO_MODERATION_CONFIGURATION,
        "AUTO_MODERATION_EXECUTION" => I::AUTO_MODERATION_EXECUTION,
        _ => return None,
    };
    Some(intent)
}

/// Combine intent names from the settings. Names were validated when the
/// settings were built; anything unknown here is logged and ignored.
pub fn gateway_intents(names: &[String]) -> serenity::GatewayIntents {
    names
        .iter()
        .fold(serenity::GatewayIntents::empty(), |intents, name| {
            match intent_from_name(name) {
                Some(intent) => intents | intent,
                None => {
                    warn!(intent = %name, "Unknown gateway intent ignored");
                    intents
                }
            }
        })
}

/// Build the poise framework. `commands` are the ones the extension registry
/// handed over; `data` becomes the framework's user data once connected.
pub fn build_framework(
    settings: &BotSettings,
    commands: Vec<PoiseCommand>,
    data: Data,
) -> poise::Framework<Data, Error> {
    let test_guild = settings.test_guild;

    poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands,
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(settings.prefix.clone()),
                mention_as_prefix: settings.mention_as_prefix,
                ..Default::default()
            },
            owners: settings
                .owners
                .iter()
                .map(|id| serenity::UserId::new(*id))
                .collect(),
            command_check: Some(|ctx| Box::pin(command_check(ctx))),
            on_error: |error| Box::pin(on_error(error)),
            // Event handler for component presses and extension events
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            pre_command: |ctx| {
                Box::pin(async move {
                    tracing::debug!(
                        command = %ctx.command().qualified_name,
                        user_id = ctx.author().id.get(),
                        "Running command"
                    );
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!(user = %ready.user.name, "Bot is starting up...");

                match test_guild {
                    // Guild commands update instantly, handy while developing.
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!(guild_id, "Commands registered in test guild");
                    }
                    // Global commands can take up to an hour to propagate.
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        info!("Commands registered globally");
                    }
                }

                let activity = serenity::ActivityData::listening(format!(
                    "{}help",
                    data.settings.prefix
                ));
                ctx.set_presence(Some(activity), serenity::OnlineStatus::Online);

                spawn_sweeper(&data);
                info!("Bot is ready!");
                Ok(data)
            })
        })
        .build()
}

/// Periodically drop expired component registrations and idle rate-limit
/// buckets so long-running bots don't accumulate them.
fn spawn_sweeper(data: &Data) {
    let components = data.components.clone();
    let guards = data.guards.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = std::time::Instant::now();
            let components_removed = components.sweep_expired(now);
            let buckets_removed = guards.rate_limiter().sweep(now);
            tracing::debug!(components_removed, buckets_removed, "Swept expired state");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_combine_and_skip_unknown_names() {
        let intents = gateway_intents(&[
            "GUILDS".to_string(),
            "MESSAGE_CONTENT".to_string(),
            "NOT_AN_INTENT".to_string(),
        ]);
        assert_eq!(
            intents,
            serenity::GatewayIntents::GUILDS | serenity::GatewayIntents::MESSAGE_CONTENT
        );
    }

    #[test]
    fn every_known_intent_name_maps() {
        for name in crate::core::settings::KNOWN_INTENTS {
            assert!(intent_from_name(name).is_some(), "{name} has no gateway intent");
        }
    }
}
