// Framework hooks: the command gate, the error funnel hookup and gateway
// event routing.

use super::data::{BotEvent, Context, Data, Error};
use super::locale_context::{resolve_locale, tr, tr_component};
use crate::core::checks::{CheckContext, Permissions};
use crate::core::components::{ComponentEvent, ComponentOutcome, ComponentResponse};
use crate::core::errors::{ErrorContext, FunnelOutcome, RelayedError};
use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};

// ============================================================================
// COMMAND CHECK
// ============================================================================

/// Permission bits of the invoker in the current channel.
async fn author_permissions(ctx: Context<'_>) -> Permissions {
    if ctx.guild_id().is_none() {
        return Permissions::NONE;
    }
    let Some(member) = ctx.author_member().await else {
        return Permissions::NONE;
    };
    // Interactions carry the resolved permissions.
    if let Some(permissions) = member.permissions {
        return Permissions(permissions.bits());
    }

    let Some(guild) = ctx.guild() else {
        return Permissions::NONE;
    };
    let bits = match guild.channels.get(&ctx.channel_id()) {
        Some(channel) => guild.user_permissions_in(channel, &member).bits(),
        None => guild_permissions(&guild, &member),
    };
    Permissions(bits)
}

/// Guild-wide permissions from roles, for channels the cache doesn't know
/// (threads, mostly).
fn guild_permissions(guild: &serenity::Guild, member: &serenity::Member) -> u64 {
    if guild.owner_id == member.user.id {
        return serenity::Permissions::all().bits();
    }
    let everyone = serenity::RoleId::new(guild.id.get());
    guild
        .roles
        .iter()
        .filter(|(id, _)| **id == everyone || member.roles.contains(id))
        .fold(0, |bits, (_, role)| bits | role.permissions.bits())
}

pub async fn check_context(ctx: Context<'_>) -> CheckContext {
    let permissions = author_permissions(ctx).await;
    let author = ctx.author();
    CheckContext {
        user_id: author.id.get(),
        guild_id: ctx.guild_id().map(|id| id.get()),
        channel_id: ctx.channel_id().get(),
        is_bot: author.bot,
        permissions,
        is_owner: ctx.data().guards.is_owner(author.id.get()),
    }
}

/// Runs before every command: is the owning extension loaded, do the checks
/// pass, is the invoker within the rate limits. Failures are relayed errors,
/// so `on_error` answers them like any other.
pub async fn command_check(ctx: Context<'_>) -> Result<bool, Error> {
    let data = ctx.data();
    let command = ctx.command().qualified_name.as_str();

    if !data.extensions.is_command_active(command) {
        let extension = data.extensions.extension_for(command).unwrap_or_default();
        return Err(RelayedError::ExtensionDisabled(extension).into());
    }

    let check_ctx = check_context(ctx).await;
    data.guards
        .run_checks(command, &check_ctx)
        .map_err(RelayedError::from)?;
    data.guards
        .check_rate_limit(command, &check_ctx)
        .map_err(RelayedError::from)?;

    Ok(true)
}

// ============================================================================
// ERRORS
// ============================================================================

async fn reply_ephemeral(ctx: Context<'_>, content: String) {
    if let Err(e) = ctx
        .send(
            poise::CreateReply::default()
                .content(content)
                .ephemeral(true),
        )
        .await
    {
        warn!("Failed to send error reply: {}", e);
    }
}

/// Send `error` through the funnel and answer the invoker.
async fn funnel_command_error(
    ctx: Context<'_>,
    error: &(dyn std::error::Error + Send + Sync + 'static),
) {
    let context = ErrorContext {
        command: Some(ctx.command().qualified_name.clone()),
        user_id: Some(ctx.author().id.get()),
        guild_id: ctx.guild_id().map(|id| id.get()),
        channel_id: Some(ctx.channel_id().get()),
    };

    let outcome = ctx.data().errors.handle(error, context).await;
    let locale = resolve_locale(ctx).await;
    let content = match outcome {
        FunnelOutcome::Relay {
            key,
            args,
            fallback,
        } => ctx.data().translate(key, &locale, &args, &fallback),
        FunnelOutcome::Reported {
            report_id,
            reply: true,
        } => ctx.data().translate(
            "errors.unexpected",
            &locale,
            &[("id", report_id)],
            "Something went wrong while running this command. Error id: `{id}`",
        ),
        FunnelOutcome::Reported { reply: false, .. } => return,
    };
    reply_ephemeral(ctx, content).await;
}

pub async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start the bot: {}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            funnel_command_error(ctx, &*error).await;
        }
        poise::FrameworkError::CommandCheckFailed {
            error: Some(error),
            ctx,
            ..
        } => {
            funnel_command_error(ctx, &*error).await;
        }
        poise::FrameworkError::CommandCheckFailed { error: None, .. } => {}
        poise::FrameworkError::ArgumentParse {
            error, input, ctx, ..
        } => {
            let content = tr(
                ctx,
                "errors.argument_parse",
                &[
                    ("input", input.unwrap_or_default()),
                    ("error", error.to_string()),
                ],
                "Couldn't understand `{input}`: {error}",
            )
            .await;
            reply_ephemeral(ctx, content).await;
        }
        poise::FrameworkError::EventHandler { error, .. } => {
            error!("Event handler failed: {}", error);
        }
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

// ============================================================================
// EVENTS
// ============================================================================

fn component_event(component: &serenity::ComponentInteraction) -> ComponentEvent {
    let values = match &component.data.kind {
        serenity::ComponentInteractionDataKind::StringSelect { values } => values.clone(),
        _ => Vec::new(),
    };
    ComponentEvent {
        interaction_id: component.id.get(),
        custom_id: component.data.custom_id.clone(),
        user_id: component.user.id.get(),
        channel_id: component.channel_id.get(),
        guild_id: component.guild_id.map(|id| id.get()),
        message_id: component.message.id.get(),
        values,
    }
}

async fn route_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &Data,
) {
    let outcome = data.components.dispatch(&component_event(component)).await;

    let response = match outcome {
        ComponentOutcome::Handled(ComponentResponse::Acknowledge) => {
            serenity::CreateInteractionResponse::Acknowledge
        }
        ComponentOutcome::Handled(ComponentResponse::Reply { content, ephemeral }) => {
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            )
        }
        ComponentOutcome::Handled(ComponentResponse::Update { content }) => {
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new().content(content),
            )
        }
        ComponentOutcome::NotOwner { .. } => ephemeral(
            tr_component(
                data,
                component,
                "components.not_owner",
                "These buttons aren't for you.",
            )
            .await,
        ),
        ComponentOutcome::Expired => ephemeral(
            tr_component(
                data,
                component,
                "components.expired",
                "This has expired. Run the command again.",
            )
            .await,
        ),
        ComponentOutcome::Failed(_) => ephemeral(
            tr_component(
                data,
                component,
                "components.failed",
                "Something went wrong handling that.",
            )
            .await,
        ),
        // Collectors (paginators) answer their own presses.
        ComponentOutcome::Unknown | ComponentOutcome::Duplicate => return,
    };

    if let Err(e) = component.create_response(&ctx.http, response).await {
        warn!(custom_id = %component.data.custom_id, "Failed to answer component: {}", e);
    }
}

fn ephemeral(content: String) -> serenity::CreateInteractionResponse {
    serenity::CreateInteractionResponse::Message(
        serenity::CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true),
    )
}

/// Event handler for non-command Discord events: component presses go to
/// the component registry, and everything goes to the extensions' bus.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            info!(
                user = %data_about_bot.user.name,
                guilds = data_about_bot.guilds.len(),
                "Connected to the gateway"
            );
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            route_component(ctx, component, data).await;
        }
        _ => {}
    }

    let bot_event = BotEvent {
        ctx: ctx.clone(),
        event: event.clone(),
    };
    let report = data.events.dispatch(&bot_event).await;
    if report.failed > 0 {
        debug!(
            ran = report.ran,
            failed = report.failed,
            "Some event handlers failed"
        );
    }
    Ok(())
}
