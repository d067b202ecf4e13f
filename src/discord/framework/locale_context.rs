// Locale resolution for commands and component presses.

use super::data::{Context, Data};
use crate::core::i18n::{Locale, LocaleRequest};
use poise::serenity_prelude as serenity;

/// What the resolver chain needs to know about a command invocation.
pub fn locale_request(ctx: Context<'_>) -> LocaleRequest {
    // Read the cache in its own scope; the guard can't be held across awaits.
    let guild_locale = ctx.guild().map(|guild| guild.preferred_locale.clone());

    LocaleRequest {
        user_id: ctx.author().id.get(),
        guild_id: ctx.guild_id().map(|id| id.get()),
        channel_id: ctx.channel_id().get(),
        client_locale: ctx.locale().map(str::to_string),
        guild_locale,
    }
}

pub fn component_locale_request(component: &serenity::ComponentInteraction) -> LocaleRequest {
    LocaleRequest {
        user_id: component.user.id.get(),
        guild_id: component.guild_id.map(|id| id.get()),
        channel_id: component.channel_id.get(),
        client_locale: Some(component.locale.clone()),
        guild_locale: component.guild_locale.clone(),
    }
}

pub async fn resolve_locale(ctx: Context<'_>) -> Locale {
    let request = locale_request(ctx);
    ctx.data().locales.resolve(&request).await
}

/// Translate `key` for the invoker of `ctx`.
pub async fn tr(ctx: Context<'_>, key: &str, args: &[(&str, String)], fallback: &str) -> String {
    let locale = resolve_locale(ctx).await;
    ctx.data().translate(key, &locale, args, fallback)
}

pub async fn tr_component(
    data: &Data,
    component: &serenity::ComponentInteraction,
    key: &str,
    fallback: &str,
) -> String {
    let locale = data
        .locales
        .resolve(&component_locale_request(component))
        .await;
    data.translate(key, &locale, &[], fallback)
}
