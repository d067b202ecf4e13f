// Renders a core `Paginator` as an embed with buttons and drives it with a
// component collector until it times out or the owner stops it.

use super::data::{Context, Error};
use super::locale_context::{resolve_locale, tr};
use crate::core::i18n::Locale;
use crate::core::pagination::{Paginator, PaginatorAction, PaginatorButton, PaginatorUpdate};
use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

const EMBED_COLOUR: u32 = 0x5865F2;
const BUTTONS_PER_ROW: usize = 5;

fn button_label(action: PaginatorAction) -> &'static str {
    match action {
        PaginatorAction::First => "⏮",
        PaginatorAction::Previous => "◀",
        PaginatorAction::Next => "▶",
        PaginatorAction::Last => "⏭",
        PaginatorAction::NextGroup => "🔀",
        PaginatorAction::Stop => "⏹",
    }
}

fn render_buttons(
    buttons: &[PaginatorButton],
    force_disabled: bool,
) -> Vec<serenity::CreateActionRow> {
    buttons
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            serenity::CreateActionRow::Buttons(
                row.iter()
                    .map(|button| {
                        let style = match button.action {
                            PaginatorAction::Stop => serenity::ButtonStyle::Danger,
                            PaginatorAction::NextGroup => serenity::ButtonStyle::Secondary,
                            _ => serenity::ButtonStyle::Primary,
                        };
                        serenity::CreateButton::new(&button.custom_id)
                            .label(button_label(button.action))
                            .style(style)
                            .disabled(button.disabled || force_disabled)
                    })
                    .collect(),
            )
        })
        .collect()
}

fn render_embed(ctx: Context<'_>, paginator: &Paginator, locale: &Locale) -> serenity::CreateEmbed {
    let page = paginator.current();
    let mut footer = ctx.data().translate(
        "pagination.footer",
        locale,
        &[
            ("page", paginator.page_number().to_string()),
            ("pages", paginator.page_count().to_string()),
        ],
        "Page {page}/{pages}",
    );
    if paginator.group_count() > 1 {
        footer = format!("{} • {}", paginator.group_name(), footer);
    }
    if let Some(note) = &page.footer_note {
        footer = format!("{} • {}", footer, note);
    }

    serenity::CreateEmbed::new()
        .title(page.title.as_deref().unwrap_or(paginator.group_name()))
        .description(&page.body)
        .color(EMBED_COLOUR)
        .footer(serenity::CreateEmbedFooter::new(footer))
}

/// Send `paginator` as a reply and run it until it stops or times out.
/// The invoker owns it unless an owner was set already.
pub async fn paginate(ctx: Context<'_>, paginator: Paginator) -> Result<(), Error> {
    let mut paginator = match paginator.owner() {
        Some(_) => paginator,
        None => paginator.with_owner(ctx.author().id.get()),
    };
    let locale = resolve_locale(ctx).await;

    let reply = ctx
        .send(
            poise::CreateReply::default()
                .embed(render_embed(ctx, &paginator, &locale))
                .components(render_buttons(&paginator.buttons(), false)),
        )
        .await?;

    if paginator.is_single_page() {
        return Ok(());
    }

    let msg_id = reply.message().await?.id;

    // Interaction loop
    while let Some(mci) = serenity::ComponentInteractionCollector::new(ctx)
        .channel_id(ctx.channel_id())
        .timeout(paginator.timeout())
        .filter(move |mci| mci.message.id == msg_id)
        .await
    {
        match paginator.handle_interaction(mci.user.id.get(), &mci.data.custom_id) {
            PaginatorUpdate::Ignored => continue,
            PaginatorUpdate::NotOwner => {
                let content = tr(
                    ctx,
                    "pagination.not_owner",
                    &[],
                    "Only the person who ran this command can use these buttons.",
                )
                .await;
                if let Err(e) = mci
                    .create_response(
                        ctx,
                        serenity::CreateInteractionResponse::Message(
                            serenity::CreateInteractionResponseMessage::new()
                                .content(content)
                                .ephemeral(true),
                        ),
                    )
                    .await
                {
                    warn!("Failed to answer paginator press: {}", e);
                }
            }
            PaginatorUpdate::Changed | PaginatorUpdate::Unchanged => {
                let update = serenity::CreateInteractionResponseMessage::new()
                    .embed(render_embed(ctx, &paginator, &locale))
                    .components(render_buttons(&paginator.buttons(), false));
                let response = serenity::CreateInteractionResponse::UpdateMessage(update);
                if let Err(e) = mci.create_response(ctx, response).await {
                    warn!("Failed to update paginator: {}", e);
                }
            }
            PaginatorUpdate::Stopped => {
                let update = serenity::CreateInteractionResponseMessage::new()
                    .components(render_buttons(&paginator.buttons(), true));
                let response = serenity::CreateInteractionResponse::UpdateMessage(update);
                if let Err(e) = mci.create_response(ctx, response).await {
                    warn!("Failed to stop paginator: {}", e);
                }
                return Ok(());
            }
        }
    }

    debug!(paginator = paginator.id(), "Paginator timed out");
    // Leave the page up, buttons greyed out
    let _ = reply
        .edit(
            ctx,
            poise::CreateReply::default()
                .embed(render_embed(ctx, &paginator, &locale))
                .components(render_buttons(&paginator.buttons(), true)),
        )
        .await;
    Ok(())
}
