// The `core` extension: help, locale preferences, and managing extensions
// and plugins at runtime.

use crate::core::checks::{Check, Permissions};
use crate::core::errors::RelayedError;
use crate::core::extensions::{Extension, ExtensionError, ExtensionSetup, ExtensionState};
use crate::core::i18n::Locale;
use crate::core::pagination::{Page, PageGroup, Paginator, DEFAULT_PAGE_CHARS};
use crate::core::plugins::PluginStatus;
use crate::discord::framework::data::{BotEvent, Context, Error, PoiseCommand};
use crate::discord::framework::locale_context::{resolve_locale, tr};
use crate::discord::framework::paginator_view::paginate;
use std::collections::BTreeMap;

pub const NAME: &str = "core";

pub struct CoreExtension;

impl Extension<PoiseCommand, BotEvent> for CoreExtension {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Help, locale preferences and extension management"
    }

    fn setup(
        &self,
        setup: &mut ExtensionSetup<PoiseCommand, BotEvent>,
    ) -> Result<(), ExtensionError> {
        setup
            .command(help())
            .command(locale())
            .command(extensions())
            .command(plugins());

        setup
            .check("locale server", Check::GuildOnly)
            .check(
                "locale server",
                Check::RequirePermissions(Permissions::MANAGE_GUILD),
            )
            .check("extensions load", Check::OwnerOnly)
            .check("extensions unload", Check::OwnerOnly)
            .check("plugins", Check::OwnerOnly);
        Ok(())
    }
}

/// Run a paginator with the configured button timeout.
async fn show(ctx: Context<'_>, paginator: Paginator) -> Result<(), Error> {
    let timeout = ctx.data().settings.component_timeout;
    paginate(ctx, paginator.with_timeout(timeout)).await
}

// ============================================================================
// HELP
// ============================================================================

fn command_line(prefix: &str, command: &PoiseCommand) -> String {
    let description = command
        .description
        .as_deref()
        .or(command.help_text.as_deref())
        .unwrap_or("No description provided.");
    format!("`{}{}` · {}", prefix, command.qualified_name, description)
}

fn collect_lines(prefix: &str, command: &PoiseCommand, out: &mut Vec<String>) {
    if command.subcommands.is_empty() {
        out.push(command_line(prefix, command));
    }
    for subcommand in &command.subcommands {
        if !subcommand.hide_in_help {
            collect_lines(prefix, subcommand, out);
        }
    }
}

fn find_command<'a>(commands: &'a [PoiseCommand], path: &[&str]) -> Option<&'a PoiseCommand> {
    let (first, rest) = path.split_first()?;
    let command = commands
        .iter()
        .find(|c| c.name == *first || c.aliases.iter().any(|a| a == first))?;
    if rest.is_empty() {
        Some(command)
    } else {
        find_command(&command.subcommands, rest)
    }
}

async fn command_details(ctx: Context<'_>, query: &str) -> Result<(), Error> {
    let path: Vec<&str> = query.split_whitespace().collect();
    let commands = &ctx.framework().options().commands;
    let Some(command) = find_command(commands, &path) else {
        let message = tr(
            ctx,
            "help.unknown_command",
            &[("command", query.to_string())],
            "There is no command called `{command}`.",
        )
        .await;
        return Err(RelayedError::Message(message).into());
    };

    let prefix = &ctx.data().settings.prefix;
    let mut body = command
        .help_text
        .clone()
        .or_else(|| command.description.clone())
        .unwrap_or_else(|| "No description provided.".to_string());

    if !command.parameters.is_empty() {
        body.push_str("\n\n");
        for parameter in &command.parameters {
            let name = if parameter.required {
                format!("<{}>", parameter.name)
            } else {
                format!("[{}]", parameter.name)
            };
            body.push_str(&format!(
                "`{}` {}\n",
                name,
                parameter.description.as_deref().unwrap_or("")
            ));
        }
    }
    if !command.subcommands.is_empty() {
        body.push('\n');
        for subcommand in &command.subcommands {
            body.push_str(&command_line(prefix, subcommand));
            body.push('\n');
        }
    }

    let title = format!("{}{}", prefix, command.qualified_name);
    let page = Page::titled(&title, body);
    show(ctx, Paginator::new(vec![PageGroup::new(&title, vec![page])])?).await
}

/// Show the commands of every loaded extension, or details of one command.
#[poise::command(slash_command, prefix_command, track_edits)]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command to explain"]
    #[rest]
    command: Option<String>,
) -> Result<(), Error> {
    if let Some(query) = command.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        return command_details(ctx, query).await;
    }

    let data = ctx.data();
    let prefix = &data.settings.prefix;

    // Grouped by the extension that provides them; BTreeMap keeps the
    // groups in a stable order.
    let mut by_extension: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for command in &ctx.framework().options().commands {
        if command.hide_in_help || !data.extensions.is_command_active(&command.qualified_name) {
            continue;
        }
        let owner = data
            .extensions
            .extension_for(&command.qualified_name)
            .unwrap_or_else(|| "other".to_string());
        collect_lines(prefix, command, by_extension.entry(owner).or_default());
    }

    let note = tr(
        ctx,
        "help.footer",
        &[("prefix", prefix.clone())],
        "Use {prefix}help <command> for details",
    )
    .await;

    let groups: Vec<PageGroup> = by_extension
        .into_iter()
        .map(|(extension, mut lines)| {
            lines.sort();
            let mut group = PageGroup::from_lines(&extension, lines, DEFAULT_PAGE_CHARS);
            for page in &mut group.pages {
                page.footer_note = Some(note.clone());
            }
            group
        })
        .collect();

    show(ctx, Paginator::new(groups)?).await
}

// ============================================================================
// LOCALE
// ============================================================================

/// Check `raw` names a locale we have translations for (or whose language we do).
async fn supported_locale(ctx: Context<'_>, raw: &str) -> Result<Locale, Error> {
    let available = ctx.data().available_locales();
    let supported = Locale::parse(raw)
        .ok()
        .filter(|locale| locale.fallbacks().iter().any(|l| available.contains(l)));

    match supported {
        Some(locale) => Ok(locale),
        None => {
            let list = available
                .iter()
                .map(|l| format!("`{}`", l))
                .collect::<Vec<_>>()
                .join(", ");
            let message = tr(
                ctx,
                "locale.unsupported",
                &[("locale", raw.to_string()), ("available", list)],
                "`{locale}` isn't supported. Available: {available}",
            )
            .await;
            Err(RelayedError::Message(message).into())
        }
    }
}

/// Show or change the language the bot answers you in.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("locale_show", "locale_set", "locale_clear", "locale_server"),
    subcommand_required
)]
pub async fn locale(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the language the bot is using for you.
#[poise::command(slash_command, prefix_command, rename = "show")]
pub async fn locale_show(ctx: Context<'_>) -> Result<(), Error> {
    let current = resolve_locale(ctx).await;
    let message = tr(
        ctx,
        "locale.current",
        &[("locale", current.to_string())],
        "I'm talking to you in `{locale}`.",
    )
    .await;
    ctx.say(message).await?;
    Ok(())
}

/// Set your preferred language.
#[poise::command(slash_command, prefix_command, rename = "set")]
pub async fn locale_set(
    ctx: Context<'_>,
    #[description = "Locale code, e.g. en-US or fr"] code: String,
) -> Result<(), Error> {
    let locale = supported_locale(ctx, &code).await?;
    ctx.data()
        .locale_store
        .set_user_locale(ctx.author().id.get(), &locale)
        .await?;

    let message = tr(
        ctx,
        "locale.set",
        &[("locale", locale.to_string())],
        "Your language is now `{locale}`.",
    )
    .await;
    ctx.say(message).await?;
    Ok(())
}

/// Forget your language preference.
#[poise::command(slash_command, prefix_command, rename = "clear")]
pub async fn locale_clear(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data()
        .locale_store
        .clear_user_locale(ctx.author().id.get())
        .await?;

    let message = tr(
        ctx,
        "locale.cleared",
        &[],
        "Your language preference was cleared.",
    )
    .await;
    ctx.say(message).await?;
    Ok(())
}

/// Set this server's default language. Leave empty to reset.
#[poise::command(slash_command, prefix_command, rename = "server")]
pub async fn locale_server(
    ctx: Context<'_>,
    #[description = "Locale code, e.g. de; leave empty to reset"] code: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        return Ok(());
    };
    let store = &ctx.data().locale_store;

    let message = match code {
        Some(code) => {
            let locale = supported_locale(ctx, &code).await?;
            store.set_guild_locale(guild_id.get(), &locale).await?;
            tr(
                ctx,
                "locale.server_set",
                &[("locale", locale.to_string())],
                "This server's language is now `{locale}`.",
            )
            .await
        }
        None => {
            store.clear_guild_locale(guild_id.get()).await?;
            tr(
                ctx,
                "locale.server_cleared",
                &[],
                "This server's language preference was cleared.",
            )
            .await
        }
    };
    ctx.say(message).await?;
    Ok(())
}

// ============================================================================
// EXTENSIONS AND PLUGINS
// ============================================================================

/// List, load and unload extensions.
#[poise::command(
    slash_command,
    prefix_command,
    subcommands("extensions_list", "extensions_load", "extensions_unload"),
    subcommand_required
)]
pub async fn extensions(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show every extension and whether it's loaded.
#[poise::command(slash_command, prefix_command, rename = "list")]
pub async fn extensions_list(ctx: Context<'_>) -> Result<(), Error> {
    let lines: Vec<String> = ctx
        .data()
        .extensions
        .summaries()
        .into_iter()
        .map(|summary| {
            let state = match &summary.state {
                ExtensionState::Failed(reason) => format!("failed: {}", reason),
                other => other.label().to_string(),
            };
            format!(
                "**{}** ({}) · {} commands, {} event handlers\n{}",
                summary.name,
                state,
                summary.commands.len(),
                summary.handlers,
                summary.description
            )
        })
        .collect();

    show(ctx, Paginator::from_lines("Extensions", lines, DEFAULT_PAGE_CHARS)?).await
}

/// Load an extension.
#[poise::command(slash_command, prefix_command, rename = "load")]
pub async fn extensions_load(
    ctx: Context<'_>,
    #[description = "Extension name"] name: String,
) -> Result<(), Error> {
    ctx.data()
        .extensions
        .load(&name)
        .map_err(|e| RelayedError::Message(e.to_string()))?;

    let message = tr(
        ctx,
        "extensions.loaded",
        &[("extension", name)],
        "Loaded `{extension}`.",
    )
    .await;
    ctx.say(message).await?;
    Ok(())
}

/// Unload an extension. Its commands stay registered but refuse to run.
#[poise::command(slash_command, prefix_command, rename = "unload")]
pub async fn extensions_unload(
    ctx: Context<'_>,
    #[description = "Extension name"] name: String,
) -> Result<(), Error> {
    if name == NAME {
        let message = tr(
            ctx,
            "extensions.cannot_unload_core",
            &[],
            "The core extension can't be unloaded.",
        )
        .await;
        return Err(RelayedError::Message(message).into());
    }

    ctx.data()
        .extensions
        .unload(&name)
        .map_err(|e| RelayedError::Message(e.to_string()))?;

    let message = tr(
        ctx,
        "extensions.unloaded",
        &[("extension", name)],
        "Unloaded `{extension}`.",
    )
    .await;
    ctx.say(message).await?;
    Ok(())
}

/// Show the plugins found on the plugin paths and what became of them.
#[poise::command(slash_command, prefix_command)]
pub async fn plugins(ctx: Context<'_>) -> Result<(), Error> {
    let plugins = ctx.data().plugins.plugins();
    if plugins.is_empty() {
        let message = tr(ctx, "plugins.none", &[], "No plugins were found.").await;
        ctx.say(message).await?;
        return Ok(());
    }

    let lines: Vec<String> = plugins
        .iter()
        .map(|plugin| {
            let marker = match plugin.status {
                PluginStatus::Loaded => "✅",
                PluginStatus::Skipped(_) => "⏭",
                PluginStatus::NoFactory | PluginStatus::Failed(_) => "⚠",
            };
            format!(
                "{} **{}** `{}` v{} · {}",
                marker,
                plugin.descriptor.display_name(),
                plugin.descriptor.id,
                plugin.descriptor.version,
                plugin.status
            )
        })
        .collect();

    show(ctx, Paginator::from_lines("Plugins", lines, DEFAULT_PAGE_CHARS)?).await
}
