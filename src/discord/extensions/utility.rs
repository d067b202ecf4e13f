// The `utility` extension: reminders, a parser playground, button polls and
// a hint when someone pings the bot without a command.

use crate::core::components::{
    ComponentEvent, ComponentHandler, ComponentRegistration, ComponentRegistry, ComponentResponse,
};
use crate::core::converters::{
    format_duration, ArgumentSchema, DurationConverter, SchemaError, StringConverter,
};
use crate::core::errors::{BoxError, RelayedError};
use crate::core::events::{EventFilter, FnEventHandler};
use crate::core::extensions::{Extension, ExtensionError, ExtensionSetup};
use crate::core::parsing;
use crate::core::ratelimit::RateLimitPolicy;
use crate::discord::framework::data::{BotEvent, Context, Error, PoiseCommand};
use crate::discord::framework::locale_context::tr;
use async_trait::async_trait;
use dashmap::DashMap;
use poise::serenity_prelude::{self as serenity, Mentionable};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const NAME: &str = "utility";

const MIN_REMINDER: Duration = Duration::from_secs(10);
const MAX_REMINDER: Duration = Duration::from_secs(30 * 24 * 60 * 60);
const MAX_POLL_OPTIONS: usize = 5;
const POLL_LIFETIME: Duration = Duration::from_secs(10 * 60);

pub struct UtilityExtension {
    prefix: String,
}

impl UtilityExtension {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Extension<PoiseCommand, BotEvent> for UtilityExtension {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Reminders, polls and other small tools"
    }

    fn setup(
        &self,
        setup: &mut ExtensionSetup<PoiseCommand, BotEvent>,
    ) -> Result<(), ExtensionError> {
        setup.command(remind()).command(parse()).command(poll());
        setup.rate_limit("poll", vec![RateLimitPolicy::per_guild(3, Duration::from_secs(60))]);

        let prefix = self.prefix.clone();
        let filter: EventFilter<BotEvent> = Arc::new(|event: &BotEvent| {
            matches!(&event.event, serenity::FullEvent::Message { new_message }
                if !new_message.author.bot)
        });
        setup.event_handler_filtered(
            "mention-hint",
            filter,
            Arc::new(FnEventHandler(move |event: BotEvent| {
                let prefix = prefix.clone();
                async move { mention_hint(event, &prefix).await }
            })),
        );
        Ok(())
    }
}

// ============================================================================
// REMIND
// ============================================================================

fn remind_schema() -> Result<ArgumentSchema, SchemaError> {
    ArgumentSchema::builder()
        .required(
            "time",
            "When to remind you, e.g. 10m or 2h30m",
            DurationConverter::between(MIN_REMINDER, MAX_REMINDER),
        )
        .rest(
            "message",
            "What to remind you about",
            StringConverter::new().max_length(1500),
        )
        .build()
}

/// Set a reminder. The bot pings you in this channel when it's due.
///
/// **Examples:**
/// - `!remind 30m take a break`
/// - `!remind 2h30m "check the oven" `
#[poise::command(slash_command, prefix_command)]
pub async fn remind(
    ctx: Context<'_>,
    #[description = "Time then message, e.g. 30m take a break"]
    #[rest]
    input: String,
) -> Result<(), Error> {
    let arguments = remind_schema()?
        .bind(&input)
        .map_err(RelayedError::from)?;

    let (Some(duration), Some(message)) = (arguments.duration("time"), arguments.text("message"))
    else {
        return Ok(());
    };
    let message = message.to_string();

    let user_id = ctx.author().id;
    let channel_id = ctx.channel_id();
    let http = ctx.serenity_context().http.clone();
    let reminder = message.clone();

    tokio::spawn(async move {
        tokio::time::sleep(duration).await;

        let content = format!("{} ⏰ {}", user_id.mention(), reminder);
        if let Err(e) = channel_id
            .send_message(
                &http,
                serenity::CreateMessage::new()
                    .content(content)
                    .allowed_mentions(serenity::CreateAllowedMentions::new().users(vec![user_id])),
            )
            .await
        {
            error!(user_id = user_id.get(), "Failed to send reminder: {}", e);
        }
    });

    info!(
        user_id = user_id.get(),
        seconds = duration.as_secs(),
        "Reminder scheduled"
    );
    let confirmation = tr(
        ctx,
        "remind.set",
        &[("time", format_duration(duration)), ("message", message)],
        "I'll remind you in {time}: {message}",
    )
    .await;
    ctx.say(confirmation).await?;
    Ok(())
}

// ============================================================================
// PARSE
// ============================================================================

fn describe_parse(input: &str) -> String {
    let parsed = match parsing::parse(input) {
        Ok(parsed) => parsed,
        Err(e) => return format!("❌ {}", e),
    };
    if parsed.is_empty() {
        return "Nothing to parse.".to_string();
    }

    let mut out = String::new();
    for (index, token) in parsed.positional.iter().enumerate() {
        out.push_str(&format!(
            "`{}` {:?}{}\n",
            index,
            token.value,
            if token.quoted { " (quoted)" } else { "" }
        ));
    }
    for named in &parsed.named {
        match &named.value {
            Some(value) => out.push_str(&format!("`--{}` = {:?}\n", named.name, value.value)),
            None => out.push_str(&format!("`--{}` (no value)\n", named.name)),
        }
    }
    out
}

/// Show how the bot splits text into arguments.
#[poise::command(slash_command, prefix_command)]
pub async fn parse(
    ctx: Context<'_>,
    #[description = "Text to tokenize"]
    #[rest]
    input: String,
) -> Result<(), Error> {
    ctx.say(describe_parse(&input)).await?;
    Ok(())
}

// ============================================================================
// POLL
// ============================================================================

fn poll_schema() -> Result<ArgumentSchema, SchemaError> {
    ArgumentSchema::builder()
        .required("question", "What to ask", StringConverter::new())
        .list(
            "options",
            "Between 2 and 5 answers",
            StringConverter::new().max_length(80),
            2,
        )
        .build()
}

/// Votes on one poll, one per user. Voting again moves the vote.
pub struct PollHandler {
    question: String,
    options: Vec<String>,
    votes: DashMap<u64, usize>,
}

impl PollHandler {
    pub fn new(question: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            question: question.into(),
            options,
            votes: DashMap::new(),
        }
    }

    pub fn tallies(&self) -> Vec<usize> {
        let mut tallies = vec![0; self.options.len()];
        for vote in self.votes.iter() {
            if let Some(count) = tallies.get_mut(*vote.value()) {
                *count += 1;
            }
        }
        tallies
    }

    pub fn render(&self) -> String {
        let mut out = format!("📊 **{}**\n", self.question);
        for (option, count) in self.options.iter().zip(self.tallies()) {
            out.push_str(&format!("\n{} · **{}**", option, count));
        }
        out
    }
}

#[async_trait]
impl ComponentHandler for PollHandler {
    async fn handle(&self, event: &ComponentEvent) -> Result<ComponentResponse, BoxError> {
        let index = event
            .custom_id
            .rsplit(':')
            .next()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|index| *index < self.options.len())
            .ok_or_else(|| format!("not a poll option: {}", event.custom_id))?;

        self.votes.insert(event.user_id, index);
        Ok(ComponentResponse::Update {
            content: self.render(),
        })
    }
}

/// Start a poll with buttons. Quote multi-word options.
///
/// **Example:** `!poll "Pizza tonight?" yes no "only pineapple"`
#[poise::command(prefix_command, guild_only)]
pub async fn poll(
    ctx: Context<'_>,
    #[description = "Question then options"]
    #[rest]
    input: String,
) -> Result<(), Error> {
    let arguments = poll_schema()?
        .bind(&input)
        .map_err(RelayedError::from)?;

    let question = arguments.text("question").unwrap_or_default().to_string();
    let options: Vec<String> = arguments
        .list("options")
        .iter()
        .filter_map(|value| value.as_text().map(str::to_string))
        .collect();

    if options.len() > MAX_POLL_OPTIONS {
        let message = tr(
            ctx,
            "poll.too_many_options",
            &[("max", MAX_POLL_OPTIONS.to_string())],
            "A poll can have at most {max} options.",
        )
        .await;
        return Err(RelayedError::Message(message).into());
    }

    let poll_id = ComponentRegistry::new_custom_id("poll");
    let buttons: Vec<serenity::CreateButton> = options
        .iter()
        .enumerate()
        .map(|(index, option)| {
            serenity::CreateButton::new(format!("{}:{}", poll_id, index))
                .label(option.clone())
                .style(serenity::ButtonStyle::Secondary)
        })
        .collect();

    let handler = PollHandler::new(question, options);
    let content = handler.render();
    ctx.data().components.register_prefix(
        ComponentRegistration::new(format!("{}:", poll_id)).expires_after(POLL_LIFETIME),
        handler,
    );

    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .components(vec![serenity::CreateActionRow::Buttons(buttons)]),
    )
    .await?;
    Ok(())
}

// ============================================================================
// MENTION HINT
// ============================================================================

/// True when `content` is nothing but a mention of `bot_id`.
fn is_bare_mention(content: &str, bot_id: u64) -> bool {
    let content = content.trim();
    content == format!("<@{}>", bot_id) || content == format!("<@!{}>", bot_id)
}

async fn mention_hint(event: BotEvent, prefix: &str) -> Result<(), BoxError> {
    let serenity::FullEvent::Message { new_message } = &event.event else {
        return Ok(());
    };
    let bot_id = event.ctx.cache.current_user().id.get();
    if !is_bare_mention(&new_message.content, bot_id) {
        return Ok(());
    }

    new_message
        .reply(
            &event.ctx.http,
            format!("👋 My prefix here is `{}`. Try `{}help`.", prefix, prefix),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(custom_id: &str, user_id: u64) -> ComponentEvent {
        ComponentEvent {
            custom_id: custom_id.to_string(),
            user_id,
            ..Default::default()
        }
    }

    #[test]
    fn remind_binds_time_and_message() {
        let arguments = remind_schema().unwrap().bind("1h30m stretch your legs").unwrap();
        assert_eq!(arguments.duration("time"), Some(Duration::from_secs(5400)));
        assert_eq!(arguments.text("message"), Some("stretch your legs"));

        assert!(remind_schema().unwrap().bind("2s too soon").is_err());
        assert!(remind_schema().unwrap().bind("soon please").is_err());
    }

    #[test]
    fn poll_needs_two_options() {
        let arguments = poll_schema()
            .unwrap()
            .bind(r#""Lunch?" pizza "sushi rolls""#)
            .unwrap();
        assert_eq!(arguments.text("question"), Some("Lunch?"));
        assert_eq!(arguments.list("options").len(), 2);

        assert!(poll_schema().unwrap().bind("Lunch? pizza").is_err());
    }

    #[tokio::test]
    async fn poll_votes_move_and_tally() {
        let poll = PollHandler::new("Lunch?", vec!["pizza".into(), "sushi".into()]);

        poll.handle(&press("poll:abc:0", 1)).await.unwrap();
        poll.handle(&press("poll:abc:1", 2)).await.unwrap();
        assert_eq!(poll.tallies(), vec![1, 1]);

        let response = poll.handle(&press("poll:abc:1", 1)).await.unwrap();
        assert_eq!(poll.tallies(), vec![0, 2]);
        match response {
            ComponentResponse::Update { content } => assert!(content.contains("sushi · **2**")),
            other => panic!("unexpected response: {:?}", other),
        }

        assert!(poll.handle(&press("poll:abc:7", 3)).await.is_err());
    }

    #[test]
    fn parse_output_lists_positional_and_named() {
        let out = describe_parse(r#"hello "big world" --mode fast --dry"#);
        assert!(out.contains(r#"`0` "hello""#));
        assert!(out.contains(r#"`1` "big world" (quoted)"#));
        assert!(out.contains(r#"`--mode` = "fast""#));
        assert!(out.contains("`--dry` (no value)"));
        assert!(describe_parse(r#"oops "unterminated"#).starts_with('❌'));
    }

    #[test]
    fn bare_mentions_only() {
        assert!(is_bare_mention("<@42>", 42));
        assert!(is_bare_mention("  <@!42> ", 42));
        assert!(!is_bare_mention("<@42> help", 42));
        assert!(!is_bare_mention("<@43>", 42));
    }
}
