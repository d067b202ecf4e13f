// Posts error reports to a Discord webhook as an embed, so the bot's
// developers see failures in a channel of their choosing.

use crate::core::errors::{BoxError, ErrorReport, ErrorReporter};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const EMBED_COLOUR: u32 = 0xED4245;
const DESCRIPTION_LIMIT: usize = 4096;
const FIELD_LIMIT: usize = 1024;

pub struct WebhookReporter {
    client: Client,
    url: String,
    username: String,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>) -> Result<Self, BoxError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
            username: "Error Reports".to_string(),
        })
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    fn payload(&self, report: &ErrorReport) -> Value {
        let mut fields = Vec::new();
        let context = &report.context;
        if let Some(command) = &context.command {
            fields.push(field("Command", &format!("`{}`", command), true));
        }
        if let Some(user_id) = context.user_id {
            fields.push(field("User", &format!("<@{}> ({})", user_id, user_id), true));
        }
        if let Some(guild_id) = context.guild_id {
            fields.push(field("Guild", &guild_id.to_string(), true));
        }
        if let Some(channel_id) = context.channel_id {
            fields.push(field("Channel", &format!("<#{}>", channel_id), true));
        }
        if !report.causes.is_empty() {
            let chain = report
                .causes
                .iter()
                .map(|cause| format!("- {}", cause))
                .collect::<Vec<_>>()
                .join("\n");
            fields.push(field("Caused by", &chain, false));
        }

        let description = truncate(&format!("```\n{}\n```", report.message), DESCRIPTION_LIMIT);
        json!({
            "username": self.username,
            "allowed_mentions": { "parse": [] },
            "embeds": [{
                "title": format!("Error report `{}`", report.id),
                "description": description,
                "color": EMBED_COLOUR,
                "fields": fields,
                "timestamp": report.occurred_at.to_rfc3339(),
            }]
        })
    }
}

fn field(name: &str, value: &str, inline: bool) -> Value {
    json!({ "name": name, "value": truncate(value, FIELD_LIMIT), "inline": inline })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

#[async_trait]
impl ErrorReporter for WebhookReporter {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn report(&self, report: &ErrorReport) -> Result<(), BoxError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(report))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Webhook rejected error report: {} - {}", status, text).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ErrorContext;

    fn report() -> ErrorReport {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        ErrorReport::new(
            &err,
            ErrorContext {
                command: Some("remind".into()),
                user_id: Some(42),
                guild_id: None,
                channel_id: Some(9),
            },
        )
    }

    #[test]
    fn payload_is_a_single_embed_with_context_fields() {
        let reporter = WebhookReporter::new("https://discord.com/api/webhooks/1/x").unwrap();
        let report = report();
        let payload = reporter.payload(&report);

        let embed = &payload["embeds"][0];
        assert_eq!(
            embed["title"].as_str().unwrap(),
            format!("Error report `{}`", report.id)
        );
        assert!(embed["description"].as_str().unwrap().contains("disk full"));
        assert_eq!(embed["color"], EMBED_COLOUR);

        let names: Vec<&str> = embed["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Command", "User", "Channel"]);
        assert_eq!(payload["allowed_mentions"]["parse"], json!([]));
    }

    #[test]
    fn long_text_is_truncated_to_discord_limits() {
        let long = "x".repeat(FIELD_LIMIT + 50);
        let truncated = truncate(&long, FIELD_LIMIT);
        assert_eq!(truncated.chars().count(), FIELD_LIMIT);
        assert!(truncated.ends_with('…'));
        assert_eq!(truncate("short", FIELD_LIMIT), "short");
    }
}
