// Bot configuration.
//
// Settings come from a builder (for code that embeds the framework) or from
// environment variables (for the reference bot, with `.env` support in
// main). Values are validated here so a typo fails at startup with the name
// of the offending variable rather than somewhere deep in the client.

use crate::core::i18n::Locale;
use crate::core::ratelimit::{RateLimitPolicy, RateLimitScope};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Gateway intent names accepted in `BOT_INTENTS`.
pub const KNOWN_INTENTS: &[&str] = &[
    "GUILDS",
    "GUILD_MEMBERS",
    "GUILD_MODERATION",
    "GUILD_EMOJIS_AND_STICKERS",
    "GUILD_INTEGRATIONS",
    "GUILD_WEBHOOKS",
    "GUILD_INVITES",
    "GUILD_VOICE_STATES",
    "GUILD_PRESENCES",
    "GUILD_MESSAGES",
    "GUILD_MESSAGE_REACTIONS",
    "GUILD_MESSAGE_TYPING",
    "DIRECT_MESSAGES",
    "DIRECT_MESSAGE_REACTIONS",
    "DIRECT_MESSAGE_TYPING",
    "MESSAGE_CONTENT",
    "GUILD_SCHEDULED_EVENTS",
    "AUTO_MODERATION_CONFIGURATION",
    "AUTO_MODERATION_EXECUTION",
];

pub const DEFAULT_INTENTS: &[&str] = &[
    "GUILDS",
    "GUILD_MESSAGES",
    "DIRECT_MESSAGES",
    "MESSAGE_CONTENT",
];

/// Which locale resolvers run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocaleResolverKind {
    /// Preferences saved with the `locale` command.
    Stored,
    /// The invoking user's Discord client language.
    Client,
    /// The guild's preferred locale.
    Guild,
}

impl LocaleResolverKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "stored" | "preference" => Some(LocaleResolverKind::Stored),
            "client" | "user" => Some(LocaleResolverKind::Client),
            "guild" | "server" => Some(LocaleResolverKind::Guild),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("Missing {0}! Create a .env file or set the variable.")]
    Missing(&'static str),

    #[error("Invalid {key} `{value}`: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn invalid(key: &'static str, value: &str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone)]
pub struct BotSettings {
    pub token: String,
    pub prefix: String,
    pub mention_as_prefix: bool,
    pub intents: Vec<String>,
    pub owners: Vec<u64>,
    pub skip_checks_for_owners: bool,
    pub default_locale: Locale,
    pub locale_resolvers: Vec<LocaleResolverKind>,
    pub locales_dir: PathBuf,
    pub plugin_paths: Vec<PathBuf>,
    pub data_dir: PathBuf,
    pub default_rate_limit: Option<RateLimitPolicy>,
    pub error_webhook_url: Option<String>,
    pub reply_on_unexpected_error: bool,
    /// Register slash commands in this guild only (instant updates while developing).
    pub test_guild: Option<u64>,
    pub component_timeout: Duration,
}

impl BotSettings {
    pub fn builder(token: impl Into<String>) -> BotSettingsBuilder {
        BotSettingsBuilder::new(token)
    }

    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup` (env-var names as keys). Unset and
    /// blank values use the defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let token = get("DISCORD_TOKEN").ok_or(SettingsError::Missing("DISCORD_TOKEN"))?;
        let mut builder = BotSettingsBuilder::new(token);

        if let Some(prefix) = get("BOT_PREFIX") {
            builder = builder.prefix(prefix.trim());
        }
        if let Some(intents) = get("BOT_INTENTS") {
            builder = builder.intents(split_list(&intents));
        }
        if let Some(owners) = get("BOT_OWNERS") {
            let owners = split_list(&owners)
                .into_iter()
                .map(|id| parse_id("BOT_OWNERS", &id))
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.owners(owners);
        }
        if let Some(locale) = get("BOT_DEFAULT_LOCALE") {
            let locale = Locale::parse(&locale)
                .map_err(|e| invalid("BOT_DEFAULT_LOCALE", &locale, e.to_string()))?;
            builder = builder.default_locale(locale);
        }
        if let Some(resolvers) = get("BOT_LOCALE_RESOLVERS") {
            let kinds = split_list(&resolvers)
                .into_iter()
                .map(|name| {
                    LocaleResolverKind::parse(&name).ok_or_else(|| {
                        invalid(
                            "BOT_LOCALE_RESOLVERS",
                            &name,
                            "expected stored, client or guild",
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.locale_resolvers(kinds);
        }
        if let Some(dir) = get("BOT_LOCALES_DIR") {
            builder = builder.locales_dir(dir.trim());
        }
        if let Some(paths) = get("BOT_PLUGIN_PATHS") {
            builder = builder.plugin_paths(paths.split([':', ',']).filter_map(|p| {
                let p = p.trim();
                (!p.is_empty()).then(|| PathBuf::from(p))
            }));
        }
        if let Some(dir) = get("BOT_DATA_DIR") {
            builder = builder.data_dir(dir.trim());
        }
        if let Some(limit) = get("BOT_RATE_LIMIT") {
            builder = builder.default_rate_limit(Some(parse_rate_limit(&limit)?));
        }
        if let Some(url) = get("ERROR_WEBHOOK_URL") {
            builder = builder.error_webhook_url(url.trim());
        }
        if let Some(reply) = get("BOT_REPLY_ON_ERROR") {
            builder = builder.reply_on_unexpected_error(parse_bool("BOT_REPLY_ON_ERROR", &reply)?);
        }
        if let Some(mention) = get("BOT_MENTION_PREFIX") {
            builder = builder.mention_as_prefix(parse_bool("BOT_MENTION_PREFIX", &mention)?);
        }
        if let Some(guild) = get("BOT_TEST_GUILD") {
            builder = builder.test_guild(parse_id("BOT_TEST_GUILD", &guild)?);
        }
        if let Some(secs) = get("BOT_COMPONENT_TIMEOUT") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| invalid("BOT_COMPONENT_TIMEOUT", &secs, "expected seconds"))?;
            builder = builder.component_timeout(Duration::from_secs(secs));
        }

        builder.build()
    }

    /// SQLite database for locale preferences.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("bot.db")
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_id(key: &'static str, raw: &str) -> Result<u64, SettingsError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(invalid(key, raw, "expected a Discord id")),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, SettingsError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "expected true or false")),
    }
}

/// `<limit>/<seconds>[@scope]`, e.g. `5/10@user`. Scope defaults to user.
fn parse_rate_limit(raw: &str) -> Result<RateLimitPolicy, SettingsError> {
    const KEY: &str = "BOT_RATE_LIMIT";
    let raw = raw.trim();
    let (rate, scope) = match raw.split_once('@') {
        Some((rate, scope)) => {
            let scope = scope
                .parse::<RateLimitScope>()
                .map_err(|reason| invalid(KEY, raw, reason))?;
            (rate, scope)
        }
        None => (raw, RateLimitScope::User),
    };

    let (limit, secs) = rate
        .split_once('/')
        .ok_or_else(|| invalid(KEY, raw, "expected <limit>/<seconds>[@scope]"))?;
    let limit: u32 = limit
        .trim()
        .parse()
        .map_err(|_| invalid(KEY, raw, "limit must be a number"))?;
    let secs: u64 = secs
        .trim()
        .parse()
        .map_err(|_| invalid(KEY, raw, "window must be a number of seconds"))?;

    if limit == 0 || secs == 0 {
        return Err(invalid(KEY, raw, "limit and window must be positive"));
    }
    Ok(RateLimitPolicy::new(scope, limit, Duration::from_secs(secs)))
}

// ============================================================================
// BUILDER
// ============================================================================

#[derive(Debug, Clone)]
pub struct BotSettingsBuilder {
    settings: BotSettings,
}

impl BotSettingsBuilder {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            settings: BotSettings {
                token: token.into(),
                prefix: "!".to_string(),
                mention_as_prefix: true,
                intents: DEFAULT_INTENTS.iter().map(|s| s.to_string()).collect(),
                owners: Vec::new(),
                skip_checks_for_owners: true,
                default_locale: Locale::default(),
                locale_resolvers: vec![
                    LocaleResolverKind::Stored,
                    LocaleResolverKind::Client,
                    LocaleResolverKind::Guild,
                ],
                locales_dir: PathBuf::from("locales"),
                plugin_paths: vec![PathBuf::from("plugins")],
                data_dir: PathBuf::from("data"),
                default_rate_limit: None,
                error_webhook_url: None,
                reply_on_unexpected_error: true,
                test_guild: None,
                component_timeout: Duration::from_secs(120),
            },
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.prefix = prefix.into();
        self
    }

    pub fn mention_as_prefix(mut self, enabled: bool) -> Self {
        self.settings.mention_as_prefix = enabled;
        self
    }

    /// Intent names such as `GUILD_MEMBERS`. Case-insensitive.
    pub fn intents<I, S>(mut self, intents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.intents = intents
            .into_iter()
            .map(|s| s.into().trim().to_uppercase())
            .collect();
        self
    }

    pub fn owners(mut self, owners: impl IntoIterator<Item = u64>) -> Self {
        self.settings.owners = owners.into_iter().collect();
        self
    }

    pub fn skip_checks_for_owners(mut self, skip: bool) -> Self {
        self.settings.skip_checks_for_owners = skip;
        self
    }

    pub fn default_locale(mut self, locale: Locale) -> Self {
        self.settings.default_locale = locale;
        self
    }

    pub fn locale_resolvers(mut self, resolvers: Vec<LocaleResolverKind>) -> Self {
        self.settings.locale_resolvers = resolvers;
        self
    }

    pub fn locales_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.locales_dir = dir.into();
        self
    }

    pub fn plugin_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.settings.plugin_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.data_dir = dir.into();
        self
    }

    pub fn default_rate_limit(mut self, policy: Option<RateLimitPolicy>) -> Self {
        self.settings.default_rate_limit = policy;
        self
    }

    pub fn error_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.settings.error_webhook_url = Some(url.into());
        self
    }

    pub fn reply_on_unexpected_error(mut self, reply: bool) -> Self {
        self.settings.reply_on_unexpected_error = reply;
        self
    }

    pub fn test_guild(mut self, guild_id: u64) -> Self {
        self.settings.test_guild = Some(guild_id);
        self
    }

    pub fn component_timeout(mut self, timeout: Duration) -> Self {
        self.settings.component_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<BotSettings, SettingsError> {
        let settings = self.settings;

        if settings.token.trim().is_empty() {
            return Err(SettingsError::Missing("DISCORD_TOKEN"));
        }
        if settings.prefix.is_empty() || settings.prefix.chars().any(char::is_whitespace) {
            return Err(invalid(
                "BOT_PREFIX",
                &settings.prefix,
                "must be non-empty without spaces",
            ));
        }
        if let Some(unknown) = settings
            .intents
            .iter()
            .find(|intent| !KNOWN_INTENTS.contains(&intent.as_str()))
        {
            return Err(invalid("BOT_INTENTS", unknown, "unknown gateway intent"));
        }
        if let Some(policy) = settings.default_rate_limit {
            if policy.limit == 0 || policy.window.is_zero() {
                return Err(invalid(
                    "BOT_RATE_LIMIT",
                    &format!("{}/{:?}", policy.limit, policy.window),
                    "limit and window must be positive",
                ));
            }
        }
        if let Some(url) = &settings.error_webhook_url {
            if !url.starts_with("https://") {
                return Err(invalid("ERROR_WEBHOOK_URL", url, "must be an https URL"));
            }
        }
        if settings.component_timeout.is_zero() {
            return Err(invalid(
                "BOT_COMPONENT_TIMEOUT",
                "0",
                "must be at least one second",
            ));
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn builder_defaults() {
        let settings = BotSettings::builder("token").build().unwrap();
        assert_eq!(settings.prefix, "!");
        assert!(settings.mention_as_prefix);
        assert_eq!(
            settings.intents,
            vec!["GUILDS", "GUILD_MESSAGES", "DIRECT_MESSAGES", "MESSAGE_CONTENT"]
        );
        assert!(settings.owners.is_empty());
        assert!(settings.skip_checks_for_owners);
        assert_eq!(settings.default_locale.as_str(), "en-US");
        assert_eq!(settings.locale_resolvers.len(), 3);
        assert_eq!(settings.locales_dir, PathBuf::from("locales"));
        assert_eq!(settings.plugin_paths, vec![PathBuf::from("plugins")]);
        assert_eq!(settings.data_dir, PathBuf::from("data"));
        assert_eq!(settings.database_path(), PathBuf::from("data").join("bot.db"));
        assert!(settings.default_rate_limit.is_none());
        assert!(settings.error_webhook_url.is_none());
        assert!(settings.reply_on_unexpected_error);
        assert!(settings.test_guild.is_none());
        assert_eq!(settings.component_timeout, Duration::from_secs(120));
    }

    #[test]
    fn builder_validates() {
        assert_eq!(
            BotSettings::builder("  ").build().unwrap_err(),
            SettingsError::Missing("DISCORD_TOKEN")
        );
        assert!(BotSettings::builder("t").prefix("a b").build().is_err());
        assert!(BotSettings::builder("t")
            .intents(["guilds", "GUILD_PIGEONS"])
            .build()
            .is_err());
        assert!(BotSettings::builder("t")
            .error_webhook_url("http://insecure")
            .build()
            .is_err());

        let settings = BotSettings::builder("t")
            .intents(["guilds", "guild_members"])
            .build()
            .unwrap();
        assert_eq!(settings.intents, vec!["GUILDS", "GUILD_MEMBERS"]);
    }

    #[test]
    fn env_requires_a_token() {
        assert_eq!(
            BotSettings::from_lookup(lookup(&[])).unwrap_err(),
            SettingsError::Missing("DISCORD_TOKEN")
        );
        assert_eq!(
            BotSettings::from_lookup(lookup(&[("DISCORD_TOKEN", "   ")])).unwrap_err(),
            SettingsError::Missing("DISCORD_TOKEN")
        );
    }

    #[test]
    fn env_overrides_everything() {
        let settings = BotSettings::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "abc"),
            ("BOT_PREFIX", "?"),
            ("BOT_INTENTS", "GUILDS, GUILD_MEMBERS"),
            ("BOT_OWNERS", "1,2 3"),
            ("BOT_DEFAULT_LOCALE", "pt_br"),
            ("BOT_LOCALE_RESOLVERS", "client,stored"),
            ("BOT_LOCALES_DIR", "i18n"),
            ("BOT_PLUGIN_PATHS", "plugins:/opt/bot/plugins,extra"),
            ("BOT_DATA_DIR", "/var/lib/bot"),
            ("BOT_RATE_LIMIT", "5/10@guild"),
            ("ERROR_WEBHOOK_URL", "https://discord.com/api/webhooks/1/abc"),
            ("BOT_REPLY_ON_ERROR", "no"),
            ("BOT_MENTION_PREFIX", "off"),
            ("BOT_TEST_GUILD", "42"),
            ("BOT_COMPONENT_TIMEOUT", "30"),
        ]))
        .unwrap();

        assert_eq!(settings.token, "abc");
        assert_eq!(settings.prefix, "?");
        assert_eq!(settings.intents, vec!["GUILDS", "GUILD_MEMBERS"]);
        assert_eq!(settings.owners, vec![1, 2, 3]);
        assert_eq!(settings.default_locale.as_str(), "pt-BR");
        assert_eq!(
            settings.locale_resolvers,
            vec![LocaleResolverKind::Client, LocaleResolverKind::Stored]
        );
        assert_eq!(settings.locales_dir, PathBuf::from("i18n"));
        assert_eq!(
            settings.plugin_paths,
            vec![
                PathBuf::from("plugins"),
                PathBuf::from("/opt/bot/plugins"),
                PathBuf::from("extra")
            ]
        );
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/bot"));
        assert_eq!(
            settings.default_rate_limit,
            Some(RateLimitPolicy::new(
                RateLimitScope::Guild,
                5,
                Duration::from_secs(10)
            ))
        );
        assert!(!settings.reply_on_unexpected_error);
        assert!(!settings.mention_as_prefix);
        assert_eq!(settings.test_guild, Some(42));
        assert_eq!(settings.component_timeout, Duration::from_secs(30));
    }

    #[test]
    fn env_errors_name_the_variable() {
        let cases = [
            ("BOT_OWNERS", "me"),
            ("BOT_DEFAULT_LOCALE", "klingon!"),
            ("BOT_LOCALE_RESOLVERS", "stored,astrology"),
            ("BOT_RATE_LIMIT", "fast"),
            ("BOT_RATE_LIMIT", "0/10"),
            ("BOT_RATE_LIMIT", "5/10@planet"),
            ("BOT_REPLY_ON_ERROR", "maybe"),
            ("BOT_TEST_GUILD", "0"),
        ];
        for (key, value) in cases {
            let err = BotSettings::from_lookup(lookup(&[("DISCORD_TOKEN", "t"), (key, value)]))
                .unwrap_err();
            match err {
                SettingsError::Invalid { key: named, .. } => assert_eq!(named, key),
                other => panic!("{key}={value}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn rate_limit_scope_defaults_to_user() {
        assert_eq!(
            parse_rate_limit("3/60").unwrap(),
            RateLimitPolicy::per_user(3, Duration::from_secs(60))
        );
    }
}
