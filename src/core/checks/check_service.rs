// Command preconditions ("checks").
//
// A check looks at who is invoking a command and where, and either lets the
// invocation through or explains why not. Checks work on plain ids and a
// permission bitset, so this module has NO Discord dependencies. The Discord
// layer builds a `CheckContext` from the poise context before running them.

use crate::core::ratelimit::{CommandRateLimiter, RateLimitSubject, RateLimited};
use dashmap::{DashMap, DashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

// ============================================================================
// PERMISSIONS
// ============================================================================

/// Discord permission bits for the invoking member in the current channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const CREATE_INSTANT_INVITE: Permissions = Permissions(1 << 0);
    pub const KICK_MEMBERS: Permissions = Permissions(1 << 1);
    pub const BAN_MEMBERS: Permissions = Permissions(1 << 2);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);
    pub const MANAGE_CHANNELS: Permissions = Permissions(1 << 4);
    pub const MANAGE_GUILD: Permissions = Permissions(1 << 5);
    pub const ADD_REACTIONS: Permissions = Permissions(1 << 6);
    pub const VIEW_AUDIT_LOG: Permissions = Permissions(1 << 7);
    pub const VIEW_CHANNEL: Permissions = Permissions(1 << 10);
    pub const SEND_MESSAGES: Permissions = Permissions(1 << 11);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 13);
    pub const EMBED_LINKS: Permissions = Permissions(1 << 14);
    pub const ATTACH_FILES: Permissions = Permissions(1 << 15);
    pub const READ_MESSAGE_HISTORY: Permissions = Permissions(1 << 16);
    pub const MENTION_EVERYONE: Permissions = Permissions(1 << 17);
    pub const MANAGE_NICKNAMES: Permissions = Permissions(1 << 27);
    pub const MANAGE_ROLES: Permissions = Permissions(1 << 28);
    pub const MANAGE_WEBHOOKS: Permissions = Permissions(1 << 29);
    pub const MODERATE_MEMBERS: Permissions = Permissions(1 << 40);

    const NAMED: &'static [(Permissions, &'static str)] = &[
        (Permissions::CREATE_INSTANT_INVITE, "Create Invite"),
        (Permissions::KICK_MEMBERS, "Kick Members"),
        (Permissions::BAN_MEMBERS, "Ban Members"),
        (Permissions::ADMINISTRATOR, "Administrator"),
        (Permissions::MANAGE_CHANNELS, "Manage Channels"),
        (Permissions::MANAGE_GUILD, "Manage Server"),
        (Permissions::ADD_REACTIONS, "Add Reactions"),
        (Permissions::VIEW_AUDIT_LOG, "View Audit Log"),
        (Permissions::VIEW_CHANNEL, "View Channel"),
        (Permissions::SEND_MESSAGES, "Send Messages"),
        (Permissions::MANAGE_MESSAGES, "Manage Messages"),
        (Permissions::EMBED_LINKS, "Embed Links"),
        (Permissions::ATTACH_FILES, "Attach Files"),
        (Permissions::READ_MESSAGE_HISTORY, "Read Message History"),
        (Permissions::MENTION_EVERYONE, "Mention Everyone"),
        (Permissions::MANAGE_NICKNAMES, "Manage Nicknames"),
        (Permissions::MANAGE_ROLES, "Manage Roles"),
        (Permissions::MANAGE_WEBHOOKS, "Manage Webhooks"),
        (Permissions::MODERATE_MEMBERS, "Timeout Members"),
    ];

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Permissions in `required` this set lacks. Administrators lack nothing.
    pub fn missing(&self, required: Permissions) -> Permissions {
        if self.contains(Permissions::ADMINISTRATOR) {
            return Permissions::NONE;
        }
        Permissions(required.0 & !self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Display names of the known bits that are set.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(perm, _)| self.contains(*perm))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Self) -> Self::Output {
        Permissions(self.0 | rhs.0)
    }
}

// ============================================================================
// CHECKS
// ============================================================================

/// Everything a check may look at.
#[derive(Debug, Clone, Default)]
pub struct CheckContext {
    pub user_id: u64,
    /// `None` in DMs.
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub is_bot: bool,
    pub permissions: Permissions,
    pub is_owner: bool,
}

impl CheckContext {
    pub fn rate_limit_subject(&self) -> RateLimitSubject {
        RateLimitSubject {
            user_id: self.user_id,
            channel_id: self.channel_id,
            guild_id: self.guild_id,
        }
    }
}

/// Why a check refused. `key` and `args` feed the translation lookup;
/// `message` is the English fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub key: &'static str,
    pub args: Vec<(&'static str, String)>,
    pub message: String,
}

impl CheckFailure {
    pub fn new(key: &'static str, message: impl Into<String>) -> Self {
        Self {
            key,
            args: Vec::new(),
            message: message.into(),
        }
    }

    pub fn with_arg(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.args.push((name, value.into()));
        self
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CheckFailure {}

pub type CustomCheck = Arc<dyn Fn(&CheckContext) -> Result<(), CheckFailure> + Send + Sync>;

#[derive(Clone)]
pub enum Check {
    GuildOnly,
    DmOnly,
    OwnerOnly,
    RequirePermissions(Permissions),
    InChannels(Vec<u64>),
    NotBot,
    Custom { name: String, check: CustomCheck },
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::GuildOnly => f.write_str("GuildOnly"),
            Check::DmOnly => f.write_str("DmOnly"),
            Check::OwnerOnly => f.write_str("OwnerOnly"),
            Check::RequirePermissions(perms) => {
                f.debug_tuple("RequirePermissions").field(perms).finish()
            }
            Check::InChannels(channels) => f.debug_tuple("InChannels").field(channels).finish(),
            Check::NotBot => f.write_str("NotBot"),
            Check::Custom { name, .. } => f.debug_tuple("Custom").field(name).finish(),
        }
    }
}

impl Check {
    pub fn custom<F>(name: &str, check: F) -> Self
    where
        F: Fn(&CheckContext) -> Result<(), CheckFailure> + Send + Sync + 'static,
    {
        Check::Custom {
            name: name.to_string(),
            check: Arc::new(check),
        }
    }

    pub fn evaluate(&self, ctx: &CheckContext) -> Result<(), CheckFailure> {
        match self {
            Check::GuildOnly if ctx.guild_id.is_none() => Err(CheckFailure::new(
                "checks.guild_only",
                "This command can only be used in a server.",
            )),
            Check::DmOnly if ctx.guild_id.is_some() => Err(CheckFailure::new(
                "checks.dm_only",
                "This command can only be used in direct messages.",
            )),
            Check::OwnerOnly if !ctx.is_owner => Err(CheckFailure::new(
                "checks.owner_only",
                "Only the bot owners can use this command.",
            )),
            Check::RequirePermissions(required) => {
                // Permissions only exist inside guilds.
                if ctx.guild_id.is_none() {
                    return Ok(());
                }
                let missing = ctx.permissions.missing(*required);
                if missing.is_empty() {
                    return Ok(());
                }
                let names = missing.names().join(", ");
                Err(CheckFailure::new(
                    "checks.missing_permissions",
                    format!("You are missing permissions: {}", names),
                )
                .with_arg("permissions", names))
            }
            Check::InChannels(channels) if !channels.contains(&ctx.channel_id) => {
                let list = channels
                    .iter()
                    .map(|id| format!("<#{}>", id))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(CheckFailure::new(
                    "checks.wrong_channel",
                    format!("This command can only be used in: {}", list),
                )
                .with_arg("channels", list))
            }
            Check::NotBot if ctx.is_bot => Err(CheckFailure::new(
                "checks.not_bot",
                "Bots can't use this command.",
            )),
            Check::Custom { check, .. } => check(ctx),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// GUARDS
// ============================================================================

/// Identifies one check added with [`CommandGuards::add_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckId(u64);

/// Checks and rate limits for every command, keyed by qualified command name.
pub struct CommandGuards {
    checks: DashMap<String, Vec<(CheckId, Check)>>,
    next_check_id: AtomicU64,
    global: std::sync::RwLock<Vec<Check>>,
    owners: DashSet<u64>,
    skip_for_owners: AtomicBool,
    rate_limiter: CommandRateLimiter,
}

impl Default for CommandGuards {
    fn default() -> Self {
        Self {
            checks: DashMap::new(),
            next_check_id: AtomicU64::new(1),
            global: std::sync::RwLock::new(Vec::new()),
            owners: DashSet::new(),
            skip_for_owners: AtomicBool::new(true),
            rate_limiter: CommandRateLimiter::new(),
        }
    }
}

impl CommandGuards {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&self, command: &str, check: Check) -> CheckId {
        let id = CheckId(self.next_check_id.fetch_add(1, Ordering::Relaxed));
        self.checks
            .entry(command.to_string())
            .or_default()
            .push((id, check));
        id
    }

    /// Remove one check, leaving the command's other checks in place.
    pub fn remove_check(&self, command: &str, id: CheckId) -> bool {
        let Some(mut checks) = self.checks.get_mut(command) else {
            return false;
        };
        let before = checks.len();
        checks.retain(|(check_id, _)| *check_id != id);
        let removed = checks.len() != before;
        let now_empty = checks.is_empty();
        drop(checks);
        if now_empty {
            self.checks.remove_if(command, |_, checks| checks.is_empty());
        }
        removed
    }

    /// A check that runs before every command's own checks.
    pub fn add_global_check(&self, check: Check) {
        self.global
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(check);
    }

    pub fn remove_checks(&self, command: &str) {
        self.checks.remove(command);
        self.rate_limiter.clear_policies(command);
    }

    pub fn set_owners(&self, owners: impl IntoIterator<Item = u64>) {
        self.owners.clear();
        for owner in owners {
            self.owners.insert(owner);
        }
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owners.contains(&user_id)
    }

    pub fn set_skip_for_owners(&self, skip: bool) {
        self.skip_for_owners.store(skip, Ordering::Relaxed);
    }

    fn owner_bypass(&self, ctx: &CheckContext) -> bool {
        ctx.is_owner && self.skip_for_owners.load(Ordering::Relaxed)
    }

    /// Run global checks, then the command's checks, stopping at the first failure.
    pub fn run_checks(&self, command: &str, ctx: &CheckContext) -> Result<(), CheckFailure> {
        if self.owner_bypass(ctx) {
            return Ok(());
        }

        {
            let global = self
                .global
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for check in global.iter() {
                check.evaluate(ctx)?;
            }
        }

        // Clone out so no map lock is held while custom checks run.
        let checks = self
            .checks
            .get(command)
            .map(|checks| checks.clone())
            .unwrap_or_default();
        for (_, check) in &checks {
            check.evaluate(ctx)?;
        }
        Ok(())
    }

    pub fn check_rate_limit(&self, command: &str, ctx: &CheckContext) -> Result<(), RateLimited> {
        if self.owner_bypass(ctx) {
            return Ok(());
        }
        self.rate_limiter
            .check(command, &ctx.rate_limit_subject())
    }

    pub fn rate_limiter(&self) -> &CommandRateLimiter {
        &self.rate_limiter
    }

    pub fn check_count(&self, command: &str) -> usize {
        self.checks.get(command).map(|c| c.len()).unwrap_or(0)
    }
}
