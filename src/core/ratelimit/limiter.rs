use super::bucket::SlidingWindowBucket;
use dashmap::DashMap;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

// ============================================================================
// POLICY
// ============================================================================

/// Who shares a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// One bucket for everyone.
    Global,
    /// Per guild. Falls back to the channel in DMs.
    Guild,
    Channel,
    /// Per user, across guilds.
    User,
    /// Per user per guild. Falls back to the user in DMs.
    Member,
}

impl RateLimitScope {
    pub fn label(&self) -> &'static str {
        match self {
            RateLimitScope::Global => "global",
            RateLimitScope::Guild => "guild",
            RateLimitScope::Channel => "channel",
            RateLimitScope::User => "user",
            RateLimitScope::Member => "member",
        }
    }
}

impl FromStr for RateLimitScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global" => Ok(RateLimitScope::Global),
            "guild" | "server" => Ok(RateLimitScope::Guild),
            "channel" => Ok(RateLimitScope::Channel),
            "user" => Ok(RateLimitScope::User),
            "member" => Ok(RateLimitScope::Member),
            other => Err(format!("unknown rate limit scope `{}`", other)),
        }
    }
}

/// `limit` uses per `window`, counted per `scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub scope: RateLimitScope,
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(scope: RateLimitScope, limit: u32, window: Duration) -> Self {
        Self {
            scope,
            limit,
            window,
        }
    }

    pub fn per_user(limit: u32, window: Duration) -> Self {
        Self::new(RateLimitScope::User, limit, window)
    }

    pub fn per_guild(limit: u32, window: Duration) -> Self {
        Self::new(RateLimitScope::Guild, limit, window)
    }
}

/// The invocation being limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RateLimitSubject {
    pub user_id: u64,
    pub channel_id: u64,
    /// `None` in DMs.
    pub guild_id: Option<u64>,
}

/// Bucket key: the command, the policy's shape and the ids its scope
/// cares about. Two policies with the same scope never share a bucket, and a
/// changed policy starts from an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub command: String,
    pub scope: RateLimitScope,
    pub limit: u32,
    pub window: Duration,
    pub id: u64,
    /// Second id for Member buckets (the guild).
    pub secondary: u64,
}

impl RateLimitKey {
    pub fn new(command: &str, policy: &RateLimitPolicy, subject: &RateLimitSubject) -> Self {
        let scope = policy.scope;
        let (id, secondary) = match (scope, subject.guild_id) {
            (RateLimitScope::Global, _) => (0, 0),
            (RateLimitScope::Guild, Some(guild)) => (guild, 0),
            (RateLimitScope::Guild, None) | (RateLimitScope::Channel, _) => {
                (subject.channel_id, 0)
            }
            (RateLimitScope::User, _) | (RateLimitScope::Member, None) => (subject.user_id, 0),
            (RateLimitScope::Member, Some(guild)) => (subject.user_id, guild),
        };

        // DM fallbacks share buckets with the scope they fall back to.
        let scope = match (scope, subject.guild_id) {
            (RateLimitScope::Guild, None) => RateLimitScope::Channel,
            (RateLimitScope::Member, None) => RateLimitScope::User,
            (scope, _) => scope,
        };

        Self {
            command: command.to_string(),
            scope,
            limit: policy.limit,
            window: policy.window,
            id,
            secondary,
        }
    }

    /// Whether this bucket could have been made for `policy`, DM fallbacks
    /// included.
    fn belongs_to(&self, policy: &RateLimitPolicy) -> bool {
        let scope_matches = match (policy.scope, self.scope) {
            (RateLimitScope::Guild, RateLimitScope::Channel)
            | (RateLimitScope::Member, RateLimitScope::User) => true,
            (policy_scope, key_scope) => policy_scope == key_scope,
        };
        scope_matches && policy.limit == self.limit && policy.window == self.window
    }
}

/// A denied invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
    pub scope: RateLimitScope,
}

// ============================================================================
// LIMITER
// ============================================================================

/// Per-command rate limits.
///
/// Commands without their own policies use the default policy, if any.
#[derive(Debug, Default)]
pub struct CommandRateLimiter {
    policies: DashMap<String, Vec<RateLimitPolicy>>,
    default_policy: Mutex<Option<RateLimitPolicy>>,
    // One lock for all buckets: a check reads and records several buckets
    // and must not interleave with another check.
    buckets: Mutex<HashMap<RateLimitKey, SlidingWindowBucket>>,
}

impl CommandRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the policies for `command`. An empty list removes the limit
    /// (and stops the default from applying). Buckets of policies that are
    /// no longer in force are dropped.
    pub fn set_policies(&self, command: &str, policies: Vec<RateLimitPolicy>) {
        self.policies.insert(command.to_string(), policies);
        self.drop_stale_buckets(command);
    }

    /// Drop per-command policies so the default applies again.
    pub fn clear_policies(&self, command: &str) {
        self.policies.remove(command);
        self.drop_stale_buckets(command);
    }

    /// The policies for `command` if they were set with `set_policies`.
    pub fn own_policies(&self, command: &str) -> Option<Vec<RateLimitPolicy>> {
        self.policies.get(command).map(|policies| policies.clone())
    }

    fn drop_stale_buckets(&self, command: &str) {
        let current = self.policies_for(command);
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        buckets.retain(|key, _| {
            key.command != command || current.iter().any(|policy| key.belongs_to(policy))
        });
    }

    pub fn set_default(&self, policy: Option<RateLimitPolicy>) {
        *self
            .default_policy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = policy;
    }

    pub fn policies_for(&self, command: &str) -> Vec<RateLimitPolicy> {
        if let Some(policies) = self.policies.get(command) {
            return policies.clone();
        }
        self.default_policy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .copied()
            .collect()
    }

    pub fn check(&self, command: &str, subject: &RateLimitSubject) -> Result<(), RateLimited> {
        self.check_at(command, subject, Instant::now())
    }

    /// Record a hit if every policy allows it. Otherwise nothing is recorded
    /// and the longest wait among the full buckets is returned.
    pub fn check_at(
        &self,
        command: &str,
        subject: &RateLimitSubject,
        now: Instant,
    ) -> Result<(), RateLimited> {
        let policies = self.policies_for(command);
        if policies.is_empty() {
            return Ok(());
        }

        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut denied: Option<RateLimited> = None;
        let mut keys: Vec<RateLimitKey> = Vec::with_capacity(policies.len());
        for policy in &policies {
            let key = RateLimitKey::new(command, policy, subject);
            if keys.contains(&key) {
                continue;
            }
            keys.push(key.clone());
            let bucket = buckets
                .entry(key)
                .or_insert_with(|| SlidingWindowBucket::new(policy.limit, policy.window));
            let wait = bucket.wait_time(now);
            if wait > Duration::ZERO && denied.map_or(true, |d| wait > d.retry_after) {
                denied = Some(RateLimited {
                    retry_after: wait,
                    scope: policy.scope,
                });
            }
        }

        if let Some(denied) = denied {
            debug!(
                command,
                user_id = subject.user_id,
                scope = denied.scope.label(),
                retry_after_ms = denied.retry_after.as_millis() as u64,
                "Command rate limited"
            );
            return Err(denied);
        }

        for key in &keys {
            if let Some(bucket) = buckets.get_mut(key) {
                bucket.record(now);
            }
        }
        Ok(())
    }

    /// Forget every bucket `subject` touches for `command`.
    pub fn reset(&self, command: &str, subject: &RateLimitSubject) {
        let policies = self.policies_for(command);
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for policy in policies {
            buckets.remove(&RateLimitKey::new(command, &policy, subject));
        }
    }

    /// Drop buckets with no hits left in their window. Returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut buckets = self
            .buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_idle(now));
        before - buckets.len()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn subject(user_id: u64, guild_id: Option<u64>) -> RateLimitSubject {
        RateLimitSubject {
            user_id,
            channel_id: 500,
            guild_id,
        }
    }

    #[test]
    fn commands_without_policies_are_unlimited() {
        let limiter = CommandRateLimiter::new();
        for _ in 0..100 {
            assert!(limiter.check("ping", &subject(1, Some(9))).is_ok());
        }
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn user_scope_limits_each_user_separately() {
        let limiter = CommandRateLimiter::new();
        limiter.set_policies(
            "roll",
            vec![RateLimitPolicy::per_user(1, Duration::from_secs(5))],
        );
        let now = Instant::now();

        assert!(limiter.check_at("roll", &subject(1, Some(9)), now).is_ok());
        assert!(limiter.check_at("roll", &subject(2, Some(9)), now).is_ok());

        let denied = limiter
            .check_at("roll", &subject(1, Some(9)), now + Duration::from_secs(2))
            .unwrap_err();
        assert_eq!(denied.retry_after, Duration::from_secs(3));
        assert_eq!(denied.scope, RateLimitScope::User);

        assert!(limiter
            .check_at("roll", &subject(1, Some(9)), now + Duration::from_secs(5))
            .is_ok());
    }

    #[test]
    fn denial_records_nothing_and_reports_longest_wait() {
        let limiter = CommandRateLimiter::new();
        limiter.set_policies(
            "search",
            vec![
                RateLimitPolicy::per_user(2, Duration::from_secs(100)),
                RateLimitPolicy::per_guild(1, Duration::from_secs(60)),
            ],
        );
        let now = Instant::now();

        assert!(limiter.check_at("search", &subject(1, Some(9)), now).is_ok());

        // Guild bucket is full; user bucket still has room.
        let denied = limiter
            .check_at("search", &subject(1, Some(9)), now + Duration::from_secs(1))
            .unwrap_err();
        assert_eq!(denied.scope, RateLimitScope::Guild);
        assert_eq!(denied.retry_after, Duration::from_secs(59));

        // The denied call did not take the user's second slot.
        let later = now + Duration::from_secs(61);
        assert!(limiter.check_at("search", &subject(1, Some(9)), later).is_ok());

        let denied = limiter
            .check_at("search", &subject(1, Some(10)), later)
            .unwrap_err();
        assert_eq!(denied.scope, RateLimitScope::User);
        assert_eq!(denied.retry_after, Duration::from_secs(39));
    }

    fn key(scope: RateLimitScope, who: &RateLimitSubject) -> RateLimitKey {
        RateLimitKey::new("x", &RateLimitPolicy::new(scope, 3, Duration::from_secs(10)), who)
    }

    #[test]
    fn guild_and_member_scopes_fall_back_in_dms() {
        let dm = subject(1, None);
        assert_eq!(key(RateLimitScope::Guild, &dm), key(RateLimitScope::Channel, &dm));
        assert_eq!(key(RateLimitScope::Member, &dm), key(RateLimitScope::User, &dm));

        let in_guild = subject(1, Some(9));
        assert_ne!(key(RateLimitScope::Member, &in_guild), key(RateLimitScope::User, &in_guild));
    }

    #[test]
    fn policies_with_the_same_scope_keep_separate_buckets() {
        let limiter = CommandRateLimiter::new();
        limiter.set_policies(
            "x",
            vec![
                RateLimitPolicy::per_user(2, Duration::from_secs(10)),
                RateLimitPolicy::per_user(5, Duration::from_secs(60)),
            ],
        );
        let now = Instant::now();
        let who = subject(1, Some(9));

        assert!(limiter.check_at("x", &who, now).is_ok());
        assert!(limiter.check_at("x", &who, now).is_ok());
        assert_eq!(limiter.bucket_count(), 2);

        // The short window is full, the long one has three slots left.
        let denied = limiter.check_at("x", &who, now).unwrap_err();
        assert_eq!(denied.retry_after, Duration::from_secs(10));

        for offset in [10, 10, 20] {
            assert!(limiter
                .check_at("x", &who, now + Duration::from_secs(offset))
                .is_ok());
        }
        let denied = limiter
            .check_at("x", &who, now + Duration::from_secs(30))
            .unwrap_err();
        assert_eq!(denied.retry_after, Duration::from_secs(30));
    }

    #[test]
    fn replaced_policies_start_from_fresh_buckets() {
        let limiter = CommandRateLimiter::new();
        limiter.set_policies("y", vec![RateLimitPolicy::per_user(1, Duration::from_secs(60))]);
        let now = Instant::now();
        let who = subject(1, Some(9));

        assert!(limiter.check_at("y", &who, now).is_ok());
        assert!(limiter.check_at("y", &who, now).is_err());

        limiter.set_policies("y", vec![RateLimitPolicy::per_user(10, Duration::from_secs(60))]);
        assert_eq!(limiter.bucket_count(), 0);
        assert!(limiter.check_at("y", &who, now).is_ok());

        limiter.clear_policies("y");
        assert_eq!(limiter.bucket_count(), 0);
        assert!(limiter.check_at("y", &who, now).is_ok());
    }

    #[test]
    fn default_policy_applies_until_overridden() {
        let limiter = CommandRateLimiter::new();
        limiter.set_default(Some(RateLimitPolicy::new(
            RateLimitScope::Global,
            1,
            Duration::from_secs(30),
        )));
        let now = Instant::now();

        assert!(limiter.check_at("a", &subject(1, None), now).is_ok());
        assert!(limiter.check_at("a", &subject(2, None), now).is_err());

        limiter.set_policies("b", Vec::new());
        assert!(limiter.check_at("b", &subject(1, None), now).is_ok());
        assert!(limiter.check_at("b", &subject(1, None), now).is_ok());
    }

    #[test]
    fn reset_and_sweep_clear_buckets() {
        let limiter = CommandRateLimiter::new();
        limiter.set_policies(
            "roll",
            vec![RateLimitPolicy::per_user(1, Duration::from_secs(5))],
        );
        let now = Instant::now();
        let who = subject(1, None);

        assert!(limiter.check_at("roll", &who, now).is_ok());
        limiter.reset("roll", &who);
        assert!(limiter.check_at("roll", &who, now).is_ok());

        assert_eq!(limiter.sweep(now + Duration::from_secs(1)), 0);
        assert_eq!(limiter.sweep(now + Duration::from_secs(5)), 1);
        assert_eq!(limiter.bucket_count(), 0);
    }

    #[test]
    fn concurrent_checks_never_exceed_the_limit() {
        let limiter = Arc::new(CommandRateLimiter::new());
        limiter.set_policies(
            "claim",
            vec![RateLimitPolicy::new(
                RateLimitScope::Global,
                5,
                Duration::from_secs(60),
            )],
        );
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|user| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.check_at("claim", &subject(user, None), now))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .filter(|result| result.is_ok())
            .count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn scopes_parse_from_config_strings() {
        assert_eq!("Guild".parse::<RateLimitScope>(), Ok(RateLimitScope::Guild));
        assert_eq!("server".parse::<RateLimitScope>(), Ok(RateLimitScope::Guild));
        assert!("planet".parse::<RateLimitScope>().is_err());
    }
}
