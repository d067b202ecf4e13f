// Where command errors end up.
//
// Errors come in two kinds. "Relayed" errors are the user's fault (a failed
// check, a bad argument, a rate limit) and are answered with a friendly,
// translated reply. Everything else is a bug: it is logged, tagged with a
// short report id, handed to every configured reporter, and the user gets a
// generic apology quoting the id so the report can be found later.

use crate::core::checks::CheckFailure;
use crate::core::converters::ArgumentError;
use crate::core::ratelimit::{RateLimitScope, RateLimited};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ============================================================================
// RELAYED ERRORS
// ============================================================================

#[derive(Debug, Clone, Error)]
pub enum RelayedError {
    #[error("{0}")]
    CheckFailed(CheckFailure),

    #[error(transparent)]
    Arguments(#[from] ArgumentError),

    #[error("Slow down! Try again in {} second(s).", retry_secs(.retry_after))]
    RateLimited {
        retry_after: Duration,
        scope: RateLimitScope,
    },

    #[error("The `{0}` extension is disabled.")]
    ExtensionDisabled(String),

    #[error("{0}")]
    Message(String),
}

impl From<CheckFailure> for RelayedError {
    fn from(failure: CheckFailure) -> Self {
        RelayedError::CheckFailed(failure)
    }
}

impl From<RateLimited> for RelayedError {
    fn from(limited: RateLimited) -> Self {
        RelayedError::RateLimited {
            retry_after: limited.retry_after,
            scope: limited.scope,
        }
    }
}

fn retry_secs(retry_after: &Duration) -> u64 {
    // Round up so "0 seconds" never shows.
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl RelayedError {
    pub fn translation_key(&self) -> &'static str {
        match self {
            RelayedError::CheckFailed(failure) => failure.key,
            RelayedError::Arguments(err) => err.translation_key(),
            RelayedError::RateLimited { .. } => "errors.rate_limited",
            RelayedError::ExtensionDisabled(_) => "errors.extension_disabled",
            RelayedError::Message(_) => "errors.message",
        }
    }

    pub fn translation_args(&self) -> Vec<(&'static str, String)> {
        match self {
            RelayedError::CheckFailed(failure) => failure.args.clone(),
            RelayedError::Arguments(err) => err.translation_args(),
            RelayedError::RateLimited { retry_after, scope } => vec![
                ("seconds", retry_secs(retry_after).to_string()),
                ("scope", scope.label().to_string()),
            ],
            RelayedError::ExtensionDisabled(name) => vec![("extension", name.clone())],
            RelayedError::Message(text) => vec![("message", text.clone())],
        }
    }
}

/// Look for a relayed error anywhere in `error`'s source chain.
pub fn find_relayed(error: &(dyn std::error::Error + 'static)) -> Option<RelayedError> {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(relayed) = err.downcast_ref::<RelayedError>() {
            return Some(relayed.clone());
        }
        if let Some(arguments) = err.downcast_ref::<ArgumentError>() {
            return Some(RelayedError::Arguments(arguments.clone()));
        }
        if let Some(failure) = err.downcast_ref::<CheckFailure>() {
            return Some(RelayedError::CheckFailed(failure.clone()));
        }
        current = err.source();
    }
    None
}

// ============================================================================
// REPORTS
// ============================================================================

/// Where an error happened.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub command: Option<String>,
    pub user_id: Option<u64>,
    pub guild_id: Option<u64>,
    pub channel_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ErrorReport {
    /// Short id shown to the user.
    pub id: String,
    pub context: ErrorContext,
    pub message: String,
    /// `source()` chain below the top-level error, outermost first.
    pub causes: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(error: &(dyn std::error::Error + 'static), context: ErrorContext) -> Self {
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }

        Self {
            id: report_id(),
            context,
            message: error.to_string(),
            causes,
            occurred_at: Utc::now(),
        }
    }
}

fn report_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Sends unexpected errors somewhere a developer will see them.
#[async_trait]
pub trait ErrorReporter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn report(&self, report: &ErrorReport) -> Result<(), BoxError>;
}

// ============================================================================
// FUNNEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunnelOutcome {
    /// Tell the user what went wrong.
    Relay {
        key: &'static str,
        args: Vec<(&'static str, String)>,
        /// English text for when the key has no translation.
        fallback: String,
    },
    /// An unexpected error was reported.
    Reported { report_id: String, reply: bool },
}

pub struct ErrorFunnel {
    reporters: Vec<Arc<dyn ErrorReporter>>,
    reply_on_unexpected: bool,
}

impl ErrorFunnel {
    pub fn new(reply_on_unexpected: bool) -> Self {
        Self {
            reporters: Vec::new(),
            reply_on_unexpected,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn reporter_names(&self) -> Vec<&'static str> {
        self.reporters.iter().map(|r| r.name()).collect()
    }

    pub async fn handle(
        &self,
        error: &(dyn std::error::Error + Send + Sync + 'static),
        context: ErrorContext,
    ) -> FunnelOutcome {
        if let Some(relayed) = find_relayed(error) {
            return FunnelOutcome::Relay {
                key: relayed.translation_key(),
                args: relayed.translation_args(),
                fallback: relayed.to_string(),
            };
        }

        let report = ErrorReport::new(error, context);
        error!(
            report_id = %report.id,
            command = report.context.command.as_deref().unwrap_or("-"),
            user_id = report.context.user_id.unwrap_or_default(),
            guild_id = report.context.guild_id.unwrap_or_default(),
            "Unexpected error: {}",
            report.message
        );

        for reporter in &self.reporters {
            if let Err(e) = reporter.report(&report).await {
                warn!(
                    reporter = reporter.name(),
                    report_id = %report.id,
                    "Error reporter failed: {}",
                    e
                );
            }
        }

        FunnelOutcome::Reported {
            report_id: report.id,
            reply: self.reply_on_unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Error)]
    #[error("command body failed")]
    struct Wrapper(#[source] RelayedError);

    #[derive(Debug, Error)]
    #[error("database is on fire")]
    struct Outer(#[source] std::io::Error);

    #[derive(Default)]
    struct Collecting {
        reports: Mutex<Vec<ErrorReport>>,
    }

    #[async_trait]
    impl ErrorReporter for Collecting {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn report(&self, report: &ErrorReport) -> Result<(), BoxError> {
            self.reports.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl ErrorReporter for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn report(&self, _: &ErrorReport) -> Result<(), BoxError> {
            Err("webhook unreachable".into())
        }
    }

    #[tokio::test]
    async fn relayed_errors_are_found_in_the_source_chain() {
        let funnel = ErrorFunnel::new(true);
        let error = Wrapper(RelayedError::RateLimited {
            retry_after: Duration::from_millis(2500),
            scope: RateLimitScope::User,
        });

        match funnel.handle(&error, ErrorContext::default()).await {
            FunnelOutcome::Relay { key, args, fallback } => {
                assert_eq!(key, "errors.rate_limited");
                assert!(args.contains(&("seconds", "3".to_string())));
                assert_eq!(fallback, "Slow down! Try again in 3 second(s).");
            }
            other => panic!("expected a relay, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_argument_errors_relay_too() {
        let funnel = ErrorFunnel::new(true);
        let error = ArgumentError::Missing {
            argument: "time".into(),
        };
        let outcome = funnel.handle(&error, ErrorContext::default()).await;
        assert!(matches!(
            outcome,
            FunnelOutcome::Relay {
                key: "arguments.missing",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unexpected_errors_reach_every_reporter() {
        let collecting = Arc::new(Collecting::default());
        let funnel = ErrorFunnel::new(false)
            .with_reporter(Arc::new(Broken))
            .with_reporter(collecting.clone());

        let error = Outer(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        let context = ErrorContext {
            command: Some("remind".into()),
            user_id: Some(1),
            ..Default::default()
        };

        let outcome = funnel.handle(&error, context).await;
        let reports = collecting.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "database is on fire");
        assert_eq!(reports[0].causes, vec!["disk full".to_string()]);
        assert_eq!(reports[0].context.command.as_deref(), Some("remind"));
        assert_eq!(
            outcome,
            FunnelOutcome::Reported {
                report_id: reports[0].id.clone(),
                reply: false
            }
        );
        assert_eq!(reports[0].id.len(), 8);
        assert_eq!(funnel.reporter_names(), vec!["broken", "collecting"]);
    }

    #[test]
    fn retry_seconds_round_up() {
        assert_eq!(retry_secs(&Duration::from_millis(1)), 1);
        assert_eq!(retry_secs(&Duration::from_secs(4)), 4);
        assert_eq!(retry_secs(&Duration::ZERO), 1);
    }
}
