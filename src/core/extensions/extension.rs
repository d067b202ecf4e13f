use super::ExtensionError;
use crate::core::checks::Check;
use crate::core::events::{EventFilter, EventHandler};
use crate::core::ratelimit::RateLimitPolicy;
use std::sync::Arc;

/// Anything with names the framework can route by. Implemented for poise
/// commands in the Discord layer.
pub trait NamedCommand {
    /// The command's qualified name followed by those of its subcommands
    /// (`locale`, `locale set`, ...).
    fn qualified_names(&self) -> Vec<String>;
}

/// A bundle of commands, event handlers, checks and rate limits that can be
/// loaded and unloaded as a unit.
///
/// `setup` runs on every load, so it must be repeatable.
pub trait Extension<C, E>: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn setup(&self, setup: &mut ExtensionSetup<C, E>) -> Result<(), ExtensionError>;
}

pub(super) struct HandlerSpec<E> {
    pub name: String,
    pub filter: Option<EventFilter<E>>,
    pub handler: Arc<dyn EventHandler<E>>,
}

/// Collects what an extension contributes while its `setup` runs.
pub struct ExtensionSetup<C, E> {
    pub(super) commands: Vec<C>,
    pub(super) handlers: Vec<HandlerSpec<E>>,
    pub(super) checks: Vec<(String, Check)>,
    pub(super) policies: Vec<(String, Vec<RateLimitPolicy>)>,
}

impl<C, E> Default for ExtensionSetup<C, E> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            handlers: Vec::new(),
            checks: Vec::new(),
            policies: Vec::new(),
        }
    }
}

impl<C, E> ExtensionSetup<C, E> {
    pub fn command(&mut self, command: C) -> &mut Self {
        self.commands.push(command);
        self
    }

    pub fn event_handler(&mut self, name: &str, handler: Arc<dyn EventHandler<E>>) -> &mut Self {
        self.handlers.push(HandlerSpec {
            name: name.to_string(),
            filter: None,
            handler,
        });
        self
    }

    pub fn event_handler_filtered(
        &mut self,
        name: &str,
        filter: EventFilter<E>,
        handler: Arc<dyn EventHandler<E>>,
    ) -> &mut Self {
        self.handlers.push(HandlerSpec {
            name: name.to_string(),
            filter: Some(filter),
            handler,
        });
        self
    }

    /// Add a check to `command` (qualified name).
    pub fn check(&mut self, command: &str, check: Check) -> &mut Self {
        self.checks.push((command.to_string(), check));
        self
    }

    /// Replace the rate limits of `command` (qualified name).
    pub fn rate_limit(&mut self, command: &str, policies: Vec<RateLimitPolicy>) -> &mut Self {
        self.policies.push((command.to_string(), policies));
        self
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}
