use super::extension::{Extension, ExtensionSetup, NamedCommand};
use super::ExtensionError;
use crate::core::checks::{CheckId, CommandGuards};
use crate::core::events::{EventBus, HandlerId};
use crate::core::ratelimit::RateLimitPolicy;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionState {
    Loaded,
    Unloaded,
    Failed(String),
}

impl ExtensionState {
    pub fn label(&self) -> &'static str {
        match self {
            ExtensionState::Loaded => "loaded",
            ExtensionState::Unloaded => "unloaded",
            ExtensionState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSummary {
    pub name: String,
    pub description: String,
    pub state: ExtensionState,
    pub commands: Vec<String>,
    pub handlers: usize,
}

struct AppliedPolicies {
    command: String,
    applied: Vec<RateLimitPolicy>,
    previous: Option<Vec<RateLimitPolicy>>,
}

struct Entry<C, E> {
    extension: Arc<dyn Extension<C, E>>,
    state: ExtensionState,
    /// Qualified names of the commands this extension provides.
    commands: Vec<String>,
    /// Checks this extension added.
    checks: Vec<(String, CheckId)>,
    /// Rate limits this extension set, with whatever the command had before.
    policies: Vec<AppliedPolicies>,
    handler_ids: Vec<HandlerId>,
    /// Whether its commands were handed to the framework already.
    commands_queued: bool,
}

/// Owns every extension and applies what they contribute.
///
/// Event handlers, checks and rate limits come and go with load/unload.
/// Commands can't: the framework fixes its command list when the client
/// starts, so unloading only marks an extension's commands inactive, and
/// reloading re-activates them.
pub struct ExtensionRegistry<C, E> {
    bus: Arc<EventBus<E>>,
    guards: Arc<CommandGuards>,
    entries: Mutex<Vec<Entry<C, E>>>,
    pending_commands: Mutex<Vec<C>>,
    started: AtomicBool,
}

impl<C, E> ExtensionRegistry<C, E>
where
    C: NamedCommand + Send + 'static,
    E: Send + Sync + 'static,
{
    pub fn new(bus: Arc<EventBus<E>>, guards: Arc<CommandGuards>) -> Self {
        Self {
            bus,
            guards,
            entries: Mutex::new(Vec::new()),
            pending_commands: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry<C, E>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, extension: Arc<dyn Extension<C, E>>) -> Result<(), ExtensionError> {
        let mut entries = self.entries();
        let name = extension.name().to_string();
        if entries.iter().any(|e| e.extension.name() == name) {
            return Err(ExtensionError::Duplicate(name));
        }
        entries.push(Entry {
            extension,
            state: ExtensionState::Unloaded,
            commands: Vec::new(),
            checks: Vec::new(),
            policies: Vec::new(),
            handler_ids: Vec::new(),
            commands_queued: false,
        });
        Ok(())
    }

    /// Run the extension's setup and apply the result.
    ///
    /// The registry stays locked while `setup` runs, so setup must not call
    /// back into the registry.
    pub fn load(&self, name: &str) -> Result<(), ExtensionError> {
        let mut entries = self.entries();

        // Command names owned by other extensions, for conflict checks.
        let owners: HashMap<String, String> = entries
            .iter()
            .filter(|e| e.extension.name() != name)
            .flat_map(|e| {
                let owner = e.extension.name().to_string();
                e.commands.iter().map(move |c| (c.clone(), owner.clone()))
            })
            .collect();

        let entry = entries
            .iter_mut()
            .find(|e| e.extension.name() == name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;

        if entry.state == ExtensionState::Loaded {
            return Err(ExtensionError::AlreadyLoaded(name.to_string()));
        }

        let mut setup = ExtensionSetup::default();
        if let Err(e) = entry.extension.setup(&mut setup) {
            let reason = match &e {
                ExtensionError::Setup { reason, .. } => reason.clone(),
                other => other.to_string(),
            };
            error!(extension = name, "Extension setup failed: {}", reason);
            entry.state = ExtensionState::Failed(reason.clone());
            return Err(ExtensionError::Setup {
                name: name.to_string(),
                reason,
            });
        }

        let mut command_names = Vec::new();
        for command in &setup.commands {
            for qualified in command.qualified_names() {
                if let Some(owner) = owners.get(&qualified) {
                    let conflict = ExtensionError::CommandConflict {
                        command: qualified,
                        owner: owner.clone(),
                    };
                    entry.state = ExtensionState::Failed(conflict.to_string());
                    return Err(conflict);
                }
                command_names.push(qualified);
            }
        }

        let started = self.started.load(Ordering::SeqCst);
        if !entry.commands_queued && !started {
            self.pending_commands
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .extend(setup.commands);
            entry.commands_queued = true;
        } else {
            let new: Vec<&String> = command_names
                .iter()
                .filter(|c| !entry.commands.contains(c))
                .collect();
            if !new.is_empty() {
                warn!(
                    extension = name,
                    commands = ?new,
                    "Commands added after startup are not registered until restart"
                );
            }
        }
        entry.commands = command_names;

        entry.handler_ids = setup
            .handlers
            .into_iter()
            .map(|spec| match spec.filter {
                Some(filter) => self
                    .bus
                    .subscribe_filtered(name, &spec.name, filter, spec.handler),
                None => self.bus.subscribe(name, &spec.name, spec.handler),
            })
            .collect();

        for (command, check) in setup.checks {
            let id = self.guards.add_check(&command, check);
            entry.checks.push((command, id));
        }
        let limiter = self.guards.rate_limiter();
        for (command, policies) in setup.policies {
            let previous = limiter.own_policies(&command);
            limiter.set_policies(&command, policies.clone());
            entry.policies.push(AppliedPolicies {
                command,
                applied: policies,
                previous,
            });
        }

        entry.state = ExtensionState::Loaded;
        info!(
            extension = name,
            commands = entry.commands.len(),
            handlers = entry.handler_ids.len(),
            "Extension loaded"
        );
        Ok(())
    }

    /// Load every extension that isn't loaded yet, in the order they were
    /// added. Failures are logged and returned; they don't stop the rest.
    pub fn load_all(&self) -> Vec<(String, ExtensionError)> {
        let names: Vec<String> = self
            .entries()
            .iter()
            .filter(|e| e.state != ExtensionState::Loaded)
            .map(|e| e.extension.name().to_string())
            .collect();

        names
            .into_iter()
            .filter_map(|name| self.load(&name).err().map(|e| (name, e)))
            .collect()
    }

    pub fn unload(&self, name: &str) -> Result<(), ExtensionError> {
        let mut entries = self.entries();
        let entry = entries
            .iter_mut()
            .find(|e| e.extension.name() == name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;

        if entry.state != ExtensionState::Loaded {
            return Err(ExtensionError::NotLoaded(name.to_string()));
        }

        self.bus.unsubscribe_owner(name);
        entry.handler_ids.clear();
        for (command, id) in entry.checks.drain(..) {
            self.guards.remove_check(&command, id);
        }
        let limiter = self.guards.rate_limiter();
        // Newest first, so stacked overrides on one command unwind in order.
        for applied in entry.policies.drain(..).rev() {
            // Leave policies someone else has replaced since.
            if limiter.own_policies(&applied.command).as_ref() != Some(&applied.applied) {
                continue;
            }
            match applied.previous {
                Some(previous) => limiter.set_policies(&applied.command, previous),
                None => limiter.clear_policies(&applied.command),
            }
        }
        entry.state = ExtensionState::Unloaded;
        info!(extension = name, "Extension unloaded");
        Ok(())
    }

    /// Unload `name` if needed and forget it. Commands of its that are still
    /// waiting for [`take_commands`](Self::take_commands) go with it.
    pub fn remove(&self, name: &str) -> Result<(), ExtensionError> {
        if self.state(name) == Some(ExtensionState::Loaded) {
            self.unload(name)?;
        }

        let mut entries = self.entries();
        let index = entries
            .iter()
            .position(|e| e.extension.name() == name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))?;
        let entry = entries.remove(index);

        if entry.commands_queued && !self.started.load(Ordering::SeqCst) {
            self.pending_commands
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|command| {
                    !command
                        .qualified_names()
                        .iter()
                        .any(|qualified| entry.commands.contains(qualified))
                });
        }
        info!(extension = name, "Extension removed");
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<ExtensionState> {
        self.entries()
            .iter()
            .find(|e| e.extension.name() == name)
            .map(|e| e.state.clone())
    }

    pub fn summaries(&self) -> Vec<ExtensionSummary> {
        self.entries()
            .iter()
            .map(|e| ExtensionSummary {
                name: e.extension.name().to_string(),
                description: e.extension.description().to_string(),
                state: e.state.clone(),
                commands: e.commands.clone(),
                handlers: e.handler_ids.len(),
            })
            .collect()
    }

    /// Hand queued commands to the framework. After this, new commands are
    /// no longer accepted.
    pub fn take_commands(&self) -> Vec<C> {
        self.started.store(true, Ordering::SeqCst);
        std::mem::take(
            &mut *self
                .pending_commands
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    /// Name of the extension providing `command`.
    pub fn extension_for(&self, command: &str) -> Option<String> {
        self.entries()
            .iter()
            .find(|e| e.commands.iter().any(|c| c == command))
            .map(|e| e.extension.name().to_string())
    }

    /// Commands nobody owns (registered outside any extension) are always active.
    pub fn is_command_active(&self, command: &str) -> bool {
        self.entries()
            .iter()
            .find(|e| e.commands.iter().any(|c| c == command))
            .map_or(true, |e| e.state == ExtensionState::Loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checks::{Check, CheckContext};
    use crate::core::errors::BoxError;
    use crate::core::events::EventHandler;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Debug)]
    struct TestCommand {
        name: &'static str,
        subcommands: Vec<&'static str>,
    }

    impl NamedCommand for TestCommand {
        fn qualified_names(&self) -> Vec<String> {
            std::iter::once(self.name.to_string())
                .chain(
                    self.subcommands
                        .iter()
                        .map(|sub| format!("{} {}", self.name, sub)),
                )
                .collect()
        }
    }

    struct Noop;

    #[async_trait]
    impl EventHandler<String> for Noop {
        async fn handle(&self, _: &String) -> Result<(), BoxError> {
            Ok(())
        }
    }

    struct Greeter {
        name: &'static str,
        command: &'static str,
        fail: bool,
    }

    impl Extension<TestCommand, String> for Greeter {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Says hello"
        }

        fn setup(
            &self,
            setup: &mut ExtensionSetup<TestCommand, String>,
        ) -> Result<(), ExtensionError> {
            if self.fail {
                return Err(ExtensionError::Setup {
                    name: self.name.to_string(),
                    reason: "missing API key".into(),
                });
            }
            setup
                .command(TestCommand {
                    name: self.command,
                    subcommands: vec!["loud"],
                })
                .event_handler("greet-on-join", Arc::new(Noop))
                .check(self.command, Check::GuildOnly)
                .rate_limit(
                    self.command,
                    vec![RateLimitPolicy::per_user(1, Duration::from_secs(10))],
                );
            Ok(())
        }
    }

    fn registry() -> (
        ExtensionRegistry<TestCommand, String>,
        Arc<EventBus<String>>,
        Arc<CommandGuards>,
    ) {
        let bus = Arc::new(EventBus::new());
        let guards = Arc::new(CommandGuards::new());
        (ExtensionRegistry::new(bus.clone(), guards.clone()), bus, guards)
    }

    fn greeter(
        name: &'static str,
        command: &'static str,
    ) -> Arc<dyn Extension<TestCommand, String>> {
        Arc::new(Greeter {
            name,
            command,
            fail: false,
        })
    }

    #[test]
    fn loading_applies_handlers_checks_and_commands() {
        let (registry, bus, guards) = registry();
        registry.add(greeter("greeter", "hello")).unwrap();
        assert_eq!(
            registry.add(greeter("greeter", "hi")).unwrap_err(),
            ExtensionError::Duplicate("greeter".into())
        );

        assert!(registry.load_all().is_empty());
        assert_eq!(registry.state("greeter"), Some(ExtensionState::Loaded));
        assert_eq!(bus.len(), 1);
        assert_eq!(guards.check_count("hello"), 1);
        assert_eq!(guards.rate_limiter().policies_for("hello").len(), 1);

        let commands = registry.take_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(registry.extension_for("hello loud"), Some("greeter".into()));
        assert!(registry.is_command_active("hello"));
        assert!(registry.is_command_active("not-from-an-extension"));
    }

    #[test]
    fn unload_and_reload_toggle_commands_without_requeueing() {
        let (registry, bus, guards) = registry();
        registry.add(greeter("greeter", "hello")).unwrap();
        registry.load("greeter").unwrap();
        registry.take_commands();

        registry.unload("greeter").unwrap();
        assert!(!registry.is_command_active("hello"));
        assert!(bus.is_empty());
        assert_eq!(guards.check_count("hello"), 0);
        assert_eq!(
            registry.unload("greeter").unwrap_err(),
            ExtensionError::NotLoaded("greeter".into())
        );

        registry.load("greeter").unwrap();
        assert!(registry.is_command_active("hello"));
        assert_eq!(bus.len(), 1);
        // Checks don't pile up across reloads.
        assert_eq!(guards.check_count("hello"), 1);
        assert!(registry.take_commands().is_empty());

        let dm = CheckContext::default();
        assert!(guards.run_checks("hello", &dm).is_err());
    }

    #[test]
    fn failed_setup_and_conflicts_are_reported() {
        let (registry, _, _) = registry();
        registry
            .add(Arc::new(Greeter {
                name: "broken",
                command: "oops",
                fail: true,
            }))
            .unwrap();
        registry.add(greeter("first", "hello")).unwrap();
        registry.add(greeter("second", "hello")).unwrap();

        let failures = registry.load_all();
        let failed: Vec<&str> = failures.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(failed, vec!["broken", "second"]);
        assert_eq!(
            registry.state("broken"),
            Some(ExtensionState::Failed("missing API key".into()))
        );
        assert!(matches!(
            failures[1].1,
            ExtensionError::CommandConflict { ref owner, .. } if owner == "first"
        ));

        let summaries = registry.summaries();
        assert_eq!(summaries[1].commands, vec!["hello", "hello loud"]);
        assert_eq!(summaries[1].description, "Says hello");
    }

    #[test]
    fn unload_keeps_guards_added_by_others() {
        let (registry, _, guards) = registry();
        guards.add_check("hello", Check::NotBot);
        let outside = vec![RateLimitPolicy::per_guild(3, Duration::from_secs(30))];
        guards.rate_limiter().set_policies("hello", outside.clone());

        registry.add(greeter("greeter", "hello")).unwrap();
        registry.load("greeter").unwrap();
        assert_eq!(guards.check_count("hello"), 2);
        assert_eq!(
            guards.rate_limiter().policies_for("hello"),
            vec![RateLimitPolicy::per_user(1, Duration::from_secs(10))]
        );

        registry.unload("greeter").unwrap();
        assert_eq!(guards.check_count("hello"), 1);
        assert_eq!(guards.rate_limiter().policies_for("hello"), outside);

        let bot = CheckContext {
            is_bot: true,
            ..Default::default()
        };
        assert!(guards.run_checks("hello", &bot).is_err());
    }

    #[test]
    fn removed_extensions_take_their_queued_commands_along() {
        let (registry, bus, guards) = registry();
        registry.add(greeter("greeter", "hello")).unwrap();
        registry.add(greeter("other", "bye")).unwrap();
        assert!(registry.load_all().is_empty());

        registry.remove("greeter").unwrap();
        assert_eq!(registry.state("greeter"), None);
        assert_eq!(bus.len(), 1);
        assert_eq!(guards.check_count("hello"), 0);
        assert_eq!(
            registry.remove("greeter").unwrap_err(),
            ExtensionError::NotFound("greeter".into())
        );

        let commands = registry.take_commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "bye");
    }

    #[test]
    fn unknown_extensions() {
        let (registry, _, _) = registry();
        assert_eq!(
            registry.load("ghost").unwrap_err(),
            ExtensionError::NotFound("ghost".into())
        );
        assert_eq!(registry.state("ghost"), None);
    }
}
