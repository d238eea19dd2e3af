//! Slash commands.
//!
//! A message body starting with `/` is a command: the first token up to
//! whitespace is the name, the rest is split on whitespace into arguments.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};

use crate::error::CoreError;
use crate::hub::Services;
use crate::types::{ConnectionId, Identity};

/// Context handed to a running command.
pub struct CommandContext<'a> {
    pub services: &'a Services,
    /// Connection that sent the command
    pub connection: ConnectionId,
    pub identity: &'a Identity,
    /// Room the carrying message was addressed to
    pub room_name: Option<&'a str>,
}

impl CommandContext<'_> {
    /// Private notification back to the sender, scoped to the command's room.
    pub fn reply(&self, message: &str) {
        self.services
            .emitter
            .notify(self.connection, message, self.room_name);
    }
}

/// A chat command invoked as `/name arg1 arg2 ...`.
#[async_trait]
pub trait ChatCommand: Send + Sync + 'static {
    async fn run(&self, ctx: &CommandContext<'_>, args: &[String]) -> Result<(), CoreError>;
}

/// Split a message body into a command name and its arguments.
///
/// Returns `None` when the body is not a command. `"/"` alone yields an
/// empty name, which never matches a registered command.
pub fn parse_command(body: &str) -> Option<(&str, Vec<String>)> {
    let rest = body.strip_prefix('/')?;
    let name = rest.split(char::is_whitespace).next().unwrap_or_default();
    let args = rest[name.len()..]
        .split_whitespace()
        .map(str::to_string)
        .collect();
    Some((name, args))
}

/// Command-name to command table, iterated in name order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn ChatCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with the built-in `/listCommands`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .commands
            .insert(ListCommands::NAME.to_string(), Arc::new(ListCommands));
        registry
    }

    /// Add a command.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        command: Arc<dyn ChatCommand>,
    ) -> Result<(), CoreError> {
        let name = name.into();
        if self.commands.contains_key(&name) {
            return Err(CoreError::DuplicateCommandRegistration(name));
        }
        info!(command = %name, "Registered chat command");
        self.commands.insert(name, command);
        Ok(())
    }

    /// Look up a command by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn ChatCommand>, CoreError> {
        self.commands
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::UnknownCommand(name.to_string()))
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run the command named in `name`.
    ///
    /// An unknown name is answered with a private notification listing the
    /// valid command names and is not an error to the caller.
    #[instrument(skip(self, ctx, args), fields(conn = %ctx.connection))]
    pub async fn execute(
        &self,
        ctx: &CommandContext<'_>,
        name: &str,
        args: &[String],
    ) -> Result<(), CoreError> {
        match self.get(name) {
            Ok(command) => {
                debug!(identity = %ctx.identity, args = args.len(), "Running command");
                command.run(ctx, args).await
            }
            Err(CoreError::UnknownCommand(unknown)) => {
                debug!(command = %unknown, "Unknown command");
                ctx.reply(&format!(
                    "Not a valid command. Valid commands are: {}.",
                    self.names().join(", ")
                ));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

/// `/listCommands`: reply with the registered command names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListCommands;

impl ListCommands {
    pub const NAME: &'static str = "listCommands";
}

#[async_trait]
impl ChatCommand for ListCommands {
    async fn run(&self, ctx: &CommandContext<'_>, _args: &[String]) -> Result<(), CoreError> {
        ctx.reply(&format!(
            "Available commands: {}.",
            ctx.services.commands.names().join(", ")
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;

    #[async_trait]
    impl ChatCommand for Noop {
        async fn run(&self, _ctx: &CommandContext<'_>, _args: &[String]) -> Result<(), CoreError> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_command_with_arguments() {
        let (name, args) = parse_command("/kick  bob   now ").unwrap();
        assert_eq!(name, "kick");
        assert_eq!(args, vec!["bob", "now"]);
    }

    #[test]
    fn test_parse_command_edge_cases() {
        assert_eq!(parse_command("hello /kick"), None);
        assert_eq!(parse_command("/"), Some(("", vec![])));
        assert_eq!(parse_command("/ kick"), Some(("", vec!["kick".to_string()])));
        assert_eq!(parse_command("/listCommands"), Some(("listCommands", vec![])));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = CommandRegistry::with_builtins();
        registry.register("me", Arc::new(Noop)).unwrap();

        let err = registry.register("me", Arc::new(Noop)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateCommandRegistration(ref n) if n == "me"));
        assert!(registry.register(ListCommands::NAME, Arc::new(Noop)).is_err());
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = CommandRegistry::with_builtins();
        registry.register("zap", Arc::new(Noop)).unwrap();
        registry.register("away", Arc::new(Noop)).unwrap();
        assert_eq!(registry.names(), vec!["away", "listCommands", "zap"]);
    }

    #[test]
    fn test_get_unknown() {
        let registry = CommandRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(registry.get("nope"), Err(CoreError::UnknownCommand(ref n)) if n == "nope"));
    }
}
