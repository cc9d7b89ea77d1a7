// src/core/commands/registry.rs

//! The name -> descriptor table every session resolves its command words against.

use crate::core::NetShellError;
use crate::core::shell::ShellProfile;
use crate::core::state::ServerState;
use async_trait::async_trait;
use bitflags::bitflags;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Flags that describe how a command is listed and how it affects its session.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct CommandFlags: u32 {
        /// The command enters an interactive shell.
        const SHELL          = 1 << 0;
        /// The command is left out of the `help` menu.
        const HIDDEN         = 1 << 1;
        /// The session is closed once the command finishes.
        const CLOSE_SESSION  = 1 << 2;
    }
}

/// What the session should do after a request finishes.
#[derive(Debug, Clone)]
pub enum SessionAction {
    Continue,
    Close,
    EnterShell(ShellProfile),
}

/// The result of one executed request.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub output: String,
    pub action: SessionAction,
}

impl RequestOutcome {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            action: SessionAction::Continue,
        }
    }

    pub fn close(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            action: SessionAction::Close,
        }
    }

    pub fn enter_shell(output: impl Into<String>, profile: ShellProfile) -> Self {
        Self {
            output: output.into(),
            action: SessionAction::EnterShell(profile),
        }
    }
}

/// Everything a request may touch while it runs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub state: Arc<ServerState>,
    pub session_id: u64,
}

impl RequestContext {
    pub fn new(state: Arc<ServerState>, session_id: u64) -> Self {
        Self { state, session_id }
    }
}

/// One executable instance of a command. A fresh instance is made for every dispatch.
#[async_trait]
pub trait Request: Send {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError>;
}

pub type RequestFactory = Arc<dyn Fn() -> Box<dyn Request> + Send + Sync>;

/// Wraps a closure as a `RequestFactory`.
pub fn factory<F, R>(make: F) -> RequestFactory
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Request + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn Request>)
}

/// A registered command.
pub struct CommandDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub summary: String,
    pub help: String,
    pub flags: CommandFlags,
    factory: RequestFactory,
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(CommandFlags::HIDDEN)
    }

    pub fn is_shell_command(&self) -> bool {
        self.flags.contains(CommandFlags::SHELL)
    }

    pub fn keeps_session_open(&self) -> bool {
        !self.flags.contains(CommandFlags::CLOSE_SESSION)
    }

    /// Creates a fresh request and runs it.
    pub async fn dispatch(
        &self,
        args: &str,
        ctx: &RequestContext,
    ) -> Result<RequestOutcome, NetShellError> {
        let mut request = (self.factory)();
        let mut outcome = request.execute(ctx, args).await?;
        if !self.keeps_session_open() {
            outcome.action = SessionAction::Close;
        }
        Ok(outcome)
    }
}

/// The process-wide command table. Registration happens while the server
/// starts; afterwards the table is only read.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, Arc<CommandDescriptor>>,
    aliases: HashMap<String, String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command under `name` and each of its `aliases`.
    pub fn register(
        &mut self,
        name: &str,
        aliases: &[&str],
        summary: &str,
        help: &str,
        flags: CommandFlags,
        factory: RequestFactory,
    ) -> Result<(), NetShellError> {
        for word in std::iter::once(&name).chain(aliases) {
            if self.resolve(word).is_some() {
                return Err(NetShellError::Internal(format!(
                    "command '{word}' is already registered"
                )));
            }
        }
        let descriptor = CommandDescriptor {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            summary: summary.to_string(),
            help: help.to_string(),
            flags,
            factory,
        };
        for alias in aliases {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
        self.commands.insert(name.to_string(), Arc::new(descriptor));
        Ok(())
    }

    /// Looks a word up by primary name, then by alias.
    pub fn resolve(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        if let Some(descriptor) = self.commands.get(name) {
            return Some(Arc::clone(descriptor));
        }
        self.aliases
            .get(name)
            .and_then(|primary| self.commands.get(primary))
            .map(Arc::clone)
    }

    pub async fn dispatch(
        &self,
        name: &str,
        args: &str,
        ctx: &RequestContext,
    ) -> Result<RequestOutcome, NetShellError> {
        let descriptor = self
            .resolve(name)
            .ok_or_else(|| NetShellError::UnknownCommand(name.to_string()))?;
        descriptor.dispatch(args, ctx).await
    }

    /// Every non-hidden command, in registration order.
    pub fn visible(&self) -> impl Iterator<Item = &Arc<CommandDescriptor>> {
        self.commands.values().filter(|d| !d.is_hidden())
    }

    /// The one-line-per-command menu printed by a bare `help`.
    pub fn menu(&self) -> String {
        let width = self.visible().map(|d| d.name.len()).max().unwrap_or(0) + 1;
        let mut out = String::from("Available commands:\n");
        for descriptor in self.visible() {
            let label = format!("{}:", descriptor.name);
            out.push_str(&format!("  {label:<width$} {}\n", descriptor.summary));
        }
        out
    }

    /// The verbose help for one command, reachable through any of its names.
    pub fn help_text(&self, name: &str) -> Result<String, NetShellError> {
        self.resolve(name)
            .map(|d| d.help.clone())
            .ok_or_else(|| NetShellError::UnknownCommand(name.to_string()))
    }
}
