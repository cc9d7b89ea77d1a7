// src/core/commands/builtin.rs

//! The session-control commands every server has: `exit`, `quit`, `help`,
//! `loglevel` and `shutdown`.

use super::registry::{Request, RequestContext, RequestOutcome};
use crate::core::NetShellError;
use async_trait::async_trait;
use tracing::{error, info};
use tracing_subscriber::filter::EnvFilter;

pub const EXIT_SUMMARY: &str = "Close the shell connection";
pub const EXIT_HELP: &str = "Usage: exit\n\nClose the shell TCP/IP connection.\n";
pub const QUIT_HELP: &str = "Usage: quit\n\nClose the shell TCP/IP connection.\n";

pub const HELP_SUMMARY: &str = "List the available commands; print help for a specific command";
pub const HELP_HELP: &str = "Usage: help [<command>]\n\n\
If no command is specified, then print a menu of commands.\n\
Otherwise, print verbose help for the indicated command.\n";

pub const LOGLEVEL_SUMMARY: &str = "Show or change the server log filter";
pub const LOGLEVEL_HELP: &str = "Usage: loglevel [<filter>]\n\n\
Without an argument, print the active log filter. Otherwise replace it with\n\
the given filter directive, e.g. `debug` or `info,netshell::connection=trace`.\n";

pub const SHUTDOWN_SUMMARY: &str = "Shut down the server";
pub const SHUTDOWN_HELP: &str = "Usage: shutdown\n\n\
Close every connection and stop the server process.\n";

/// Backs `exit`, `quit` and their aliases. The registry closes the session
/// afterwards because these commands are registered with `CLOSE_SESSION`.
#[derive(Debug, Default)]
pub struct ExitRequest;

#[async_trait]
impl Request for ExitRequest {
    async fn execute(
        &mut self,
        _ctx: &RequestContext,
        _args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        Ok(RequestOutcome::close(""))
    }
}

#[derive(Debug, Default)]
pub struct HelpRequest;

#[async_trait]
impl Request for HelpRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let commands = &ctx.state.commands;
        match args.split_whitespace().next() {
            None => Ok(RequestOutcome::text(commands.menu())),
            Some(name) => Ok(RequestOutcome::text(commands.help_text(name)?)),
        }
    }
}

#[derive(Debug, Default)]
pub struct LogLevelRequest;

#[async_trait]
impl Request for LogLevelRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let Some(handle) = &ctx.state.log_reload_handle else {
            return Err(NetShellError::NotImplemented(
                "log filter reloading is not available in this process".to_string(),
            ));
        };
        let directive = args.trim();
        if directive.is_empty() {
            let current = handle
                .with_current(|filter| filter.to_string())
                .map_err(|e| NetShellError::Internal(format!("Failed to read log filter: {e}")))?;
            return Ok(RequestOutcome::text(format!("{current}\n")));
        }

        let filter = EnvFilter::try_new(directive)
            .map_err(|e| NetShellError::Evaluation(format!("Invalid log filter directive: {e}")))?;
        if let Err(e) = handle.reload(filter) {
            let msg = format!("Failed to reload log level: {e}");
            error!("{msg}");
            return Err(NetShellError::Internal(msg));
        }
        info!(
            "Log level changed to '{}' by session {}",
            directive, ctx.session_id
        );
        Ok(RequestOutcome::text(format!("Log filter set to '{directive}'.\n")))
    }
}

#[derive(Debug, Default)]
pub struct ShutdownRequest;

#[async_trait]
impl Request for ShutdownRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        _args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        info!(
            "Shutdown requested by session {}; signaling all tasks.",
            ctx.session_id
        );
        // The handler queues this reply in the same select arm that sees this
        // future finish, so it is written before that handler's next poll
        // picks up the shutdown signal.
        let outcome = RequestOutcome::text("Shutting down the server.\n");
        let _ = ctx.state.shutdown_tx.send(());
        Ok(outcome)
    }
}
