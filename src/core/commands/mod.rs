// src/core/commands/mod.rs

//! This module defines the built-in commands and assembles them into the
//! server's `CommandRegistry`.

pub mod builtin;
pub mod modules;
pub mod registry;
pub mod stats;

pub use registry::{
    CommandDescriptor, CommandFlags, CommandRegistry, Request, RequestContext, RequestFactory,
    RequestOutcome, SessionAction, factory,
};

use crate::core::NetShellError;
use crate::core::modules::ModuleRegistry;
use crate::core::protocol::EOF_MARKER;
use builtin::{ExitRequest, HelpRequest, LogLevelRequest, ShutdownRequest};
use modules::{
    ConfigModuleRequest, EnterShellRequest, ListModulesRequest, LoadModuleRequest,
    UnloadModuleRequest,
};
use stats::StatsRequest;

/// Builds the registry holding every built-in command plus one shell command
/// per module in the catalog.
pub fn builtin_registry(catalog: &ModuleRegistry) -> Result<CommandRegistry, NetShellError> {
    let mut reg = CommandRegistry::new();

    reg.register(
        "exit",
        &["q", ".", EOF_MARKER],
        builtin::EXIT_SUMMARY,
        builtin::EXIT_HELP,
        CommandFlags::HIDDEN | CommandFlags::CLOSE_SESSION,
        factory(|| ExitRequest),
    )?;
    reg.register(
        "quit",
        &[],
        builtin::EXIT_SUMMARY,
        builtin::QUIT_HELP,
        CommandFlags::CLOSE_SESSION,
        factory(|| ExitRequest),
    )?;
    reg.register(
        "help",
        &["h"],
        builtin::HELP_SUMMARY,
        builtin::HELP_HELP,
        CommandFlags::empty(),
        factory(|| HelpRequest),
    )?;
    reg.register(
        "stats",
        &[],
        stats::STATS_SUMMARY,
        stats::STATS_LEGEND,
        CommandFlags::empty(),
        factory(|| StatsRequest),
    )?;
    reg.register(
        "configmodule",
        &[],
        "Configure a loaded module",
        modules::CONFIGMODULE_HELP,
        CommandFlags::empty(),
        factory(|| ConfigModuleRequest),
    )?;
    reg.register(
        "listmodules",
        &[],
        "List the loaded modules",
        modules::LISTMODULES_HELP,
        CommandFlags::empty(),
        factory(|| ListModulesRequest),
    )?;
    reg.register(
        "loadmodule",
        &[],
        "Load a module",
        modules::LOADMODULE_HELP,
        CommandFlags::empty(),
        factory(|| LoadModuleRequest),
    )?;
    reg.register(
        "unloadmodule",
        &[],
        "Unload a module",
        modules::UNLOADMODULE_HELP,
        CommandFlags::empty(),
        factory(|| UnloadModuleRequest),
    )?;
    reg.register(
        "loglevel",
        &[],
        builtin::LOGLEVEL_SUMMARY,
        builtin::LOGLEVEL_HELP,
        CommandFlags::empty(),
        factory(|| LogLevelRequest),
    )?;
    reg.register(
        "shutdown",
        &[],
        builtin::SHUTDOWN_SUMMARY,
        builtin::SHUTDOWN_HELP,
        CommandFlags::empty(),
        factory(|| ShutdownRequest),
    )?;

    for module in catalog.catalog() {
        let shell = module.shell_command();
        let help = format!(
            "Usage: {shell}\n\n{}. Every following line is evaluated by the {} module.\n",
            module.summary(),
            module.name()
        );
        reg.register(
            shell,
            &[],
            module.summary(),
            &help,
            CommandFlags::SHELL,
            factory(move || EnterShellRequest { shell }),
        )?;
    }

    Ok(reg)
}
