// src/core/commands/modules.rs

//! Module lifecycle commands and the per-module shell entry commands.

use super::registry::{Request, RequestContext, RequestOutcome};
use crate::core::NetShellError;
use crate::core::modules::ModuleManager;
use async_trait::async_trait;

pub const LOADMODULE_HELP: &str = "Usage: loadmodule <module>\n\n\
Load the named module from the built-in catalog and make its shell available.\n";
pub const UNLOADMODULE_HELP: &str = "Usage: unloadmodule <module>\n\n\
Unload the named module. Sessions already inside its shell keep running.\n";
pub const LISTMODULES_HELP: &str = "Usage: listmodules\n\n\
List the currently loaded modules, in load order.\n";
pub const CONFIGMODULE_HELP: &str = "Usage: configmodule <module> <options>\n\n\
Pass an option string to a loaded module.\n\
json-shell accepts 'pretty' and 'compact'.\n";

fn module_name<'a>(args: &'a str, command: &str) -> Result<&'a str, NetShellError> {
    args.split_whitespace()
        .next()
        .ok_or_else(|| NetShellError::WrongArgumentCount(command.to_string()))
}

#[derive(Debug, Default)]
pub struct LoadModuleRequest;

#[async_trait]
impl Request for LoadModuleRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let name = module_name(args, "loadmodule")?;
        let text = if ctx.state.modules.load(name)? {
            format!("Loaded module '{name}'.\n")
        } else {
            format!("Module '{name}' is already loaded.\n")
        };
        Ok(RequestOutcome::text(text))
    }
}

#[derive(Debug, Default)]
pub struct UnloadModuleRequest;

#[async_trait]
impl Request for UnloadModuleRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let name = module_name(args, "unloadmodule")?;
        let text = if ctx.state.modules.unload(name)? {
            format!("Unloaded module '{name}'.\n")
        } else {
            format!("Module '{name}' is not loaded.\n")
        };
        Ok(RequestOutcome::text(text))
    }
}

#[derive(Debug, Default)]
pub struct ListModulesRequest;

#[async_trait]
impl Request for ListModulesRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        _args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let loaded = ctx.state.modules.list();
        if loaded.is_empty() {
            return Ok(RequestOutcome::text("No modules loaded.\n"));
        }
        let mut out = String::new();
        for name in loaded {
            out.push_str(&name);
            out.push('\n');
        }
        Ok(RequestOutcome::text(out))
    }
}

#[derive(Debug, Default)]
pub struct ConfigModuleRequest;

#[async_trait]
impl Request for ConfigModuleRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let (name, options) = match args.split_once(char::is_whitespace) {
            Some((name, options)) => (name, options.trim()),
            None => (args, ""),
        };
        if name.is_empty() || options.is_empty() {
            return Err(NetShellError::WrongArgumentCount("configmodule".into()));
        }
        let mut text = ctx.state.modules.configure(name, options)?;
        text.push('\n');
        Ok(RequestOutcome::text(text))
    }
}

/// Switches the session into one module's shell.
#[derive(Debug)]
pub struct EnterShellRequest {
    pub shell: &'static str,
}

#[async_trait]
impl Request for EnterShellRequest {
    async fn execute(
        &mut self,
        ctx: &RequestContext,
        _args: &str,
    ) -> Result<RequestOutcome, NetShellError> {
        let profile = ctx.state.shell_profile(self.shell)?;
        Ok(RequestOutcome::enter_shell(
            format!("Entering the {} shell.\n", self.shell),
            profile,
        ))
    }
}
