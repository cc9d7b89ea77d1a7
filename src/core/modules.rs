// src/core/modules.rs

//! The compiled-in catalog of shell modules and the manager that loads,
//! unloads and configures them at runtime.

use crate::core::NetShellError;
use crate::core::shell::{EchoEvaluator, Evaluator, JsonEvaluator};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Shell command names contributed by the built-in modules.
const BUILTIN_SHELLS: &[&str] = &["echo", "json"];

/// Returns true if `name` is the shell command of a built-in module.
pub fn is_known_shell(name: &str) -> bool {
    BUILTIN_SHELLS.contains(&name)
}

/// A module that contributes one interactive shell.
pub trait ShellModule: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// The command that enters this module's shell.
    fn shell_command(&self) -> &'static str;

    fn summary(&self) -> &'static str;

    fn evaluator(&self) -> Arc<dyn Evaluator>;

    /// Applies runtime options. Modules without options keep the default.
    fn configure(&self, _options: &str) -> Result<String, NetShellError> {
        Err(NetShellError::NotImplemented(format!(
            "module '{}' has no configuration",
            self.name()
        )))
    }
}

/// Module management as seen by the `*module` commands.
pub trait ModuleManager: Send + Sync + Debug {
    /// Loads a module; returns false if it was already loaded.
    fn load(&self, name: &str) -> Result<bool, NetShellError>;
    /// Unloads a module; returns false if it was not loaded.
    fn unload(&self, name: &str) -> Result<bool, NetShellError>;
    /// The names of all loaded modules, in load order.
    fn list(&self) -> Vec<String>;
    fn configure(&self, name: &str, options: &str) -> Result<String, NetShellError>;
}

#[derive(Debug)]
struct EchoShellModule;

impl ShellModule for EchoShellModule {
    fn name(&self) -> &'static str {
        "echo-shell"
    }
    fn shell_command(&self) -> &'static str {
        "echo"
    }
    fn summary(&self) -> &'static str {
        "Enter the echo shell"
    }
    fn evaluator(&self) -> Arc<dyn Evaluator> {
        Arc::new(EchoEvaluator)
    }
}

#[derive(Debug, Default)]
struct JsonShellModule {
    pretty: Arc<AtomicBool>,
}

impl ShellModule for JsonShellModule {
    fn name(&self) -> &'static str {
        "json-shell"
    }
    fn shell_command(&self) -> &'static str {
        "json"
    }
    fn summary(&self) -> &'static str {
        "Enter the JSON shell"
    }
    fn evaluator(&self) -> Arc<dyn Evaluator> {
        Arc::new(JsonEvaluator::with_flag(Arc::clone(&self.pretty)))
    }
    fn configure(&self, options: &str) -> Result<String, NetShellError> {
        match options.trim() {
            "pretty" => self.pretty.store(true, Ordering::Relaxed),
            "compact" => self.pretty.store(false, Ordering::Relaxed),
            other => {
                return Err(NetShellError::Evaluation(format!(
                    "json-shell: unknown option '{other}' (expected 'pretty' or 'compact')"
                )));
            }
        }
        Ok(format!("json-shell output is now {}", options.trim()))
    }
}

/// The default module manager over the built-in catalog.
#[derive(Debug)]
pub struct ModuleRegistry {
    catalog: IndexMap<&'static str, Arc<dyn ShellModule>>,
    loaded: RwLock<IndexSet<String>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// A registry knowing every built-in module, none of them loaded.
    pub fn new() -> Self {
        let modules: [Arc<dyn ShellModule>; 2] =
            [Arc::new(EchoShellModule), Arc::new(JsonShellModule::default())];
        let catalog = modules.into_iter().map(|m| (m.name(), m)).collect();
        Self {
            catalog,
            loaded: RwLock::new(IndexSet::new()),
        }
    }

    /// Every module in the catalog, loaded or not.
    pub fn catalog(&self) -> impl Iterator<Item = &Arc<dyn ShellModule>> {
        self.catalog.values()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.read().contains(name)
    }

    /// Finds the module behind a shell command, failing if it is not loaded.
    pub fn shell(&self, shell_command: &str) -> Result<Arc<dyn ShellModule>, NetShellError> {
        let module = self
            .catalog
            .values()
            .find(|m| m.shell_command() == shell_command)
            .ok_or_else(|| NetShellError::UnknownCommand(shell_command.to_string()))?;
        if !self.is_loaded(module.name()) {
            return Err(NetShellError::Evaluation(format!(
                "the '{}' shell is unavailable: module '{}' is not loaded (try: loadmodule {})",
                shell_command,
                module.name(),
                module.name()
            )));
        }
        Ok(Arc::clone(module))
    }

    fn lookup(&self, name: &str) -> Result<&Arc<dyn ShellModule>, NetShellError> {
        self.catalog
            .get(name)
            .ok_or_else(|| NetShellError::UnknownModule(name.to_string()))
    }
}

impl ModuleManager for ModuleRegistry {
    fn load(&self, name: &str) -> Result<bool, NetShellError> {
        let module = self.lookup(name)?;
        let inserted = self.loaded.write().insert(module.name().to_string());
        if inserted {
            info!("Loaded module '{}'.", name);
        }
        Ok(inserted)
    }

    fn unload(&self, name: &str) -> Result<bool, NetShellError> {
        self.lookup(name)?;
        let removed = self.loaded.write().shift_remove(name);
        if removed {
            info!("Unloaded module '{}'.", name);
        }
        Ok(removed)
    }

    fn list(&self) -> Vec<String> {
        self.loaded.read().iter().cloned().collect()
    }

    fn configure(&self, name: &str, options: &str) -> Result<String, NetShellError> {
        let module = self.lookup(name)?;
        if !self.is_loaded(name) {
            return Err(NetShellError::Evaluation(format!(
                "module '{name}' is not loaded"
            )));
        }
        module.configure(options)
    }
}
