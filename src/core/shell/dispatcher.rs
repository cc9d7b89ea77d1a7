// src/core/shell/dispatcher.rs

//! Per-session prompt and input-queue state.
//!
//! The dispatcher never runs anything itself. The connection handler feeds it
//! received lines and completion notices, and it answers with the next line to
//! start, which keeps at most one evaluation in flight per session.

use super::evaluator::Evaluator;
use crate::core::commands::{CommandDescriptor, CommandRegistry};
use crate::core::state::ConnectionRow;
use std::collections::VecDeque;
use std::sync::Arc;

/// The prompt strings of one shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub normal: String,
    /// Shown after a line failed.
    pub abort: String,
    /// Shown while more input is already waiting.
    pub pending: String,
}

impl Prompts {
    pub fn for_shell(name: &str) -> Self {
        Self {
            normal: format!("{name}> "),
            abort: format!("{name}! "),
            pending: "... ".to_string(),
        }
    }
}

/// Which shell a session is running: its name, prompts and evaluator.
#[derive(Debug, Clone)]
pub struct ShellProfile {
    pub name: String,
    pub prompts: Prompts,
    pub show_prompt: bool,
    /// `None` for the command-only console.
    pub evaluator: Option<Arc<dyn Evaluator>>,
}

impl ShellProfile {
    pub fn new(name: impl Into<String>, prompts: Prompts, show_prompt: bool) -> Self {
        Self {
            name: name.into(),
            prompts,
            show_prompt,
            evaluator: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }
}

/// How the previous line ended, which decides the next prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Ok,
    Failed,
    /// The session is closing; nothing further is dispatched.
    Closing,
}

/// Where one line goes.
#[derive(Debug, Clone)]
pub enum Route {
    /// A blank line; only the prompt is written back.
    Empty,
    Command {
        descriptor: Arc<CommandDescriptor>,
        args: String,
    },
    Evaluate {
        evaluator: Arc<dyn Evaluator>,
        line: String,
    },
    Unknown(String),
}

#[derive(Debug)]
pub struct ShellDispatcher {
    profile: ShellProfile,
    queue: VecDeque<String>,
    capacity: usize,
    running: bool,
    row: Arc<ConnectionRow>,
}

impl ShellDispatcher {
    pub fn new(profile: ShellProfile, capacity: usize, row: Arc<ConnectionRow>) -> Self {
        row.set_shell_name(&profile.name);
        Self {
            profile,
            queue: VecDeque::new(),
            capacity: capacity.max(1),
            running: false,
            row,
        }
    }

    pub fn profile(&self) -> &ShellProfile {
        &self.profile
    }

    /// Switches to another shell. The session's show-prompt setting is kept.
    pub fn enter_shell(&mut self, mut profile: ShellProfile) {
        profile.show_prompt = self.profile.show_prompt;
        self.row.set_shell_name(&profile.name);
        self.profile = profile;
    }

    /// Replaces the profile outright, prompt visibility included.
    pub fn set_profile(&mut self, profile: ShellProfile) {
        self.row.set_shell_name(&profile.name);
        self.profile = profile;
    }

    /// The prompt to write when the session starts, if prompts are shown.
    pub fn initial_prompt(&self) -> Option<&str> {
        self.profile
            .show_prompt
            .then_some(self.profile.prompts.normal.as_str())
    }

    /// Queues a received line. Returns the line to start now, if nothing is running.
    pub fn on_line(&mut self, line: String) -> Option<String> {
        self.queue.push_back(line);
        let next = if self.running { None } else { self.start_next() };
        self.sync_row();
        next
    }

    /// Records that the running line finished. Returns the text to write back
    /// (output plus prompt) and the next line to start, if one is queued.
    pub fn on_eval_complete(&mut self, output: &str, completion: Completion) -> (String, Option<String>) {
        self.running = false;
        let mut text = output.to_string();

        if completion == Completion::Closing {
            self.queue.clear();
            self.sync_row();
            return (text, None);
        }

        let next = self.start_next();
        if self.profile.show_prompt {
            let prompts = &self.profile.prompts;
            let prompt = match completion {
                Completion::Failed => &prompts.abort,
                _ if next.is_some() => &prompts.pending,
                _ => &prompts.normal,
            };
            text.push_str(prompt);
        }
        self.sync_row();
        (text, next)
    }

    /// True once the queue is full; the caller should stop reading until it drains.
    pub fn is_saturated(&self) -> bool {
        self.queue.len() >= self.capacity
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Decides whether a line names a command or goes to the evaluator.
    pub fn route(&self, line: &str, commands: &CommandRegistry) -> Route {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Route::Empty;
        }
        let (word, args) = match trimmed.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (trimmed, ""),
        };

        if let Some(descriptor) = commands.resolve(word) {
            return Route::Command {
                descriptor,
                args: args.to_string(),
            };
        }
        match &self.profile.evaluator {
            Some(evaluator) => Route::Evaluate {
                evaluator: Arc::clone(evaluator),
                line: line.to_string(),
            },
            None => Route::Unknown(word.to_string()),
        }
    }

    fn start_next(&mut self) -> Option<String> {
        let line = self.queue.pop_front()?;
        self.running = true;
        Some(line)
    }

    fn sync_row(&self) {
        self.row.set_queue_size(self.queue.len());
        self.row.set_eval_running(self.running);
    }
}
