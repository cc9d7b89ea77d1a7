// src/core/shell/mod.rs

//! Shells: the evaluator backends and the per-session dispatcher that
//! serializes lines into them.

pub mod dispatcher;
pub mod evaluator;

pub use dispatcher::{Completion, Prompts, Route, ShellDispatcher, ShellProfile};
pub use evaluator::{EchoEvaluator, Evaluator, JsonEvaluator};
