// src/core/shell/evaluator.rs

//! The backends a shell hands its lines to.

use crate::core::NetShellError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Turns one input line into output text.
///
/// An `Err` is reported to the client as text and switches the prompt to the
/// abort prompt; the session itself stays open.
#[async_trait]
pub trait Evaluator: Send + Sync + Debug {
    async fn evaluate(&self, line: &str) -> Result<String, NetShellError>;
}

/// Echoes every line back unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoEvaluator;

#[async_trait]
impl Evaluator for EchoEvaluator {
    async fn evaluate(&self, line: &str) -> Result<String, NetShellError> {
        Ok(format!("{line}\n"))
    }
}

/// Parses each line as a JSON document and writes it back re-serialized.
#[derive(Debug, Clone, Default)]
pub struct JsonEvaluator {
    pretty: Arc<AtomicBool>,
}

impl JsonEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An evaluator whose pretty-printing flag is shared with `flag`.
    pub fn with_flag(flag: Arc<AtomicBool>) -> Self {
        Self { pretty: flag }
    }

    pub fn set_pretty(&self, pretty: bool) {
        self.pretty.store(pretty, Ordering::Relaxed);
    }
}

#[async_trait]
impl Evaluator for JsonEvaluator {
    async fn evaluate(&self, line: &str) -> Result<String, NetShellError> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let mut out = if self.pretty.load(Ordering::Relaxed) {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        out.push('\n');
        Ok(out)
    }
}
