use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{event, Level};

use super::parser::WarningMessage;
use super::tree::{NamespaceViolation, ViolationTree};
use crate::warning::WarningHandler;

/// A [`WarningHandler`] that turns Pod Security warnings into a
/// [`ViolationTree`], optionally passing each warning on to an inner handler.
///
/// Warnings with empty text are ignored entirely and never reach the inner
/// handler.
/// Warnings that cannot be parsed, or pod warnings that arrive before any
/// namespace warning, are logged and skipped so one bad message does not
/// lose the rest of the report.
#[derive(Default)]
pub struct WarningAggregator {
    tree: Mutex<ViolationTree>,
    inner: Option<Arc<dyn WarningHandler>>,
}

impl WarningAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps `inner`, which then sees every warning this aggregator does.
    pub fn with_inner(inner: Arc<dyn WarningHandler>) -> Self {
        Self {
            tree: Mutex::default(),
            inner: Some(inner),
        }
    }

    /// Returns the violations collected so far and starts a fresh tree.
    pub fn take_violations(&self) -> Vec<NamespaceViolation> {
        std::mem::take(&mut *self.tree()).into_violations()
    }

    pub fn is_empty(&self) -> bool {
        self.tree().is_empty()
    }

    fn tree(&self) -> MutexGuard<'_, ViolationTree> {
        // Every mutation is a single push, so a poisoned tree is still whole.
        self.tree.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, text: &str) {
        let result = WarningMessage::parse(text).and_then(|message| self.tree().record(message));
        if let Err(err) = result {
            event!(
                Level::WARN,
                err = %err,
                warning = text,
                "Skipping unrecognized PodSecurity warning."
            );
        }
    }
}

impl WarningHandler for WarningAggregator {
    fn handle_warning_header(&self, code: u16, agent: &str, text: &str) {
        if text.is_empty() {
            return;
        }
        self.record(text);

        if let Some(inner) = &self.inner {
            inner.handle_warning_header(code, agent, text);
        }
    }
}
