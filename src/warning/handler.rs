use std::sync::Arc;

use tracing::{event, Level};

/// Receives every warning the API server attaches to a response.
///
/// Handlers are called synchronously from the client's response path, in the
/// order the warnings appear on the response. Implementations must not block
/// and have no way to fail the request that produced the warning.
pub trait WarningHandler: Send + Sync {
    fn handle_warning_header(&self, code: u16, agent: &str, text: &str);
}

impl<H: WarningHandler + ?Sized> WarningHandler for Arc<H> {
    fn handle_warning_header(&self, code: u16, agent: &str, text: &str) {
        (**self).handle_warning_header(code, agent, text)
    }
}

impl<H: WarningHandler + ?Sized> WarningHandler for Box<H> {
    fn handle_warning_header(&self, code: u16, agent: &str, text: &str) {
        (**self).handle_warning_header(code, agent, text)
    }
}

/// Logs `299` warnings with non-empty text as `WARN` events and drops the
/// rest.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogWarnings;

impl WarningHandler for LogWarnings {
    fn handle_warning_header(&self, code: u16, agent: &str, text: &str) {
        if code != 299 || text.is_empty() {
            return;
        }
        event!(Level::WARN, code, agent, "{}", text);
    }
}

/// Discards all warnings.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoWarnings;

impl WarningHandler for NoWarnings {
    fn handle_warning_header(&self, _code: u16, _agent: &str, _text: &str) {}
}
