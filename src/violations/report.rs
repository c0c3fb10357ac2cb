use tracing::{event, Level};

use super::tree::NamespaceViolation;

/// Renders `violations` as a JSON array followed by a newline.
///
/// Nothing to report renders as the empty string rather than `[]`, and a
/// serialization failure is logged and also renders as the empty string.
pub fn render_report(violations: &[NamespaceViolation]) -> String {
    if violations.is_empty() {
        return String::new();
    }

    match serde_json::to_string(violations) {
        Ok(mut json) => {
            json.push('\n');
            json
        }
        Err(err) => {
            event!(Level::ERROR, err = %err, "Failed to serialize violation report.");
            String::new()
        }
    }
}
