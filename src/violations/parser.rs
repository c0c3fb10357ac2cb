use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Prefix of the warning the API server emits once per namespace whose
/// existing pods would fail the requested enforce level.
pub const NAMESPACE_WARNING_PREFIX: &str = "existing pods in namespace";

const NAMESPACE_WARNING_QUOTED_SEGMENTS: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WarningParseError {
    #[error("namespace warning has {found} quoted segments, expected {expected}")]
    MalformedNamespaceWarning { expected: usize, found: usize },

    #[error("pod warning is not of the form \"<pod>: <violation>, ...\"")]
    MalformedPodWarning,

    /// A pod warning arrived before any namespace warning opened a context
    /// for it.
    #[error("pod warning for {pod:?} arrived before any namespace warning")]
    OutOfOrderWarning { pod: String },
}

/// A single warning text, classified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WarningMessage {
    /// `existing pods in namespace "<namespace>" violate the new PodSecurity
    /// enforce level "<level>"`
    Namespace { namespace: String, level: String },
    /// `<pod>: <violation>, <violation>, ...`
    Pod {
        name: String,
        violations: Vec<String>,
    },
}

/// `<pod> (and <n> other pods)`, used when the API server folds pods with
/// identical violations into one warning.
fn aggregated_pods() -> &'static Regex {
    static AGGREGATED: OnceLock<Regex> = OnceLock::new();
    AGGREGATED.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?) \(and \d+ other pods?\)$").expect("static regex is valid")
    })
}

fn quoted_segment() -> &'static Regex {
    static QUOTED: OnceLock<Regex> = OnceLock::new();
    QUOTED.get_or_init(|| Regex::new(r#""(?P<value>[^"]*)""#).expect("static regex is valid"))
}

impl WarningMessage {
    pub fn parse(text: &str) -> Result<Self, WarningParseError> {
        if text.starts_with(NAMESPACE_WARNING_PREFIX) {
            Self::parse_namespace(text)
        } else {
            Self::parse_pod(text)
        }
    }

    fn parse_namespace(text: &str) -> Result<Self, WarningParseError> {
        let segments: Vec<&str> = quoted_segment()
            .captures_iter(text)
            .filter_map(|captures| captures.name("value"))
            .map(|value| value.as_str())
            .collect();

        match segments.as_slice() {
            [namespace, level] => Ok(WarningMessage::Namespace {
                namespace: namespace.to_string(),
                level: level.to_string(),
            }),
            _ => Err(WarningParseError::MalformedNamespaceWarning {
                expected: NAMESPACE_WARNING_QUOTED_SEGMENTS,
                found: segments.len(),
            }),
        }
    }

    fn parse_pod(text: &str) -> Result<Self, WarningParseError> {
        let (name, violations) = text
            .split_once(": ")
            .ok_or(WarningParseError::MalformedPodWarning)?;
        let name = name.trim();
        let name = aggregated_pods()
            .captures(name)
            .and_then(|captures| captures.name("name"))
            .map_or(name, |first| first.as_str());
        if name.is_empty() {
            return Err(WarningParseError::MalformedPodWarning);
        }

        Ok(WarningMessage::Pod {
            name: name.to_string(),
            violations: violations.split(", ").map(str::to_string).collect(),
        })
    }
}
