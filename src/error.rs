use thiserror::Error;

/// Errors surfaced by the executor.
///
/// Every variant renders as a single `<kind>: <message>` line; the kind
/// prefixes are stable and reused verbatim in result envelopes and MCP error
/// payloads.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("not_found: no element matched '{identifier}' (strategies tried: {tried})")]
    NotFound { identifier: String, tried: String },

    #[error("timeout: {what} not satisfied within {elapsed_ms}ms")]
    Timeout { what: String, elapsed_ms: u64 },

    #[error("transport: {0}")]
    Transport(String),

    #[error("accessibility_enable: {0}")]
    AccessibilityEnable(String),

    #[error("ax_tree_fetch: {0}")]
    AxTreeFetch(String),

    #[error("precondition: {0}")]
    Precondition(String),

    #[error("unknown_op: {0}")]
    UnknownOp(String),

    #[error("invalid_argument: {0}")]
    InvalidArgument(String),
}

impl ExecutorError {
    /// Stable surface name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorError::NotFound { .. } => "not_found",
            ExecutorError::Timeout { .. } => "timeout",
            ExecutorError::Transport(_) => "transport",
            ExecutorError::AccessibilityEnable(_) => "accessibility_enable",
            ExecutorError::AxTreeFetch(_) => "ax_tree_fetch",
            ExecutorError::Precondition(_) => "precondition",
            ExecutorError::UnknownOp(_) => "unknown_op",
            ExecutorError::InvalidArgument(_) => "invalid_argument",
        }
    }

    pub fn not_found(identifier: &str, tried: &[&str]) -> Self {
        ExecutorError::NotFound {
            identifier: identifier.to_string(),
            tried: tried.join(", "),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_strings_are_single_kind_prefixed_lines() {
        let err = ExecutorError::not_found("#login", &["css", "semantic"]);
        let s = err.to_string();
        assert!(s.starts_with("not_found: "));
        assert!(s.contains("#login"));
        assert!(s.contains("css, semantic"));
        assert!(!s.contains('\n'));

        let err = ExecutorError::Timeout {
            what: "element '#a' to become visible".into(),
            elapsed_ms: 30000,
        };
        assert!(err.to_string().starts_with("timeout: "));
        assert!(err.to_string().contains("30000ms"));
    }

    #[test]
    fn kind_matches_display_prefix() {
        let errs = [
            ExecutorError::not_found("x", &[]),
            ExecutorError::Timeout { what: "w".into(), elapsed_ms: 1 },
            ExecutorError::Transport("t".into()),
            ExecutorError::AccessibilityEnable("a".into()),
            ExecutorError::AxTreeFetch("f".into()),
            ExecutorError::Precondition("p".into()),
            ExecutorError::UnknownOp("u".into()),
            ExecutorError::InvalidArgument("i".into()),
        ];
        for e in errs {
            assert!(e.to_string().starts_with(&format!("{}: ", e.kind())));
        }
    }
}
