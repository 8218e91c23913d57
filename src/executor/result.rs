//! The uniform envelope returned by every verb.

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ExecutorError;

#[derive(Debug, Clone, Serialize)]
pub struct OperationResult {
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// `<kind>: <message>`, empty on success.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Unix milliseconds at envelope creation.
    pub timestamp: u64,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            error: String::new(),
            timestamp: now_ms(),
        }
    }

    pub fn ok_with_data(message: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: String::new(),
            timestamp: now_ms(),
        }
    }

    pub fn fail(err: &ExecutorError) -> Self {
        let line = err.to_string();
        Self {
            success: false,
            message: line.clone(),
            data: None,
            error: line,
            timestamp: now_ms(),
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes() {
        let ok = OperationResult::ok("done");
        assert!(ok.success);
        assert!(ok.error.is_empty());
        assert!(ok.data.is_none());
        assert!(ok.timestamp > 0);

        let fail = OperationResult::fail(&ExecutorError::Precondition("not a select".into()));
        assert!(!fail.success);
        assert_eq!(fail.error, "precondition: not a select");
    }

    #[test]
    fn serialization_omits_empty_error_and_data() {
        let ok = OperationResult::ok("done");
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("data").is_none());
        assert_eq!(json["success"], true);
    }
}
