//! Batch runner: an ordered list of operation descriptors executed
//! sequentially against one executor.
//!
//! Steps never run in parallel — they share a single page. A failing step
//! with `stop_on_error` aborts the remainder, and the skipped steps stay in
//! the result list as explicit markers so indices line up with the input.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::cdp::CdpSession;
use crate::error::ExecutorError;
use crate::executor::{
    ClickOptions, Executor, ExtractField, ExtractKind, ExtractOptions, ImageFormat, MouseButton,
    NavigateOptions, OperationResult, ScreenshotOptions, SelectOptions, TypeOptions,
    WaitForOptions, WaitState, WaitUntil,
};

/// One step of a batch.
#[derive(Debug, Clone, Deserialize)]
pub struct Operation {
    /// Verb name ("navigate", "click", "type", ...).
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    /// Abort the remaining steps if this one fails.
    #[serde(default)]
    pub stop_on_error: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { result: OperationResult },
    Skipped,
}

impl StepOutcome {
    pub fn result(&self) -> Option<&OperationResult> {
        match self {
            StepOutcome::Completed { result } => Some(result),
            StepOutcome::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped)
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResult {
    pub steps: Vec<StepOutcome>,
    pub success_count: usize,
    pub failed_count: usize,
}

impl<S: CdpSession + 'static> Executor<S> {
    /// Run the operations in order, collecting one outcome per input step.
    pub async fn execute_batch(&self, ops: &[Operation]) -> BatchResult {
        let mut steps = Vec::with_capacity(ops.len());
        let mut success_count = 0;
        let mut failed_count = 0;
        let mut aborted = false;

        for (index, op) in ops.iter().enumerate() {
            if aborted {
                steps.push(StepOutcome::Skipped);
                continue;
            }

            let result = dispatch(self, op).await;
            if result.success {
                success_count += 1;
            } else {
                failed_count += 1;
                if op.stop_on_error {
                    tracing::warn!(
                        "batch step {} ({}) failed, aborting remainder: {}",
                        index + 1,
                        op.op_type,
                        result.error
                    );
                    aborted = true;
                }
            }
            steps.push(StepOutcome::Completed { result });
        }

        BatchResult { steps, success_count, failed_count }
    }
}

/// Name-to-verb dispatch. Parameter parsing mirrors the tool adapter:
/// defaults are filled explicitly and unknown parameters are ignored.
async fn dispatch<S: CdpSession + 'static>(executor: &Executor<S>, op: &Operation) -> OperationResult {
    let p = &op.params;
    match op.op_type.as_str() {
        "navigate" => {
            let url = match required_str(p, "url") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = NavigateOptions::default();
            if let Some(w) = opt_str(p, "wait_until") {
                match WaitUntil::parse(w) {
                    Some(w) => opts.wait_until = w,
                    None => {
                        return OperationResult::fail(&ExecutorError::InvalidArgument(format!(
                            "unknown wait_until '{}'",
                            w
                        )))
                    }
                }
            }
            if let Some(t) = opt_ms(p, "timeout") {
                opts.timeout = t;
            }
            executor.navigate(url, Some(opts)).await
        }

        "go_back" => executor.go_back().await,
        "go_forward" => executor.go_forward().await,
        "reload" => executor.reload().await,

        "click" => {
            let identifier = match required_str(p, "identifier") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = ClickOptions::default();
            if let Some(v) = opt_bool(p, "wait_visible") {
                opts.wait_visible = v;
            }
            if let Some(v) = opt_bool(p, "wait_enabled") {
                opts.wait_enabled = v;
            }
            if let Some(b) = opt_str(p, "button").and_then(MouseButton::parse) {
                opts.button = b;
            }
            if let Some(n) = p.get("click_count").and_then(|v| v.as_u64()) {
                opts.click_count = n as u32;
            }
            if let Some(t) = opt_ms(p, "timeout") {
                opts.timeout = t;
            }
            executor.click(identifier, Some(opts)).await
        }

        "type" => {
            let identifier = match required_str(p, "identifier") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let text = match required_str(p, "text") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = TypeOptions::default();
            if let Some(v) = opt_bool(p, "clear") {
                opts.clear = v;
            }
            if let Some(v) = opt_bool(p, "wait_visible") {
                opts.wait_visible = v;
            }
            if let Some(d) = opt_ms(p, "delay") {
                opts.delay = d;
            }
            if let Some(t) = opt_ms(p, "timeout") {
                opts.timeout = t;
            }
            executor.type_text(identifier, text, Some(opts)).await
        }

        "select" => {
            let identifier = match required_str(p, "identifier") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let value = match required_str(p, "value") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = SelectOptions::default();
            if let Some(t) = opt_ms(p, "timeout") {
                opts.timeout = t;
            }
            executor.select(identifier, value, Some(opts)).await
        }

        "hover" => {
            let identifier = match required_str(p, "identifier") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            executor.hover(identifier).await
        }

        "wait_for" => {
            let identifier = match required_str(p, "identifier") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = WaitForOptions::default();
            if let Some(s) = opt_str(p, "state") {
                match WaitState::parse(s) {
                    Some(s) => opts.state = s,
                    None => {
                        return OperationResult::fail(&ExecutorError::InvalidArgument(format!(
                            "unknown state '{}'",
                            s
                        )))
                    }
                }
            }
            if let Some(t) = opt_ms(p, "timeout") {
                opts.timeout = t;
            }
            executor.wait_for(identifier, Some(opts)).await
        }

        "extract" => {
            let selector = match required_str(p, "selector") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            let mut opts = ExtractOptions::new(selector);
            if let Some(k) = opt_str(p, "type") {
                match ExtractKind::parse(k) {
                    Some(k) => opts.kind = k,
                    None => {
                        return OperationResult::fail(&ExecutorError::InvalidArgument(format!(
                            "unknown extract type '{}'",
                            k
                        )))
                    }
                }
            }
            opts.attr = opt_str(p, "attr").map(|s| s.to_string());
            if let Some(m) = opt_bool(p, "multiple") {
                opts.multiple = m;
            }
            if let Some(fields) = p.get("fields").and_then(|v| v.as_array()) {
                opts.fields = Some(
                    fields
                        .iter()
                        .filter_map(|f| {
                            let name = f.get("name")?.as_str()?.to_string();
                            let selector = f.get("selector")?.as_str()?.to_string();
                            let kind = f
                                .get("type")
                                .and_then(|v| v.as_str())
                                .and_then(ExtractKind::parse)
                                .unwrap_or(ExtractKind::Text);
                            let attr =
                                f.get("attr").and_then(|v| v.as_str()).map(|s| s.to_string());
                            Some(ExtractField { name, selector, kind, attr })
                        })
                        .collect(),
                );
            }
            executor.extract(opts).await
        }

        "screenshot" => {
            let mut opts = ScreenshotOptions::default();
            if let Some(f) = opt_bool(p, "full_page") {
                opts.full_page = f;
            }
            if let Some(f) = opt_str(p, "format").and_then(ImageFormat::parse) {
                opts.format = f;
            }
            if let Some(q) = p.get("quality").and_then(|v| v.as_u64()) {
                opts.quality = q as u32;
            }
            executor.screenshot(Some(opts)).await
        }

        "scroll" => {
            let direction = opt_str(p, "direction").unwrap_or("bottom");
            executor.scroll(direction).await
        }

        "press_key" => {
            let key = match required_str(p, "key") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            executor.press_key(key).await
        }

        "evaluate" => {
            let expression = match required_str(p, "expression") {
                Ok(v) => v,
                Err(e) => return OperationResult::fail(&e),
            };
            executor.evaluate(expression).await
        }

        "get_page_info" => executor.get_page_info().await,
        "get_semantic_tree" => executor.get_semantic_tree().await,

        other => OperationResult::fail(&ExecutorError::UnknownOp(format!(
            "no verb named '{}'",
            other
        ))),
    }
}

fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ExecutorError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ExecutorError::InvalidArgument(format!("missing required '{}'", key)))
}

fn opt_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn opt_bool(params: &Map<String, Value>, key: &str) -> Option<bool> {
    params.get(key).and_then(|v| v.as_bool())
}

/// Millisecond parameters arrive as JSON numbers.
fn opt_ms(params: &Map<String, Value>, key: &str) -> Option<Duration> {
    params.get(key).and_then(|v| v.as_u64()).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_descriptor_parses_with_defaults() {
        let op: Operation =
            serde_json::from_value(json!({"type": "click", "params": {"identifier": "#go"}}))
                .unwrap();
        assert_eq!(op.op_type, "click");
        assert!(!op.stop_on_error);
        assert_eq!(op.params.get("identifier").unwrap(), "#go");

        let op: Operation = serde_json::from_value(json!({"type": "reload"})).unwrap();
        assert!(op.params.is_empty());
    }

    #[test]
    fn step_outcome_serializes_with_status_tag() {
        let skipped = serde_json::to_value(StepOutcome::Skipped).unwrap();
        assert_eq!(skipped["status"], "skipped");

        let completed = serde_json::to_value(StepOutcome::Completed {
            result: OperationResult::ok("done"),
        })
        .unwrap();
        assert_eq!(completed["status"], "completed");
        assert_eq!(completed["result"]["success"], true);
    }
}
