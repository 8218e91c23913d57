// Batch runner: sequential dispatch, stop_on_error with index-aligned
// skipped markers, and unknown-verb handling.

mod common;

use common::{login_page_session, PageState};
use pagepilot::{Executor, Operation};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn ops(value: serde_json::Value) -> Vec<Operation> {
    serde_json::from_value(value).unwrap()
}

fn executor() -> Executor<common::ScriptedSession> {
    let session = Arc::new(login_page_session(Arc::new(Mutex::new(PageState::default()))));
    Executor::new(session)
}

#[tokio::test]
async fn stop_on_error_skips_the_remainder_with_aligned_indices() {
    let executor = executor();
    let batch = ops(json!([
        {"type": "navigate", "params": {"url": "https://example.test/"}},
        {"type": "click", "params": {"identifier": "NoSuchThing"}, "stop_on_error": true},
        {"type": "screenshot"}
    ]));

    let result = executor.execute_batch(&batch).await;
    assert_eq!(result.steps.len(), 3);

    let first = result.steps[0].result().unwrap();
    assert!(first.success, "{}", first.error);

    let second = result.steps[1].result().unwrap();
    assert!(!second.success);
    assert!(second.error.starts_with("not_found: "), "{}", second.error);

    assert!(result.steps[2].is_skipped());
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_count, 1);
}

#[tokio::test]
async fn failures_without_stop_on_error_do_not_abort() {
    let executor = executor();
    let batch = ops(json!([
        {"type": "click", "params": {"identifier": "NoSuchThing"}},
        {"type": "navigate", "params": {"url": "https://example.test/"}}
    ]));

    let result = executor.execute_batch(&batch).await;
    assert_eq!(result.steps.len(), 2);
    assert!(!result.steps[0].result().unwrap().success);
    assert!(result.steps[1].result().unwrap().success);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.failed_count, 1);
}

#[tokio::test]
async fn unknown_verb_yields_unknown_op() {
    let executor = executor();
    let batch = ops(json!([
        {"type": "teleport", "params": {}},
        {"type": "get_page_info"}
    ]));

    let result = executor.execute_batch(&batch).await;
    let first = result.steps[0].result().unwrap();
    assert!(!first.success);
    assert!(first.error.starts_with("unknown_op: "), "{}", first.error);
    assert!(first.error.contains("teleport"));
    // an unknown op without stop_on_error does not abort the batch
    assert!(result.steps[1].result().unwrap().success);
}

#[tokio::test]
async fn missing_required_parameter_is_an_invalid_argument() {
    let executor = executor();
    let batch = ops(json!([
        {"type": "click", "params": {}}
    ]));

    let result = executor.execute_batch(&batch).await;
    let step = result.steps[0].result().unwrap();
    assert!(!step.success);
    assert!(step.error.starts_with("invalid_argument: "), "{}", step.error);
    assert!(step.error.contains("identifier"));
}

#[tokio::test]
async fn verbs_dispatch_by_name_across_the_catalog() {
    let executor = executor();
    let batch = ops(json!([
        {"type": "navigate", "params": {"url": "https://example.test/", "wait_until": "domcontentloaded"}},
        {"type": "type", "params": {"identifier": "Input Element [1]", "text": "hi"}},
        {"type": "wait_for", "params": {"identifier": "#ghost", "state": "hidden"}},
        {"type": "scroll", "params": {"direction": "bottom"}},
        {"type": "press_key", "params": {"key": "Enter"}},
        {"type": "get_semantic_tree"}
    ]));

    let result = executor.execute_batch(&batch).await;
    assert_eq!(result.failed_count, 0, "{:?}", result.steps.iter().filter_map(|s| s.result()).map(|r| r.error.clone()).collect::<Vec<_>>());
    assert_eq!(result.success_count, 6);
}
