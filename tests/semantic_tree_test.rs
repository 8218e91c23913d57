// Extraction invariants and Accessibility-domain hygiene, driven against a
// scripted CDP session.

mod common;

use common::{login_page_session, PageState};
use pagepilot::semantic::{extract_semantic_tree, DEFAULT_EXTRACTION_TIMEOUT};
use pagepilot::Executor;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

fn session() -> Arc<common::ScriptedSession> {
    Arc::new(login_page_session(Arc::new(Mutex::new(PageState::default()))))
}

#[tokio::test]
async fn extraction_builds_indexed_lists_in_document_order() {
    let session = session();
    let tree = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(tree.clickable_count(), 2);
    assert_eq!(tree.input_count(), 1);
    assert_eq!(tree.clickable(1).unwrap().name, "登录");
    assert_eq!(tree.clickable(2).unwrap().name, "Help");
    assert_eq!(tree.input(1).unwrap().name, "Email");
    assert!(tree.clickable(3).is_none());
}

#[tokio::test]
async fn indexed_nodes_have_distinct_ids_backend_links_and_are_unignored() {
    let session = session();
    let tree = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();

    let mut seen = HashSet::new();
    for n in 1..=tree.clickable_count() {
        let node = tree.clickable(n).unwrap();
        assert!(seen.insert(node.ax_node_id.clone()), "duplicate ax id in clickables");
        assert_ne!(node.backend_node_id, 0);
        assert!(!node.ignored);
    }
    for n in 1..=tree.input_count() {
        let node = tree.input(n).unwrap();
        assert_ne!(node.backend_node_id, 0);
        assert!(!node.ignored);
    }
}

#[tokio::test]
async fn dom_attributes_and_static_text_are_joined_in() {
    let session = session();
    let tree = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();

    let email = tree.input(1).unwrap();
    assert_eq!(email.placeholder, "you@example.com");
    assert_eq!(email.attributes.get("name").unwrap(), "email");

    let help = tree.clickable(2).unwrap();
    assert_eq!(help.text, "Help center");
    assert_eq!(help.attributes.get("href").unwrap(), "/help");

    // back-links resolve both ways
    assert_eq!(tree.by_backend(101).unwrap().name, "登录");
    assert_eq!(tree.get("3").unwrap().name, "Email");
}

#[tokio::test]
async fn extraction_is_idempotent_without_page_mutation() {
    let session = session();
    let first = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();
    let second = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();

    assert_eq!(first.clickable_count(), second.clickable_count());
    for n in 1..=first.clickable_count() {
        assert_eq!(first.clickable(n).unwrap().label(), second.clickable(n).unwrap().label());
    }
    assert_eq!(first.to_text(), second.to_text());
}

#[tokio::test]
async fn ax_domain_ends_disabled_after_repeated_tree_fetches() {
    let session = session();
    let executor = Executor::new(Arc::clone(&session));

    for _ in 0..5 {
        let result = executor.get_semantic_tree().await;
        assert!(result.success, "{}", result.error);
    }

    // One enable per extraction, and a disable both before (stale-state
    // clear) and after each; the domain is left disabled.
    assert_eq!(session.count("Accessibility.enable"), 5);
    assert_eq!(session.count("Accessibility.disable"), 10);
    assert_eq!(
        session.last_accessibility_call().as_deref(),
        Some("Accessibility.disable")
    );
}

#[tokio::test]
async fn text_serialization_uses_indexed_handles() {
    let session = session();
    let tree = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap();
    let text = tree.to_text();
    assert!(text.contains("Clickable Element [1]: 登录  (type: button)"));
    assert!(text.contains("Clickable Element [2]: Help  (type: link) - Help center"));
    assert!(text.contains("Input Element [1]: Email  (type: textbox)  [placeholder: you@example.com]"));
}

#[tokio::test]
async fn extraction_failure_surfaces_ax_error_and_still_disables() {
    let state = Arc::new(Mutex::new(PageState { ax_fail: true, ..PageState::default() }));
    let session = Arc::new(login_page_session(state));
    let err = extract_semantic_tree(&session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ax_tree_fetch");
    assert_eq!(
        session.last_accessibility_call().as_deref(),
        Some("Accessibility.disable")
    );
}
