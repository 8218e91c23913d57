// Resolver strategy chain: fixed order, authoritative indexed handles, and
// the not-found shape.

mod common;

use common::{login_page_session, PageState, ScriptedSession};
use pagepilot::resolver::{resolve, Strategy};
use pagepilot::semantic::{extract_semantic_tree, DEFAULT_EXTRACTION_TIMEOUT};
use pagepilot::SemanticTree;
use std::sync::{Arc, Mutex};

fn session_with(state: PageState) -> Arc<ScriptedSession> {
    Arc::new(login_page_session(Arc::new(Mutex::new(state))))
}

async fn tree_for(session: &Arc<ScriptedSession>) -> SemanticTree {
    extract_semantic_tree(session, DEFAULT_EXTRACTION_TIMEOUT)
        .await
        .unwrap()
}

#[tokio::test]
async fn indexed_handle_resolves_through_backend_node() {
    let session = session_with(PageState::default());
    let tree = tree_for(&session).await;

    let el = resolve(session.as_ref(), &tree, "Clickable Element [1]").await.unwrap();
    assert_eq!(el.strategy, Strategy::Indexed);
    assert_eq!(el.backend_node_id, 101);
    assert_eq!(el.object_id, "obj-101");

    let el = resolve(session.as_ref(), &tree, "Input Element [1]").await.unwrap();
    assert_eq!(el.strategy, Strategy::Indexed);
    assert_eq!(el.backend_node_id, 102);
}

#[tokio::test]
async fn out_of_range_indexed_handle_never_falls_through() {
    let session = session_with(PageState {
        // A CSS match exists, but the indexed strategy must not reach it.
        css_object: Some("css-obj-1".to_string()),
        ..PageState::default()
    });
    let tree = tree_for(&session).await;

    let err = resolve(session.as_ref(), &tree, "Clickable Element [99]").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    assert!(err.to_string().contains("Clickable Element [99]"));
    assert!(session.calls_for("Runtime.evaluate").is_empty());
}

#[tokio::test]
async fn css_wins_over_a_semantic_match() {
    let session = session_with(PageState {
        css_object: Some("css-obj-7".to_string()),
        ..PageState::default()
    });
    let tree = tree_for(&session).await;

    // "Help" is both a plausible tag-shaped selector and a node name; the
    // CSS strategy runs first and its hit is final.
    let el = resolve(session.as_ref(), &tree, "Help").await.unwrap();
    assert_eq!(el.strategy, Strategy::Css);
    assert_eq!(el.object_id, "css-obj-7");
}

#[tokio::test]
async fn css_miss_falls_through_to_semantic_match() {
    let session = session_with(PageState::default());
    let tree = tree_for(&session).await;

    let el = resolve(session.as_ref(), &tree, "Help").await.unwrap();
    assert_eq!(el.strategy, Strategy::Semantic);
    assert_eq!(el.backend_node_id, 103);
}

#[tokio::test]
async fn non_ascii_label_goes_straight_to_semantic_match() {
    let session = session_with(PageState::default());
    let tree = tree_for(&session).await;

    let el = resolve(session.as_ref(), &tree, "登录").await.unwrap();
    assert_eq!(el.strategy, Strategy::Semantic);
    assert_eq!(el.backend_node_id, 101);
    // neither a CSS nor an XPath query was attempted
    assert!(session.calls_for("Runtime.evaluate").is_empty());
}

#[tokio::test]
async fn semantic_match_covers_text_and_placeholder() {
    let session = session_with(PageState::default());
    let tree = tree_for(&session).await;

    // static-text child content
    let el = resolve(session.as_ref(), &tree, "help center").await.unwrap();
    assert_eq!(el.backend_node_id, 103);

    // placeholder
    let el = resolve(session.as_ref(), &tree, "you@example.com").await.unwrap();
    assert_eq!(el.backend_node_id, 102);
}

#[tokio::test]
async fn xpath_identifiers_use_the_xpath_strategy() {
    let session = session_with(PageState {
        xpath_object: Some("xp-obj-3".to_string()),
        ..PageState::default()
    });
    let tree = tree_for(&session).await;

    let el = resolve(session.as_ref(), &tree, "//button[1]").await.unwrap();
    assert_eq!(el.strategy, Strategy::XPath);
    assert_eq!(el.object_id, "xp-obj-3");
}

#[tokio::test]
async fn exhausted_chain_reports_attempted_strategies() {
    let session = session_with(PageState::default());
    let tree = tree_for(&session).await;

    let err = resolve(session.as_ref(), &tree, "#no-such-element").await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let msg = err.to_string();
    assert!(msg.contains("#no-such-element"));
    assert!(msg.contains("css"));
    assert!(msg.contains("semantic"));
}
