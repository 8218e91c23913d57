//! Identifier resolution: one opaque string in, one operable element out.
//!
//! Strategies run in a fixed order — indexed semantic handle, CSS, XPath,
//! semantic label match against the cached tree — and the first hit wins.
//! No scoring, no ranking: predictability beats marginal precision, and a
//! failed lookup must be explainable from the identifier alone.

use serde_json::json;

use crate::cdp::CdpSession;
use crate::error::{ExecutorError, Result};
use crate::semantic::tree::SemanticTree;

/// Which strategy produced an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Indexed,
    Css,
    XPath,
    Semantic,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Indexed => "indexed",
            Strategy::Css => "css",
            Strategy::XPath => "xpath",
            Strategy::Semantic => "semantic",
        }
    }
}

/// A resolved element: a Runtime remote-object handle, plus the backend node
/// id when the strategy knew it (0 for CSS/XPath hits).
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub object_id: String,
    pub backend_node_id: i64,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HandleKind {
    Clickable,
    Input,
}

/// Parse `Clickable Element [n]` / `Input Element [n]` (case-sensitive,
/// whole-string match, 1-based index).
pub(crate) fn parse_indexed_handle(identifier: &str) -> Option<(HandleKind, usize)> {
    let (kind, rest) = if let Some(rest) = identifier.strip_prefix("Clickable Element [") {
        (HandleKind::Clickable, rest)
    } else if let Some(rest) = identifier.strip_prefix("Input Element [") {
        (HandleKind::Input, rest)
    } else {
        return None;
    };
    let digits = rest.strip_suffix(']')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|n| (kind, n))
}

/// CSS-shaped: leading `#`, `.`, `[`, or a space-free tag-like selector
/// (ASCII letter, then an alphanumeric run, then end or a non-word
/// character, e.g. `button` or `input[name=q]`).
pub(crate) fn looks_like_css(identifier: &str) -> bool {
    let mut bytes = identifier.bytes();
    match bytes.next() {
        Some(b'#') | Some(b'.') | Some(b'[') => return true,
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return false,
    }
    if identifier.contains(' ') {
        return false;
    }
    for b in bytes {
        if b.is_ascii_alphanumeric() {
            continue;
        }
        return b != b'_';
    }
    true
}

/// XPath-shaped: leading `/` or `(`.
pub(crate) fn looks_like_xpath(identifier: &str) -> bool {
    identifier.starts_with('/') || identifier.starts_with('(')
}

/// Resolve an identifier against the page and the cached semantic tree.
pub async fn resolve<S: CdpSession>(
    session: &S,
    tree: &SemanticTree,
    identifier: &str,
) -> Result<ResolvedElement> {
    // Strategy 1: indexed semantic handle. Authoritative — a failed lookup
    // is terminal, never a fall-through.
    if let Some((kind, n)) = parse_indexed_handle(identifier) {
        let node = match kind {
            HandleKind::Clickable => tree.clickable(n),
            HandleKind::Input => tree.input(n),
        }
        .ok_or_else(|| ExecutorError::not_found(identifier, &["indexed"]))?;

        let object_id = resolve_backend_node(session, node.backend_node_id)
            .await
            .map_err(|e| match e {
                ExecutorError::Transport(_) => e,
                _ => ExecutorError::not_found(identifier, &["indexed"]),
            })?;
        return Ok(ResolvedElement {
            object_id,
            backend_node_id: node.backend_node_id,
            strategy: Strategy::Indexed,
        });
    }

    let mut tried: Vec<&'static str> = Vec::new();

    // Strategy 2: CSS selector.
    if looks_like_css(identifier) {
        tried.push("css");
        let expr = format!(
            "document.querySelector({})",
            serde_json::to_string(identifier).unwrap_or_default()
        );
        if let Some(object_id) = evaluate_to_node(session, &expr).await? {
            return Ok(ResolvedElement {
                object_id,
                backend_node_id: 0,
                strategy: Strategy::Css,
            });
        }
    }

    // Strategy 3: XPath.
    if looks_like_xpath(identifier) {
        tried.push("xpath");
        let expr = format!(
            "document.evaluate({}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            serde_json::to_string(identifier).unwrap_or_default()
        );
        if let Some(object_id) = evaluate_to_node(session, &expr).await? {
            return Ok(ResolvedElement {
                object_id,
                backend_node_id: 0,
                strategy: Strategy::XPath,
            });
        }
    }

    // Strategy 4: semantic substring match in the cached tree.
    tried.push("semantic");
    if let Some(node) = tree.find_by_label(identifier) {
        match resolve_backend_node(session, node.backend_node_id).await {
            Ok(object_id) => {
                return Ok(ResolvedElement {
                    object_id,
                    backend_node_id: node.backend_node_id,
                    strategy: Strategy::Semantic,
                });
            }
            Err(ExecutorError::Transport(m)) => return Err(ExecutorError::Transport(m)),
            // Snapshot went stale between extraction and resolution.
            Err(_) => {}
        }
    }

    Err(ExecutorError::not_found(identifier, &tried))
}

/// Backend node id → Runtime remote object.
async fn resolve_backend_node<S: CdpSession>(session: &S, backend_node_id: i64) -> Result<String> {
    if backend_node_id == 0 {
        return Err(ExecutorError::Precondition(
            "node has no DOM counterpart".to_string(),
        ));
    }
    let result = session
        .call("DOM.resolveNode", json!({"backendNodeId": backend_node_id}))
        .await?;
    result
        .get("object")
        .and_then(|o| o.get("objectId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ExecutorError::Precondition(format!(
                "backend node {} did not resolve to an object",
                backend_node_id
            ))
        })
}

/// Evaluate an expression expected to yield a DOM node. Returns the remote
/// object id, `None` when the expression produced null or threw (an invalid
/// selector reads as "no match", not as a failure).
async fn evaluate_to_node<S: CdpSession>(session: &S, expression: &str) -> Result<Option<String>> {
    let result = session
        .call(
            "Runtime.evaluate",
            json!({"expression": expression, "returnByValue": false}),
        )
        .await?;

    if result.get("exceptionDetails").is_some() {
        return Ok(None);
    }
    Ok(result
        .get("result")
        .filter(|r| r.get("subtype").and_then(|s| s.as_str()) != Some("null"))
        .and_then(|r| r.get("objectId"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string()))
}
