//! Semantic tree extraction via the CDP Accessibility domain.
//!
//! The Accessibility domain is stateful per CDP session: a prior enable may
//! have left stale filters behind, and an enabled domain left across
//! operation boundaries makes later `getFullAXTree` calls hang or return
//! partial trees. Extraction therefore always disables first, enables, and
//! disables again on every exit path — a drop guard covers the elapsed
//! budget and unwinds as well as ordinary returns.
//!
//! Extraction is synchronous from the caller's point of view: it runs as a
//! plain `await` on the calling task, never on a spawned one, so a single
//! executor can never have two extractions contending for the domain.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cdp::CdpSession;
use crate::error::{ExecutorError, Result};
use crate::semantic::tree::{SemanticNode, SemanticTree};

pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(10);

/// DOM attributes carried onto semantic nodes.
const RECOGNIZED_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "class",
    "type",
    "role",
    "aria-label",
    "placeholder",
    "value",
    "href",
    "title",
];

/// Extract a fresh semantic tree snapshot from the page.
pub async fn extract_semantic_tree<S: CdpSession + 'static>(
    session: &Arc<S>,
    timeout: Duration,
) -> Result<SemanticTree> {
    let timeout = if timeout.is_zero() { DEFAULT_EXTRACTION_TIMEOUT } else { timeout };

    // Clear any stale state from a previous enable before re-enabling.
    let _ = session.call("Accessibility.disable", json!({})).await;

    session
        .call("Accessibility.enable", json!({}))
        .await
        .map_err(|e| ExecutorError::AccessibilityEnable(detail(e)))?;

    // Armed from here: the domain must not stay enabled across operation
    // boundaries, whatever happens to the fetch — error, elapsed budget, or
    // an unwind through it.
    let guard = DisableGuard::new(Arc::clone(session));

    let built = tokio::time::timeout(timeout, fetch_and_build(session.as_ref())).await;

    guard.disable_now().await;

    match built {
        Ok(result) => result,
        Err(_) => Err(ExecutorError::Timeout {
            what: "semantic tree extraction".to_string(),
            elapsed_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Guarantees the trailing `Accessibility.disable`. Ordinary exits await it
/// inline via `disable_now`; if the extraction unwinds instead, `Drop` fires
/// it as a detached best-effort call (`Drop` cannot await).
struct DisableGuard<S: CdpSession + 'static> {
    session: Option<Arc<S>>,
}

impl<S: CdpSession + 'static> DisableGuard<S> {
    fn new(session: Arc<S>) -> Self {
        Self { session: Some(session) }
    }

    async fn disable_now(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.call("Accessibility.disable", json!({})).await {
                tracing::warn!("Accessibility.disable after extraction failed: {}", e);
            }
        }
    }
}

impl<S: CdpSession + 'static> Drop for DisableGuard<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else { return };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = session.call("Accessibility.disable", json!({})).await {
                    tracing::warn!("Accessibility.disable after unwind failed: {}", e);
                }
            });
        }
    }
}

async fn fetch_and_build<S: CdpSession>(session: &S) -> Result<SemanticTree> {
    let result = session
        .call("Accessibility.getFullAXTree", json!({}))
        .await
        .map_err(|e| ExecutorError::AxTreeFetch(detail(e)))?;

    let ax_nodes = result
        .get("nodes")
        .and_then(|n| n.as_array())
        .ok_or_else(|| ExecutorError::AxTreeFetch("no nodes in getFullAXTree result".to_string()))?;

    // One DOM snapshot per extraction supplies the attribute map; its failure
    // degrades to attribute-less nodes rather than failing the extraction.
    let dom_attributes = match session
        .call("DOM.getDocument", json!({"depth": -1, "pierce": true}))
        .await
    {
        Ok(doc) => collect_dom_attributes(&doc),
        Err(e) => {
            tracing::warn!("DOM snapshot for attributes failed: {}", e);
            HashMap::new()
        }
    };

    let mut nodes: Vec<SemanticNode> = Vec::with_capacity(ax_nodes.len());
    let mut root_children: Vec<String> = Vec::new();

    for ax in ax_nodes {
        let ax_node_id = ax
            .get("nodeId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        if ax_node_id.is_empty() {
            continue;
        }

        let backend_node_id = ax.get("backendDOMNodeId").and_then(|v| v.as_i64()).unwrap_or(0);
        let ignored = ax.get("ignored").and_then(|v| v.as_bool()).unwrap_or(false);
        let role = ax_value_string(ax.get("role"));
        let name = ax_value_string(ax.get("name"));
        let description = ax_value_string(ax.get("description"));
        let mut value = ax_value_string(ax.get("value"));

        let mut disabled = false;
        if let Some(props) = ax.get("properties").and_then(|p| p.as_array()) {
            for prop in props {
                let prop_name = prop.get("name").and_then(|n| n.as_str()).unwrap_or("");
                let prop_val = prop.get("value").and_then(|v| v.get("value"));
                match prop_name {
                    "disabled" => disabled = prop_val.and_then(|v| v.as_bool()).unwrap_or(false),
                    "valuetext" if value.is_empty() => {
                        value = prop_val.and_then(|v| v.as_str()).unwrap_or("").to_string()
                    }
                    _ => {}
                }
            }
        }

        let children = ax
            .get("childIds")
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        if ax
            .get("parentId")
            .and_then(|v| v.as_str())
            .map(|s| s.is_empty())
            .unwrap_or(true)
        {
            root_children.push(ax_node_id.clone());
        }

        let attributes = dom_attributes
            .get(&backend_node_id)
            .cloned()
            .unwrap_or_default();
        let placeholder = attributes.get("placeholder").cloned().unwrap_or_default();

        // Do not filter ignored nodes here; downstream queries choose their
        // own policy.
        nodes.push(SemanticNode {
            ax_node_id,
            backend_node_id,
            role,
            name,
            description,
            value,
            placeholder,
            text: String::new(),
            attributes,
            enabled: !disabled,
            ignored,
            children,
        });
    }

    // Second pass: a node's text is the joined names of its direct
    // static-text children.
    let name_by_ax: HashMap<String, (String, String)> = nodes
        .iter()
        .map(|n| (n.ax_node_id.clone(), (n.role.clone(), n.name.clone())))
        .collect();
    for node in &mut nodes {
        let mut parts: Vec<&str> = Vec::new();
        for child in &node.children {
            if let Some((role, name)) = name_by_ax.get(child) {
                if role == "StaticText" && !name.is_empty() {
                    parts.push(name);
                }
            }
        }
        node.text = parts.join(" ");
    }

    let tree = SemanticTree::assemble(nodes, root_children);
    tracing::debug!(
        "extracted semantic tree: {} nodes, {} clickable, {} inputs",
        tree.len(),
        tree.clickable_count(),
        tree.input_count()
    );
    Ok(tree)
}

/// Unwrap a transport failure to its bare message so extraction errors keep
/// a single kind prefix.
fn detail(e: ExecutorError) -> String {
    match e {
        ExecutorError::Transport(m) => m,
        other => other.to_string(),
    }
}

/// AX values arrive as `{ "type": ..., "value": ... }`; sliders and friends
/// carry numbers rather than strings.
fn ax_value_string(field: Option<&Value>) -> String {
    match field.and_then(|f| f.get("value")) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Walk a `DOM.getDocument` result and map backend node id → recognized
/// attributes. Pierced documents nest children under `children`,
/// `shadowRoots`, `contentDocument`, and `templateContent`.
fn collect_dom_attributes(doc: &Value) -> HashMap<i64, HashMap<String, String>> {
    let mut out = HashMap::new();
    if let Some(root) = doc.get("root") {
        walk_dom_node(root, &mut out);
    }
    out
}

fn walk_dom_node(node: &Value, out: &mut HashMap<i64, HashMap<String, String>>) {
    if let Some(backend_id) = node.get("backendNodeId").and_then(|v| v.as_i64()) {
        if let Some(attrs) = node.get("attributes").and_then(|a| a.as_array()) {
            let mut map = HashMap::new();
            for pair in attrs.chunks(2) {
                if let [k, v] = pair {
                    if let (Some(k), Some(v)) = (k.as_str(), v.as_str()) {
                        if RECOGNIZED_ATTRIBUTES.contains(&k) {
                            map.insert(k.to_string(), v.to_string());
                        }
                    }
                }
            }
            if !map.is_empty() {
                out.insert(backend_id, map);
            }
        }
    }

    for key in ["children", "shadowRoots"] {
        if let Some(children) = node.get(key).and_then(|c| c.as_array()) {
            for child in children {
                walk_dom_node(child, out);
            }
        }
    }
    for key in ["contentDocument", "templateContent"] {
        if let Some(child) = node.get(key) {
            walk_dom_node(child, out);
        }
    }
}
