//! Semantic tree snapshot: nodes keyed by AX node id with back-links to DOM
//! backend node ids, plus the 1-based indexed element lists handed out to
//! callers as `Clickable Element [n]` / `Input Element [n]`.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Roles that participate in the clickable handle list.
pub const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "checkbox",
    "radio",
    "switch",
    "treeitem",
];

/// Roles that participate in the input handle list.
pub const INPUT_ROLES: &[&str] = &["textbox", "searchbox", "combobox", "spinbutton", "slider"];

/// One entry in the semantic tree.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SemanticNode {
    /// Opaque id from the Accessibility domain, unique within one extraction.
    pub ax_node_id: String,
    /// Backing DOM node, 0 when the node has no DOM counterpart.
    pub backend_node_id: i64,
    /// ARIA role ("button", "link", "textbox", ...).
    pub role: String,
    /// Accessible name (label text, aria-label, ...).
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub placeholder: String,
    /// Joined names of the node's direct static-text children.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    /// Recognized DOM attributes (id, name, class, type, role, aria-label,
    /// placeholder, value, href, title).
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, String>,
    pub enabled: bool,
    /// Set when the browser itself considers the node non-interactive.
    pub ignored: bool,
    /// Child ax node ids in AX tree order.
    pub children: Vec<String>,
}

impl SemanticNode {
    /// Display label: name, else text, else `id:<id>`, else `name:<attr>`,
    /// else the role.
    pub fn label(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        if !self.text.is_empty() {
            return self.text.clone();
        }
        if let Some(id) = self.attributes.get("id").filter(|s| !s.is_empty()) {
            return format!("id:{}", id);
        }
        if let Some(name) = self.attributes.get("name").filter(|s| !s.is_empty()) {
            return format!("name:{}", name);
        }
        self.role.clone()
    }

    pub fn is_clickable(&self) -> bool {
        CLICKABLE_ROLES.contains(&self.role.as_str()) && !self.ignored && self.backend_node_id != 0
    }

    pub fn is_input(&self) -> bool {
        INPUT_ROLES.contains(&self.role.as_str()) && !self.ignored && self.backend_node_id != 0
    }
}

/// Immutable snapshot of the page's semantic structure.
///
/// Index handles are 1-based and stable for the lifetime of one snapshot;
/// any navigation or DOM mutation calls for a fresh extraction.
#[derive(Debug, Default)]
pub struct SemanticTree {
    /// All nodes in AX document order (the insertion order of `by_ax_id`).
    nodes: Vec<SemanticNode>,
    by_ax_id: HashMap<String, usize>,
    /// Many-to-one is possible; the last node with a given backend id wins.
    by_backend_id: HashMap<i64, usize>,
    /// Children of the synthetic root: ax ids of the AX roots.
    root_children: Vec<String>,
    clickables: Vec<usize>,
    inputs: Vec<usize>,
}

impl SemanticTree {
    /// Assemble a snapshot from built nodes. The indexed lists are populated
    /// by a depth-first walk from the roots in AX child order.
    pub fn assemble(nodes: Vec<SemanticNode>, root_children: Vec<String>) -> Self {
        let mut by_ax_id = HashMap::with_capacity(nodes.len());
        let mut by_backend_id = HashMap::new();
        for (i, node) in nodes.iter().enumerate() {
            by_ax_id.insert(node.ax_node_id.clone(), i);
            if node.backend_node_id != 0 {
                by_backend_id.insert(node.backend_node_id, i);
            }
        }

        let mut tree = Self {
            nodes,
            by_ax_id,
            by_backend_id,
            root_children,
            clickables: Vec::new(),
            inputs: Vec::new(),
        };

        let mut visited = HashSet::new();
        let mut stack: Vec<&str> = tree.root_children.iter().rev().map(|s| s.as_str()).collect();
        let mut clickables = Vec::new();
        let mut inputs = Vec::new();
        while let Some(ax_id) = stack.pop() {
            let Some(&idx) = tree.by_ax_id.get(ax_id) else { continue };
            if !visited.insert(idx) {
                continue;
            }
            let node = &tree.nodes[idx];
            if node.is_clickable() {
                clickables.push(idx);
            }
            if node.is_input() {
                inputs.push(idx);
            }
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        tree.clickables = clickables;
        tree.inputs = inputs;
        tree
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in AX document order.
    pub fn iter(&self) -> impl Iterator<Item = &SemanticNode> {
        self.nodes.iter()
    }

    pub fn get(&self, ax_node_id: &str) -> Option<&SemanticNode> {
        self.by_ax_id.get(ax_node_id).map(|&i| &self.nodes[i])
    }

    pub fn by_backend(&self, backend_node_id: i64) -> Option<&SemanticNode> {
        self.by_backend_id.get(&backend_node_id).map(|&i| &self.nodes[i])
    }

    /// nth clickable element, 1-based.
    pub fn clickable(&self, n: usize) -> Option<&SemanticNode> {
        if n == 0 {
            return None;
        }
        self.clickables.get(n - 1).map(|&i| &self.nodes[i])
    }

    /// nth input element, 1-based.
    pub fn input(&self, n: usize) -> Option<&SemanticNode> {
        if n == 0 {
            return None;
        }
        self.inputs.get(n - 1).map(|&i| &self.nodes[i])
    }

    pub fn clickable_count(&self) -> usize {
        self.clickables.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// First node (document order) whose name, text, or placeholder contains
    /// `needle` case-insensitively. Only nodes with a DOM counterpart can be
    /// acted on, so nodes with backend id 0 are skipped. No ranking: the
    /// first hit wins.
    pub fn find_by_label(&self, needle: &str) -> Option<&SemanticNode> {
        let needle = needle.to_lowercase();
        self.nodes
            .iter()
            .filter(|n| n.backend_node_id != 0)
            .find(|n| {
                [&n.name, &n.text, &n.placeholder]
                    .iter()
                    .any(|f| !f.is_empty() && f.to_lowercase().contains(&needle))
            })
    }

    /// The indexed text serialization handed to callers (and used verbatim as
    /// LLM input). The `[n]` indices round-trip as identifiers.
    pub fn to_text(&self) -> String {
        let mut out = String::from("Page Interactive Elements:\n");

        out.push_str("\nClickable Elements:\n");
        for (i, &idx) in self.clickables.iter().enumerate() {
            let node = &self.nodes[idx];
            let label = node.label();
            out.push_str(&format!(
                "  Clickable Element [{}]: {}  (type: {})",
                i + 1,
                label,
                node.role
            ));
            if !node.text.is_empty() && node.text != label {
                out.push_str(&format!(" - {}", node.text));
            }
            out.push('\n');
        }

        out.push_str("\nInput Elements:\n");
        for (i, &idx) in self.inputs.iter().enumerate() {
            let node = &self.nodes[idx];
            out.push_str(&format!(
                "  Input Element [{}]: {}  (type: {})",
                i + 1,
                node.label(),
                node.role
            ));
            if !node.placeholder.is_empty() {
                out.push_str(&format!("  [placeholder: {}]", node.placeholder));
            }
            if !node.value.is_empty() {
                out.push_str(&format!("  [value: {}]", node.value));
            }
            out.push('\n');
        }

        out
    }

    /// Structural serialization: an indented role/name outline of the whole
    /// tree, ignored nodes included.
    pub fn to_outline(&self) -> String {
        let mut out = String::new();
        let mut visited = HashSet::new();
        for root in &self.root_children {
            self.outline_node(root, 0, &mut visited, &mut out);
        }
        out
    }

    fn outline_node(
        &self,
        ax_id: &str,
        depth: usize,
        visited: &mut HashSet<usize>,
        out: &mut String,
    ) {
        let Some(&idx) = self.by_ax_id.get(ax_id) else { return };
        if !visited.insert(idx) {
            return;
        }
        let node = &self.nodes[idx];
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.role);
        if !node.name.is_empty() {
            out.push_str(&format!(" \"{}\"", node.name));
        }
        if node.ignored {
            out.push_str(" (ignored)");
        }
        out.push('\n');
        for child in &node.children {
            self.outline_node(child, depth + 1, visited, out);
        }
    }
}
