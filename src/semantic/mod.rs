//! Semantic view of the page: a snapshot of interactable elements built from
//! the browser's Accessibility domain.
//!
//! - `tree`: node and snapshot types, role sets, text serializations
//! - `extractor`: the extraction algorithm and its AX-domain discipline

pub mod extractor;
pub mod tree;

pub use extractor::{extract_semantic_tree, DEFAULT_EXTRACTION_TIMEOUT};
pub use tree::{SemanticNode, SemanticTree, CLICKABLE_ROLES, INPUT_ROLES};
