//! PagePilot: a semantic browser-automation executor over the Chrome
//! DevTools Protocol.
//!
//! The executor attaches to a running Chromium-family browser, extracts a
//! semantic tree of interactable elements from the Accessibility domain, and
//! exposes high-level verbs (navigate, click, type, select, wait, extract,
//! screenshot, scroll) that address elements by CSS selector, XPath, visible
//! label, or indexed semantic handle.
//!
//! # Architecture
//!
//! - `cdp`: CDP session trait and the raw-WebSocket client
//! - `semantic`: semantic tree extraction from the Accessibility domain
//! - `resolver`: identifier → element resolution with a fixed fallback chain
//! - `executor`: the operation verbs and their result envelopes
//! - `batch`: sequential execution of operation lists
//!
//! The `pagepilot-mcp` binary serves the verbs as MCP tools over stdio.

pub mod batch;
pub mod cdp;
pub mod error;
pub mod executor;
pub mod resolver;
pub mod semantic;

pub use batch::{BatchResult, Operation, StepOutcome};
pub use cdp::{CdpClient, CdpSession};
pub use error::{ExecutorError, Result};
pub use executor::{Executor, ExecutorConfig, OperationResult};
pub use semantic::{SemanticNode, SemanticTree};
