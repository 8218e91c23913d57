//! PagePilot MCP Server — semantic browser automation via Chrome DevTools Protocol.
//! Attaches to an already-running Chrome with --remote-debugging-port.
//!
//! Usage: pagepilot-mcp  (stdio transport; set PAGEPILOT_CDP_PORT if not 9222)

use rmcp::{
    handler::server::router::tool::ToolRouter,
    model::*,
    schemars, tool, tool_handler, tool_router, ServerHandler,
    service::RequestContext,
    RoleServer, ServiceExt,
    ErrorData as McpError,
};
use std::env;
use std::sync::Arc;

use pagepilot::executor::{
    ClickOptions, ExtractKind, ExtractOptions, ImageFormat, NavigateOptions, OperationResult,
    ScreenshotOptions, SelectOptions, TypeOptions, WaitForOptions, WaitState, WaitUntil,
};
use pagepilot::{CdpClient, Executor, ExecutorError};

const DEFAULT_CDP_PORT: u16 = 9222;

fn cdp_host() -> String {
    env::var("PAGEPILOT_CDP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn cdp_port() -> u16 {
    env::var("PAGEPILOT_CDP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CDP_PORT)
}

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct NavigateParam {
    /// Fully-qualified URL to navigate to (include https://)
    url: String,
    /// When navigation counts as complete:
    /// - "load" (default): wait for window.onload — safe for most pages
    /// - "domcontentloaded": DOM ready, resources may still be loading
    /// - "networkidle": load plus a settle delay
    #[serde(default = "default_wait_until")]
    wait_until: String,
}
fn default_wait_until() -> String { "load".to_string() }

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ClickParam {
    /// Element identifier: an indexed handle from the semantic tree
    /// ("Clickable Element [3]"), a CSS selector ("#submit"), an XPath
    /// ("//button[1]"), or visible label text ("Sign in")
    identifier: String,
    /// Wait for the element to be visible before clicking (default: true)
    #[serde(default = "default_true")]
    wait_visible: bool,
}
fn default_true() -> bool { true }

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct TypeParam {
    /// Element identifier (indexed handle, CSS selector, XPath, or label)
    identifier: String,
    /// Text to type into the element
    text: String,
    /// Clear the existing value first (default: true)
    #[serde(default = "default_true")]
    clear: bool,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct SelectParam {
    /// Identifier of the <select> element
    identifier: String,
    /// Option to select — matched against the option's value attribute first, then visible text
    value: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ScreenshotParam {
    /// Capture the full scrollable page, not just the viewport (default: false)
    #[serde(default)]
    full_page: bool,
    /// Image format: "png" (lossless, default) or "jpeg" (smaller)
    #[serde(default = "default_format")]
    format: String,
}
fn default_format() -> String { "png".to_string() }

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ExtractParam {
    /// CSS selector of the element(s) to extract from
    selector: String,
    /// What to extract: "text" (default) or "html"
    #[serde(rename = "type", default = "default_extract_type")]
    extract_type: String,
    /// Extract from every matching element and return a list (default: false)
    #[serde(default)]
    multiple: bool,
}
fn default_extract_type() -> String { "text".to_string() }

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct GetSemanticTreeParam {
    /// true (default): the indexed interactive-element listing whose
    /// "Clickable Element [n]" handles work as identifiers.
    /// false: a structural role/name outline of the whole tree.
    #[serde(default = "default_true")]
    simple: bool,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct WaitForParam {
    /// Element identifier (indexed handle, CSS selector, XPath, or label)
    identifier: String,
    /// State to wait for: "visible" (default), "hidden", "enabled", "attached", "detached"
    #[serde(default = "default_state")]
    state: String,
    /// Maximum wait in milliseconds (default: 30000)
    #[serde(default = "default_wait_timeout")]
    timeout: u64,
}
fn default_state() -> String { "visible".to_string() }
fn default_wait_timeout() -> u64 { 30_000 }

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
struct ScrollParam {
    /// "top", "bottom" (default), or an element identifier to scroll into view
    #[serde(default = "default_direction")]
    direction: String,
}
fn default_direction() -> String { "bottom".to_string() }

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct PagePilotServer {
    executor: Arc<Executor<CdpClient>>,
    tool_router: ToolRouter<Self>,
}

impl PagePilotServer {
    fn new(executor: Arc<Executor<CdpClient>>) -> Self {
        Self { executor, tool_router: Self::tool_router() }
    }

    fn invalid(msg: impl Into<String>) -> McpError {
        McpError::internal_error(ExecutorError::InvalidArgument(msg.into()).to_string(), None)
    }

    /// Failure envelopes become a single `kind: message` error line; success
    /// envelopes become their data map as compact JSON (or the message when
    /// there is no data).
    fn text_result(result: OperationResult) -> Result<CallToolResult, McpError> {
        if !result.success {
            return Err(McpError::internal_error(result.error, None));
        }
        let text = match &result.data {
            Some(data) => serde_json::to_string(data).unwrap_or_else(|_| result.message.clone()),
            None => result.message.clone(),
        };
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Success with a single data key rendered raw (no JSON quoting).
    fn raw_key_result(result: OperationResult, key: &str) -> Result<CallToolResult, McpError> {
        if !result.success {
            return Err(McpError::internal_error(result.error, None));
        }
        let text = result
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| result.message.clone());
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

use rmcp::handler::server::wrapper::Parameters;

#[tool_router]
impl PagePilotServer {
    /// Navigate to a URL
    #[tool(description = "Navigate to a URL and wait for the page to load (60s budget). Returns { url, title, semantic_tree } — the semantic_tree lists the page's interactive elements with indexed handles like 'Clickable Element [1]' that all other tools accept as identifiers.")]
    async fn browser_navigate(
        &self,
        Parameters(p): Parameters<NavigateParam>,
    ) -> Result<CallToolResult, McpError> {
        let wait_until = WaitUntil::parse(&p.wait_until)
            .ok_or_else(|| Self::invalid(format!("unknown wait_until '{}'", p.wait_until)))?;
        let opts = NavigateOptions { wait_until, ..NavigateOptions::default() };
        Self::text_result(self.executor.navigate(&p.url, Some(opts)).await)
    }

    /// Click an element
    #[tool(description = "Click an element using real mouse events. The identifier may be an indexed handle from the semantic tree ('Clickable Element [2]'), a CSS selector, an XPath, or visible label text — resolution tries those in that fixed order.")]
    async fn browser_click(
        &self,
        Parameters(p): Parameters<ClickParam>,
    ) -> Result<CallToolResult, McpError> {
        let opts = ClickOptions { wait_visible: p.wait_visible, ..ClickOptions::default() };
        Self::text_result(self.executor.click(&p.identifier, Some(opts)).await)
    }

    /// Type text into an element
    #[tool(description = "Type text into an input element (fires input+change events, works with React controlled inputs). With clear=true (default) the existing value is removed first. Identifiers resolve like browser_click's.")]
    async fn browser_type(
        &self,
        Parameters(p): Parameters<TypeParam>,
    ) -> Result<CallToolResult, McpError> {
        let opts = TypeOptions { clear: p.clear, ..TypeOptions::default() };
        Self::text_result(self.executor.type_text(&p.identifier, &p.text, Some(opts)).await)
    }

    /// Select an option in a dropdown
    #[tool(description = "Select an option in a <select> element by its value attribute or visible label text. Fails with a precondition error when the identifier resolves to a non-select element.")]
    async fn browser_select(
        &self,
        Parameters(p): Parameters<SelectParam>,
    ) -> Result<CallToolResult, McpError> {
        Self::text_result(
            self.executor
                .select(&p.identifier, &p.value, Some(SelectOptions::default()))
                .await,
        )
    }

    /// Take a screenshot
    #[tool(description = "Capture a screenshot of the current page and return it as an inline image. full_page=true captures the entire scrollable page; format='jpeg' for smaller files.")]
    async fn browser_screenshot(
        &self,
        Parameters(p): Parameters<ScreenshotParam>,
    ) -> Result<CallToolResult, McpError> {
        let format = ImageFormat::parse(&p.format)
            .ok_or_else(|| Self::invalid(format!("unknown format '{}'", p.format)))?;
        let opts = ScreenshotOptions { full_page: p.full_page, format, ..ScreenshotOptions::default() };
        let result = self.executor.screenshot(Some(opts)).await;
        if !result.success {
            return Err(McpError::internal_error(result.error, None));
        }
        let payload = result
            .data
            .as_ref()
            .and_then(|d| d.get("data"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let mime = match format {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        };
        Ok(CallToolResult::success(vec![Content::image(payload, mime)]))
    }

    /// Extract content by CSS selector
    #[tool(description = "Extract text or HTML from elements matched by a CSS selector. multiple=false (default) returns the first match's content and fails with not_found when nothing matches; multiple=true returns a list in document order (empty when nothing matches).")]
    async fn browser_extract(
        &self,
        Parameters(p): Parameters<ExtractParam>,
    ) -> Result<CallToolResult, McpError> {
        let kind = ExtractKind::parse(&p.extract_type)
            .ok_or_else(|| Self::invalid(format!("unknown extract type '{}'", p.extract_type)))?;
        let opts = ExtractOptions { kind, multiple: p.multiple, ..ExtractOptions::new(p.selector) };
        Self::raw_key_result(self.executor.extract(opts).await, "result")
    }

    /// Get the semantic tree of interactive elements
    #[tool(description = "Extract a fresh semantic tree of the page's interactive elements from the browser's accessibility tree. The default listing indexes clickable and input elements ('Clickable Element [1]', 'Input Element [2]'); those handles are stable until the next navigation and work as identifiers in browser_click / browser_type / browser_wait_for. Call this first on any new page.")]
    async fn browser_get_semantic_tree(
        &self,
        Parameters(p): Parameters<GetSemanticTreeParam>,
    ) -> Result<CallToolResult, McpError> {
        let key = if p.simple { "tree" } else { "outline" };
        Self::raw_key_result(self.executor.get_semantic_tree().await, key)
    }

    /// Get current page URL and title
    #[tool(description = "Get the current page's URL, title, and interactive-element listing. Uses the cached semantic tree when one exists; use browser_get_semantic_tree to force a fresh extraction.")]
    async fn browser_get_page_info(&self) -> Result<CallToolResult, McpError> {
        Self::text_result(self.executor.get_page_info().await)
    }

    /// Wait for an element state
    #[tool(description = "Poll until an element reaches a state: visible, hidden, enabled, attached, or detached. Waiting for 'hidden' or 'detached' on an element that does not exist succeeds immediately. Fails with a timeout error naming the awaited state.")]
    async fn browser_wait_for(
        &self,
        Parameters(p): Parameters<WaitForParam>,
    ) -> Result<CallToolResult, McpError> {
        let state = WaitState::parse(&p.state)
            .ok_or_else(|| Self::invalid(format!("unknown state '{}'", p.state)))?;
        let opts = WaitForOptions {
            state,
            timeout: std::time::Duration::from_millis(p.timeout),
        };
        Self::text_result(self.executor.wait_for(&p.identifier, Some(opts)).await)
    }

    /// Scroll the page
    #[tool(description = "Scroll to the top or bottom of the page, or pass an element identifier to scroll that element into view.")]
    async fn browser_scroll(
        &self,
        Parameters(p): Parameters<ScrollParam>,
    ) -> Result<CallToolResult, McpError> {
        Self::text_result(self.executor.scroll(&p.direction).await)
    }
}

#[tool_handler]
impl ServerHandler for PagePilotServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pagepilot-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("PagePilot Browser Automation".into()),
                description: Some(
                    "Semantically addressable browser automation over the Chrome DevTools Protocol".into(),
                ),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "# PagePilot MCP — Semantic Browser Automation\n\
                 \n\
                 ## Core Concept\n\
                 Elements are addressed by a single identifier string, resolved in a fixed order:\n\
                 1. Indexed semantic handle — 'Clickable Element [n]' / 'Input Element [n]' from the tree\n\
                 2. CSS selector — '#id', '.class', 'input[name=q]'\n\
                 3. XPath — '//button[1]'\n\
                 4. Visible label text — case-insensitive substring against name/text/placeholder\n\
                 \n\
                 ## Standard Workflow\n\
                 ```\n\
                 1. browser_navigate            → go to a URL (returns the semantic tree)\n\
                 2. browser_get_semantic_tree   → re-observe after the page changes\n\
                 3. browser_click / browser_type / browser_select  → act via identifiers\n\
                 4. browser_wait_for            → wait out async UI updates\n\
                 5. browser_extract             → scrape text/HTML by CSS selector\n\
                 6. browser_screenshot          → visual verification when needed\n\
                 ```\n\
                 \n\
                 ## Tips\n\
                 - Indexed handles are stable until the next navigation; re-fetch the tree after navigating.\n\
                 - browser_navigate waits for the load event (60s budget); other operations default to 30s.\n\
                 - browser_select matches the option value attribute first, then visible text.\n\
                 - Waiting for 'hidden' on an absent element succeeds — useful for dismissal checks.\n\
                 - Errors come back as one 'kind: message' line (not_found, timeout, precondition, ...)."
                    .into(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        Ok(self.get_info())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let host = cdp_host();
    let port = cdp_port();
    let client = match CdpClient::attach(&host, port).await {
        Ok(client) => {
            tracing::info!("attached to Chrome DevTools at {}:{}", host, port);
            client
        }
        Err(e) => {
            eprintln!("Cannot attach to Chrome DevTools at {}:{}: {}", host, port, e);
            eprintln!("Start Chrome with --remote-debugging-port={} (or set PAGEPILOT_CDP_PORT).", port);
            std::process::exit(1);
        }
    };

    let executor = Arc::new(Executor::new(Arc::new(client)));
    let server = PagePilotServer::new(executor);
    let transport = tokio::io::join(tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(transport).await?;
    service.waiting().await?;
    Ok(())
}
