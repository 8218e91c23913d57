//! The operation engine: public verbs over the CDP session, the resolver,
//! and the cached semantic tree.
//!
//! Every verb returns an [`OperationResult`] envelope — failures are carried
//! inside it, never thrown past it. Callers that pass `None` options get the
//! documented defaults, and a zero timeout inside a supplied options struct
//! is replaced by the verb's default before it can become a zero-length
//! deadline on the wire.
//!
//! One executor drives at most one operation at a time (an internal gate
//! serializes the public verbs); run several executors, each with its own
//! page, for parallelism. No verb retries internally.

pub mod options;
pub mod result;

pub use options::{
    ClickOptions, ExecutorConfig, ExtractField, ExtractKind, ExtractOptions, ImageFormat,
    MouseButton, NavigateOptions, ScreenshotOptions, ScrollTarget, SelectOptions, TypeOptions,
    WaitForOptions, WaitState, WaitUntil,
};
pub use result::OperationResult;

use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::cdp::CdpSession;
use crate::error::{ExecutorError, Result};
use crate::resolver::{self, ResolvedElement};
use crate::semantic::{extract_semantic_tree, SemanticTree};

use options::effective_timeout;

const JS_VISIBLE: &str = "function() { const r = this.getBoundingClientRect(); const s = window.getComputedStyle(this); return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }";
const JS_ENABLED: &str = "function() { return !this.disabled; }";
const JS_ATTACHED: &str = "function() { return this.isConnected; }";
const JS_SCROLL_INTO_VIEW: &str =
    "function() { this.scrollIntoView({block: 'center', behavior: 'instant'}); }";
const JS_CENTER: &str = "function() { const rect = this.getBoundingClientRect(); if (rect.width === 0 && rect.height === 0) return null; return { x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }; }";

pub struct Executor<S: CdpSession> {
    session: Arc<S>,
    config: ExecutorConfig,
    /// Cached snapshot, replaced wholesale on refresh; readers holding the
    /// previous `Arc` keep a consistent view.
    tree: Mutex<Option<Arc<SemanticTree>>>,
    /// Serializes public verbs: one in-flight operation per executor.
    gate: Mutex<()>,
}

impl<S: CdpSession + 'static> Executor<S> {
    pub fn new(session: Arc<S>) -> Self {
        Self::with_config(session, ExecutorConfig::default())
    }

    pub fn with_config(session: Arc<S>, config: ExecutorConfig) -> Self {
        Self {
            session,
            config,
            tree: Mutex::new(None),
            gate: Mutex::new(()),
        }
    }

    /// The cached semantic tree, if one has been extracted since the last
    /// navigation.
    pub async fn cached_tree(&self) -> Option<Arc<SemanticTree>> {
        self.tree.lock().await.clone()
    }

    // ── Navigation ─────────────────────────────────────────────────

    pub async fn navigate(&self, url: &str, opts: Option<NavigateOptions>) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.navigate_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.navigate_inner(url, opts.wait_until)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return OperationResult::fail(&e),
            Err(_) => {
                return OperationResult::fail(&timeout_err(
                    format!("navigation to '{}' ({})", url, opts.wait_until.as_str()),
                    started,
                ))
            }
        }

        let mut data = Map::new();
        match self.page_location().await {
            Ok((current_url, title)) => {
                data.insert("url".into(), Value::String(current_url));
                data.insert("title".into(), Value::String(title));
            }
            Err(e) => return OperationResult::fail(&e),
        }

        // A failed post-navigation extraction does not fail the navigation;
        // the tree is simply absent from the data.
        match self.refresh_tree().await {
            Ok(tree) => {
                data.insert("semantic_tree".into(), Value::String(tree.to_text()));
            }
            Err(e) => tracing::warn!("post-navigation tree extraction failed: {}", e),
        }

        OperationResult::ok_with_data(format!("Navigated to {}", url), data)
    }

    async fn navigate_inner(&self, url: &str, wait_until: WaitUntil) -> Result<()> {
        let event = match wait_until {
            WaitUntil::Load | WaitUntil::NetworkIdle => "Page.loadEventFired",
            WaitUntil::DomContentLoaded => "Page.domContentEventFired",
        };
        // Subscribe before navigating: the event can fire before the command
        // response returns.
        let rx = self.session.subscribe(event).await;

        let result = self.session.call("Page.navigate", json!({"url": url})).await?;
        if let Some(err_text) = result
            .get("errorText")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
        {
            return Err(ExecutorError::Transport(format!(
                "navigation to '{}' failed: {}",
                url, err_text
            )));
        }

        rx.await.map_err(|_| {
            ExecutorError::Transport("navigation event channel closed".to_string())
        })?;
        if wait_until == WaitUntil::NetworkIdle {
            // No Network-domain idle tracking; a settle delay after load
            // stands in for it.
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        tracing::debug!("navigation complete: {}", url);
        Ok(())
    }

    pub async fn go_back(&self) -> OperationResult {
        self.history_op("back", -1).await
    }

    pub async fn go_forward(&self) -> OperationResult {
        self.history_op("forward", 1).await
    }

    async fn history_op(&self, direction: &str, delta: i64) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.history_step(direction, delta)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return OperationResult::fail(&e),
            Err(_) => {
                return OperationResult::fail(&timeout_err(format!("go {}", direction), started))
            }
        }
        self.after_navigation(format!("Navigated {}", direction)).await
    }

    async fn history_step(&self, direction: &str, delta: i64) -> Result<()> {
        let nav = self
            .session
            .call("Page.getNavigationHistory", json!({}))
            .await?;
        let current = nav
            .get("currentIndex")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExecutorError::Transport("missing currentIndex".to_string()))?;
        let entries = nav
            .get("entries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ExecutorError::Transport("missing history entries".to_string()))?;

        let target = current + delta;
        if target < 0 || target >= entries.len() as i64 {
            return Err(ExecutorError::Precondition(format!(
                "no history entry to go {}",
                direction
            )));
        }
        let entry_id = entries[target as usize]
            .get("id")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ExecutorError::Transport("history entry without id".to_string()))?;

        // frameNavigated covers SPA pushState history moves that never fire
        // a load event; same-document moves may fire neither, hence the
        // bounded wait.
        let rx = self.session.subscribe("Page.frameNavigated").await;
        self.session
            .call("Page.navigateToHistoryEntry", json!({"entryId": entry_id}))
            .await?;
        let _ = tokio::time::timeout(Duration::from_secs(5), rx).await;
        Ok(())
    }

    pub async fn reload(&self) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        let reload = async {
            let rx = self.session.subscribe("Page.loadEventFired").await;
            self.session.call("Page.reload", json!({})).await?;
            rx.await
                .map_err(|_| ExecutorError::Transport("load event channel closed".to_string()))?;
            Ok::<(), ExecutorError>(())
        };
        match tokio::time::timeout(timeout, reload).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return OperationResult::fail(&e),
            Err(_) => return OperationResult::fail(&timeout_err("reload".to_string(), started)),
        }
        self.after_navigation("Page reloaded".to_string()).await
    }

    /// url/title data plus the mandatory tree refresh shared by the history
    /// verbs.
    async fn after_navigation(&self, message: String) -> OperationResult {
        let mut data = Map::new();
        match self.page_location().await {
            Ok((url, title)) => {
                data.insert("url".into(), Value::String(url));
                data.insert("title".into(), Value::String(title));
            }
            Err(e) => return OperationResult::fail(&e),
        }
        if let Err(e) = self.refresh_tree().await {
            tracing::warn!("post-navigation tree extraction failed: {}", e);
        }
        OperationResult::ok_with_data(message, data)
    }

    // ── Element verbs ──────────────────────────────────────────────

    pub async fn click(&self, identifier: &str, opts: Option<ClickOptions>) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.click_inner(identifier, &opts, started, timeout))
            .await
        {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("identifier".into(), Value::String(identifier.to_string()));
                OperationResult::ok_with_data(format!("Clicked '{}'", identifier), data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("click on '{}'", identifier),
                started,
            )),
        }
    }

    async fn click_inner(
        &self,
        identifier: &str,
        opts: &ClickOptions,
        started: Instant,
        timeout: Duration,
    ) -> Result<()> {
        let tree = self.ensure_tree().await?;
        let el = resolver::resolve(self.session.as_ref(), &tree, identifier).await?;
        self.call_on(&el.object_id, JS_SCROLL_INTO_VIEW, vec![]).await?;

        if opts.wait_visible {
            self.wait_predicate(&el, JS_VISIBLE, "visible", identifier, started, timeout)
                .await?;
        }
        if opts.wait_enabled {
            self.wait_predicate(&el, JS_ENABLED, "enabled", identifier, started, timeout)
                .await?;
        }

        let (x, y) = self.element_center(&el).await?;
        let button = opts.button.as_str();
        self.session
            .call(
                "Input.dispatchMouseEvent",
                json!({"type": "mouseMoved", "x": x, "y": y, "button": "none", "clickCount": 0}),
            )
            .await?;
        for n in 1..=opts.click_count.max(1) {
            self.session
                .call(
                    "Input.dispatchMouseEvent",
                    json!({"type": "mousePressed", "x": x, "y": y, "button": button, "clickCount": n}),
                )
                .await?;
            self.session
                .call(
                    "Input.dispatchMouseEvent",
                    json!({"type": "mouseReleased", "x": x, "y": y, "button": button, "clickCount": n}),
                )
                .await?;
        }
        tracing::debug!("clicked '{}' at ({:.1}, {:.1})", identifier, x, y);
        Ok(())
    }

    pub async fn type_text(
        &self,
        identifier: &str,
        text: &str,
        opts: Option<TypeOptions>,
    ) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(
            timeout,
            self.type_inner(identifier, text, &opts, started, timeout),
        )
        .await
        {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("identifier".into(), Value::String(identifier.to_string()));
                data.insert("text_len".into(), Value::from(text.chars().count()));
                OperationResult::ok_with_data(format!("Typed into '{}'", identifier), data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("type into '{}'", identifier),
                started,
            )),
        }
    }

    async fn type_inner(
        &self,
        identifier: &str,
        text: &str,
        opts: &TypeOptions,
        started: Instant,
        timeout: Duration,
    ) -> Result<()> {
        let tree = self.ensure_tree().await?;
        let el = resolver::resolve(self.session.as_ref(), &tree, identifier).await?;
        if opts.wait_visible {
            self.wait_predicate(&el, JS_VISIBLE, "visible", identifier, started, timeout)
                .await?;
        }
        self.session
            .call("DOM.focus", json!({"objectId": el.object_id}))
            .await?;

        if opts.delay.is_zero() {
            // Single assignment through the native value setter so framework
            // change listeners fire.
            let js = r#"function(text, clear) {
                const proto = this instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
                const setter = Object.getOwnPropertyDescriptor(proto, 'value');
                const next = clear ? text : (this.value || '') + text;
                if (setter && setter.set) { setter.set.call(this, next); } else { this.value = next; }
                this.dispatchEvent(new Event('input', { bubbles: true }));
                this.dispatchEvent(new Event('change', { bubbles: true }));
                return true;
            }"#;
            self.call_on(
                &el.object_id,
                js,
                vec![json!({"value": text}), json!({"value": opts.clear})],
            )
            .await?;
        } else {
            if opts.clear {
                // Select-all then delete before typing.
                self.call_on(
                    &el.object_id,
                    "function() { if (this.select) this.select(); }",
                    vec![],
                )
                .await?;
                self.dispatch_key("Delete").await?;
            }
            for ch in text.chars() {
                let ch_str = ch.to_string();
                for event_type in ["keyDown", "char", "keyUp"] {
                    self.session
                        .call(
                            "Input.dispatchKeyEvent",
                            json!({"type": event_type, "key": ch_str, "text": ch_str}),
                        )
                        .await?;
                }
                tokio::time::sleep(opts.delay).await;
            }
        }
        tracing::debug!("typed {} chars into '{}'", text.chars().count(), identifier);
        Ok(())
    }

    pub async fn select(
        &self,
        identifier: &str,
        value: &str,
        opts: Option<SelectOptions>,
    ) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.select_inner(identifier, value)).await {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("identifier".into(), Value::String(identifier.to_string()));
                data.insert("value".into(), Value::String(value.to_string()));
                OperationResult::ok_with_data(
                    format!("Selected '{}' in '{}'", value, identifier),
                    data,
                )
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("select in '{}'", identifier),
                started,
            )),
        }
    }

    async fn select_inner(&self, identifier: &str, value: &str) -> Result<()> {
        let tree = self.ensure_tree().await?;
        let el = resolver::resolve(self.session.as_ref(), &tree, identifier).await?;

        let tag = self
            .call_on(
                &el.object_id,
                "function() { return this.tagName ? this.tagName.toLowerCase() : ''; }",
                vec![],
            )
            .await?;
        let tag = tag.as_str().unwrap_or("");
        if tag != "select" {
            return Err(ExecutorError::Precondition(format!(
                "'{}' is a <{}>, not a <select>",
                identifier, tag
            )));
        }

        // Option value attribute first, visible text second; the first match
        // in document order wins.
        let js = r#"function(value) {
            const options = Array.from(this.options);
            let opt = options.find(o => o.value === value);
            if (!opt) opt = options.find(o => o.text.trim() === value);
            if (!opt) return false;
            this.value = opt.value;
            this.dispatchEvent(new Event('input', { bubbles: true }));
            this.dispatchEvent(new Event('change', { bubbles: true }));
            return true;
        }"#;
        let matched = self
            .call_on(&el.object_id, js, vec![json!({"value": value})])
            .await?;
        if matched.as_bool() != Some(true) {
            return Err(ExecutorError::Precondition(format!(
                "no option matching '{}' in '{}'",
                value, identifier
            )));
        }
        Ok(())
    }

    pub async fn hover(&self, identifier: &str) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        let hover = async {
            let tree = self.ensure_tree().await?;
            let el = resolver::resolve(self.session.as_ref(), &tree, identifier).await?;
            self.call_on(&el.object_id, JS_SCROLL_INTO_VIEW, vec![]).await?;
            let (x, y) = self.element_center(&el).await?;
            self.session
                .call(
                    "Input.dispatchMouseEvent",
                    json!({"type": "mouseMoved", "x": x, "y": y, "button": "none", "clickCount": 0}),
                )
                .await?;
            Ok::<(), ExecutorError>(())
        };
        match tokio::time::timeout(timeout, hover).await {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("identifier".into(), Value::String(identifier.to_string()));
                OperationResult::ok_with_data(format!("Hovered '{}'", identifier), data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("hover over '{}'", identifier),
                started,
            )),
        }
    }

    pub async fn wait_for(
        &self,
        identifier: &str,
        opts: Option<WaitForOptions>,
    ) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(
            timeout,
            self.wait_for_inner(identifier, opts.state, started, timeout),
        )
        .await
        {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("state".into(), Value::String(opts.state.as_str().to_string()));
                OperationResult::ok_with_data(
                    format!("'{}' reached state {}", identifier, opts.state.as_str()),
                    data,
                )
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("element '{}' to reach state {}", identifier, opts.state.as_str()),
                started,
            )),
        }
    }

    async fn wait_for_inner(
        &self,
        identifier: &str,
        state: WaitState,
        started: Instant,
        timeout: Duration,
    ) -> Result<()> {
        let tree = self.ensure_tree().await?;
        loop {
            let outcome = match resolver::resolve(self.session.as_ref(), &tree, identifier).await {
                Ok(el) => match state {
                    WaitState::Visible => self.probe(&el, JS_VISIBLE).await,
                    WaitState::Enabled => self.probe(&el, JS_ENABLED).await,
                    WaitState::Attached => self.probe(&el, JS_ATTACHED).await,
                    WaitState::Hidden => self.probe(&el, JS_VISIBLE).await.map(|v| !v),
                    WaitState::Detached => self.probe(&el, JS_ATTACHED).await.map(|v| !v),
                },
                // An element that is nowhere to be found is vacuously hidden
                // and detached.
                Err(ExecutorError::NotFound { .. }) => {
                    Ok(matches!(state, WaitState::Hidden | WaitState::Detached))
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(e),
            }
            if started.elapsed() + self.config.poll_interval >= timeout {
                return Err(ExecutorError::Timeout {
                    what: format!("element '{}' to reach state {}", identifier, state.as_str()),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    // ── Data verbs ─────────────────────────────────────────────────

    pub async fn extract(&self, opts: ExtractOptions) -> OperationResult {
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.extract_inner(&opts)).await {
            Ok(Ok(result)) => {
                let mut data = Map::new();
                data.insert("result".into(), result);
                OperationResult::ok_with_data(
                    format!("Extracted from '{}'", opts.selector),
                    data,
                )
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(
                format!("extract from '{}'", opts.selector),
                started,
            )),
        }
    }

    async fn extract_inner(&self, opts: &ExtractOptions) -> Result<Value> {
        if opts.selector.is_empty() {
            return Err(ExecutorError::InvalidArgument("selector is required".to_string()));
        }
        if matches!(opts.kind, ExtractKind::Attribute | ExtractKind::Property)
            && opts.attr.as_deref().unwrap_or("").is_empty()
        {
            return Err(ExecutorError::InvalidArgument(format!(
                "attr is required for type={}",
                if opts.kind == ExtractKind::Attribute { "attribute" } else { "property" }
            )));
        }

        let expr = build_extract_js(opts);
        let value = self.eval_value(&expr).await.map_err(|e| match e {
            ExecutorError::Precondition(m) => {
                ExecutorError::InvalidArgument(format!("selector evaluation failed: {}", m))
            }
            other => other,
        })?;

        if value.get("missing").and_then(|v| v.as_bool()) == Some(true) {
            return Err(ExecutorError::not_found(&opts.selector, &["css"]));
        }
        Ok(value.get("value").cloned().unwrap_or(Value::Null))
    }

    pub async fn screenshot(&self, opts: Option<ScreenshotOptions>) -> OperationResult {
        let opts = opts.unwrap_or_default();
        let timeout = effective_timeout(opts.timeout, self.config.operation_timeout);
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.screenshot_inner(&opts)).await {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err("screenshot".to_string(), started)),
        }
    }

    async fn screenshot_inner(&self, opts: &ScreenshotOptions) -> Result<OperationResult> {
        let mut params = json!({"format": opts.format.as_str()});
        if opts.format == ImageFormat::Jpeg {
            params["quality"] = Value::from(opts.quality);
        }
        if opts.full_page {
            let metrics = self.session.call("Page.getLayoutMetrics", json!({})).await?;
            let width = metrics
                .get("cssContentSize")
                .and_then(|s| s.get("width"))
                .and_then(|v| v.as_f64())
                .unwrap_or(1280.0);
            let height = metrics
                .get("cssContentSize")
                .and_then(|s| s.get("height"))
                .and_then(|v| v.as_f64())
                .unwrap_or(768.0);
            params["captureBeyondViewport"] = Value::Bool(true);
            params["clip"] = json!({"x": 0, "y": 0, "width": width, "height": height, "scale": 1});
        }

        let result = self.session.call("Page.captureScreenshot", params).await?;
        let payload = result
            .get("data")
            .and_then(|d| d.as_str())
            .ok_or_else(|| ExecutorError::Transport("screenshot returned no data".to_string()))?;

        use base64::Engine as _;
        let size = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map(|b| b.len())
            .unwrap_or(0);

        let mut data = Map::new();
        data.insert("data".into(), Value::String(payload.to_string()));
        data.insert("size".into(), Value::from(size));
        data.insert("format".into(), Value::String(opts.format.as_str().to_string()));
        Ok(OperationResult::ok_with_data(
            format!("Screenshot captured ({} bytes, {})", size, opts.format.as_str()),
            data,
        ))
    }

    pub async fn scroll(&self, direction: &str) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        let target = ScrollTarget::parse(direction);
        let scroll = async {
            match &target {
                ScrollTarget::Top => {
                    self.eval_value("window.scrollTo(0, 0)").await?;
                }
                ScrollTarget::Bottom => {
                    self.eval_value("window.scrollTo(0, document.body.scrollHeight)")
                        .await?;
                }
                ScrollTarget::Element(identifier) => {
                    let tree = self.ensure_tree().await?;
                    let el =
                        resolver::resolve(self.session.as_ref(), &tree, identifier).await?;
                    self.call_on(&el.object_id, JS_SCROLL_INTO_VIEW, vec![]).await?;
                }
            }
            Ok::<(), ExecutorError>(())
        };
        match tokio::time::timeout(timeout, scroll).await {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("direction".into(), Value::String(direction.to_string()));
                OperationResult::ok_with_data(format!("Scrolled to {}", direction), data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => {
                OperationResult::fail(&timeout_err(format!("scroll to {}", direction), started))
            }
        }
    }

    // ── Keyboard / script verbs ────────────────────────────────────

    pub async fn press_key(&self, key: &str) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.dispatch_key(key)).await {
            Ok(Ok(())) => {
                let mut data = Map::new();
                data.insert("key".into(), Value::String(key.to_string()));
                OperationResult::ok_with_data(format!("Pressed {}", key), data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err(format!("press '{}'", key), started)),
        }
    }

    pub async fn evaluate(&self, expression: &str) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.eval_value(expression)).await {
            Ok(Ok(value)) => {
                let mut data = Map::new();
                data.insert("result".into(), value);
                OperationResult::ok_with_data("Evaluated expression", data)
            }
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err("evaluate".to_string(), started)),
        }
    }

    // ── Observation verbs ──────────────────────────────────────────

    pub async fn get_page_info(&self) -> OperationResult {
        let timeout = self.config.operation_timeout;
        let _op = self.gate.lock().await;
        let started = Instant::now();

        let info = async {
            let (url, title) = self.page_location().await?;
            let mut data = Map::new();
            data.insert("url".into(), Value::String(url));
            data.insert("title".into(), Value::String(title));
            match self.ensure_tree().await {
                Ok(tree) => {
                    data.insert("tree".into(), Value::String(tree.to_text()));
                }
                Err(e) => tracing::warn!("tree extraction for page info failed: {}", e),
            }
            Ok::<Map<String, Value>, ExecutorError>(data)
        };
        match tokio::time::timeout(timeout, info).await {
            Ok(Ok(data)) => OperationResult::ok_with_data("Page info", data),
            Ok(Err(e)) => OperationResult::fail(&e),
            Err(_) => OperationResult::fail(&timeout_err("get page info".to_string(), started)),
        }
    }

    /// Always extracts a fresh snapshot and replaces the cache.
    pub async fn get_semantic_tree(&self) -> OperationResult {
        let _op = self.gate.lock().await;
        let started = Instant::now();

        match self.refresh_tree().await {
            Ok(tree) => {
                let mut data = Map::new();
                data.insert("tree".into(), Value::String(tree.to_text()));
                data.insert("outline".into(), Value::String(tree.to_outline()));
                data.insert("clickable_count".into(), Value::from(tree.clickable_count()));
                data.insert("input_count".into(), Value::from(tree.input_count()));
                OperationResult::ok_with_data(
                    format!(
                        "Semantic tree extracted in {}ms: {} clickable, {} inputs",
                        started.elapsed().as_millis(),
                        tree.clickable_count(),
                        tree.input_count()
                    ),
                    data,
                )
            }
            Err(e) => OperationResult::fail(&e),
        }
    }

    // ── Tree cache ─────────────────────────────────────────────────

    async fn ensure_tree(&self) -> Result<Arc<SemanticTree>> {
        if let Some(tree) = self.tree.lock().await.clone() {
            return Ok(tree);
        }
        self.refresh_tree().await
    }

    async fn refresh_tree(&self) -> Result<Arc<SemanticTree>> {
        // Invalidate first: a failed extraction must not leave a stale
        // snapshot behind.
        *self.tree.lock().await = None;
        let tree = Arc::new(
            extract_semantic_tree(&self.session, self.config.extraction_timeout).await?,
        );
        *self.tree.lock().await = Some(Arc::clone(&tree));
        Ok(tree)
    }

    // ── CDP helpers ────────────────────────────────────────────────

    async fn eval_value(&self, expression: &str) -> Result<Value> {
        let result = self
            .session
            .call(
                "Runtime.evaluate",
                json!({"expression": expression, "returnByValue": true, "awaitPromise": true}),
            )
            .await?;
        if let Some(exc) = result.get("exceptionDetails") {
            let msg = exc
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| exc.get("text").and_then(|v| v.as_str()))
                .unwrap_or("JavaScript exception");
            return Err(ExecutorError::Precondition(msg.to_string()));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn call_on(
        &self,
        object_id: &str,
        function: &str,
        arguments: Vec<Value>,
    ) -> Result<Value> {
        let result = self
            .session
            .call(
                "Runtime.callFunctionOn",
                json!({
                    "objectId": object_id,
                    "functionDeclaration": function,
                    "arguments": arguments,
                    "returnByValue": true,
                }),
            )
            .await?;
        if let Some(exc) = result.get("exceptionDetails") {
            let msg = exc
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|v| v.as_str())
                .or_else(|| exc.get("text").and_then(|v| v.as_str()))
                .unwrap_or("JavaScript exception");
            return Err(ExecutorError::Precondition(msg.to_string()));
        }
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn page_location(&self) -> Result<(String, String)> {
        let url = self
            .eval_value("window.location.href")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        let title = self
            .eval_value("document.title")
            .await?
            .as_str()
            .unwrap_or_default()
            .to_string();
        Ok((url, title))
    }

    /// Viewport-relative element center (correct for scrolled pages).
    async fn element_center(&self, el: &ResolvedElement) -> Result<(f64, f64)> {
        let value = self.call_on(&el.object_id, JS_CENTER, vec![]).await?;
        if value.is_null() {
            return Err(ExecutorError::Precondition(
                "element has no layout box (hidden or detached)".to_string(),
            ));
        }
        let x = value.get("x").and_then(|v| v.as_f64()).ok_or_else(|| {
            ExecutorError::Transport("element center missing x".to_string())
        })?;
        let y = value.get("y").and_then(|v| v.as_f64()).ok_or_else(|| {
            ExecutorError::Transport("element center missing y".to_string())
        })?;
        Ok((x, y))
    }

    async fn wait_predicate(
        &self,
        el: &ResolvedElement,
        predicate: &str,
        state: &str,
        identifier: &str,
        started: Instant,
        timeout: Duration,
    ) -> Result<()> {
        loop {
            if self.probe(el, predicate).await? {
                return Ok(());
            }
            if started.elapsed() + self.config.poll_interval >= timeout {
                return Err(ExecutorError::Timeout {
                    what: format!("element '{}' to become {}", identifier, state),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Evaluate a boolean predicate against an element. A failed call reads
    /// as `false`: a detached node's remote object is gone, which is exactly
    /// the not-yet-there case the pollers retry on.
    async fn probe(&self, el: &ResolvedElement, predicate: &str) -> Result<bool> {
        match self.call_on(&el.object_id, predicate, vec![]).await {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            Err(e) => {
                tracing::debug!("element probe failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn dispatch_key(&self, key: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('+').collect();
        let (modifiers, base_key) = if parts.len() > 1 {
            let mut mask: u64 = 0;
            for m in &parts[..parts.len() - 1] {
                mask |= match *m {
                    "Alt" => 1,
                    "Ctrl" | "Control" => 2,
                    "Meta" | "Cmd" | "Command" => 4,
                    "Shift" => 8,
                    _ => 0,
                };
            }
            (mask, parts[parts.len() - 1])
        } else {
            (0, key)
        };

        let key_code = match base_key {
            "Enter" => 13,
            "Tab" => 9,
            "Escape" => 27,
            "Backspace" => 8,
            "Delete" => 46,
            "ArrowUp" => 38,
            "ArrowDown" => 40,
            "ArrowLeft" => 37,
            "ArrowRight" => 39,
            "Home" => 36,
            "End" => 35,
            "PageUp" => 33,
            "PageDown" => 34,
            _ => base_key
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase() as i64)
                .unwrap_or(0),
        };

        self.session
            .call(
                "Input.dispatchKeyEvent",
                json!({
                    "type": "keyDown",
                    "key": base_key,
                    "code": base_key,
                    "windowsVirtualKeyCode": key_code,
                    "modifiers": modifiers,
                }),
            )
            .await?;

        // Printable characters with no Ctrl/Alt/Meta need a char event for
        // rich text editors and contenteditable.
        let is_printable = base_key.chars().count() == 1 && modifiers & (1 | 2 | 4) == 0;
        if is_printable {
            self.session
                .call(
                    "Input.dispatchKeyEvent",
                    json!({"type": "char", "key": base_key, "text": base_key, "modifiers": modifiers}),
                )
                .await?;
        }

        self.session
            .call(
                "Input.dispatchKeyEvent",
                json!({
                    "type": "keyUp",
                    "key": base_key,
                    "code": base_key,
                    "windowsVirtualKeyCode": key_code,
                    "modifiers": modifiers,
                }),
            )
            .await?;
        Ok(())
    }
}

fn timeout_err(what: String, started: Instant) -> ExecutorError {
    ExecutorError::Timeout {
        what,
        elapsed_ms: started.elapsed().as_millis() as u64,
    }
}

fn value_expr(var: &str, kind: ExtractKind, attr: Option<&str>) -> String {
    let attr_json = serde_json::to_string(attr.unwrap_or_default()).unwrap_or_default();
    match kind {
        ExtractKind::Text => format!("({var}.innerText || {var}.value || {var}.textContent || '').trim()"),
        ExtractKind::Html => format!("{var}.innerHTML"),
        ExtractKind::Attribute => format!("{var}.getAttribute({attr_json})"),
        ExtractKind::Property => format!("{var}[{attr_json}]"),
    }
}

fn build_extract_js(opts: &ExtractOptions) -> String {
    let sel = serde_json::to_string(&opts.selector).unwrap_or_default();
    if !opts.multiple {
        return format!(
            "(function() {{ const el = document.querySelector({sel}); if (!el) return {{ missing: true }}; return {{ value: {} }}; }})()",
            value_expr("el", opts.kind, opts.attr.as_deref())
        );
    }
    match &opts.fields {
        None => format!(
            "(function() {{ const els = Array.from(document.querySelectorAll({sel})); return {{ value: els.map(el => {}) }}; }})()",
            value_expr("el", opts.kind, opts.attr.as_deref())
        ),
        Some(fields) => {
            let row_fields: Vec<String> = fields
                .iter()
                .map(|f| {
                    let name = serde_json::to_string(&f.name).unwrap_or_default();
                    let fsel = serde_json::to_string(&f.selector).unwrap_or_default();
                    format!(
                        "[{name}]: (function() {{ const el = row.querySelector({fsel}); return el ? {} : null; }})()",
                        value_expr("el", f.kind, f.attr.as_deref())
                    )
                })
                .collect();
            format!(
                "(function() {{ const rows = Array.from(document.querySelectorAll({sel})); return {{ value: rows.map(row => ({{ {} }})) }}; }})()",
                row_fields.join(", ")
            )
        }
    }
}
