//! Shared test double: a scripted CDP session with canned responses and a
//! call log, standing in for a live browser.

#![allow(dead_code)]

use pagepilot::cdp::CdpSession;
use pagepilot::error::{ExecutorError, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

type Handler = Box<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

pub struct ScriptedSession {
    handlers: HashMap<String, Handler>,
    /// Events delivered immediately upon subscription.
    instant_events: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Value)>>,
    /// Subscriptions with no instant event are kept open (never fire).
    pending: Mutex<Vec<oneshot::Sender<Value>>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            instant_events: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn on(
        mut self,
        method: &str,
        handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.to_string(), Box::new(handler));
        self
    }

    pub fn respond(self, method: &str, value: Value) -> Self {
        self.on(method, move |_| Ok(value.clone()))
    }

    pub fn fire_on_subscribe(mut self, method: &str, params: Value) -> Self {
        self.instant_events.insert(method.to_string(), params);
        self
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// The last Accessibility-domain method invoked, if any.
    pub fn last_accessibility_call(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m.starts_with("Accessibility."))
            .map(|(m, _)| m.clone())
    }
}

impl CdpSession for ScriptedSession {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));
        match self.handlers.get(method) {
            Some(handler) => handler(&params),
            None => Ok(json!({})),
        }
    }

    async fn subscribe(&self, method: &str) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        match self.instant_events.get(method) {
            Some(v) => {
                let _ = tx.send(v.clone());
            }
            None => self.pending.lock().unwrap().push(tx),
        }
        rx
    }
}

/// Mutable knobs for the canned login page.
pub struct PageState {
    pub url: String,
    pub title: String,
    /// Object id a `document.querySelector` resolution should yield, None for no match.
    pub css_object: Option<String>,
    /// Object id a `document.evaluate` XPath resolution should yield.
    pub xpath_object: Option<String>,
    /// tagName reported for resolved elements.
    pub tag_name: String,
    pub element_visible: bool,
    /// Make getFullAXTree fail.
    pub ax_fail: bool,
    /// Canned `{ value | missing }` object for extract expressions.
    pub eval_result: Value,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            url: "https://example.test/login".to_string(),
            title: "Login".to_string(),
            css_object: None,
            xpath_object: None,
            tag_name: "select".to_string(),
            element_visible: true,
            ax_fail: false,
            eval_result: json!({"value": ""}),
        }
    }
}

fn remote_value(v: Value) -> Value {
    json!({"result": {"type": "string", "value": v}})
}

/// AX tree of the canned login page: a 登录 button, an Email textbox, and a
/// Help link with a static-text child.
pub fn ax_tree_fixture() -> Value {
    json!({
        "nodes": [
            {
                "nodeId": "1",
                "ignored": false,
                "role": {"type": "internalRole", "value": "RootWebArea"},
                "name": {"type": "computedString", "value": "Login Page"},
                "childIds": ["2", "3", "4"],
                "backendDOMNodeId": 100
            },
            {
                "nodeId": "2",
                "ignored": false,
                "role": {"type": "role", "value": "button"},
                "name": {"type": "computedString", "value": "登录"},
                "childIds": [],
                "backendDOMNodeId": 101,
                "parentId": "1"
            },
            {
                "nodeId": "3",
                "ignored": false,
                "role": {"type": "role", "value": "textbox"},
                "name": {"type": "computedString", "value": "Email"},
                "childIds": [],
                "backendDOMNodeId": 102,
                "parentId": "1"
            },
            {
                "nodeId": "4",
                "ignored": false,
                "role": {"type": "role", "value": "link"},
                "name": {"type": "computedString", "value": "Help"},
                "childIds": ["5"],
                "backendDOMNodeId": 103,
                "parentId": "1"
            },
            {
                "nodeId": "5",
                "ignored": false,
                "role": {"type": "role", "value": "StaticText"},
                "name": {"type": "computedString", "value": "Help center"},
                "childIds": [],
                "backendDOMNodeId": 104,
                "parentId": "4"
            }
        ]
    })
}

fn dom_fixture() -> Value {
    json!({
        "root": {
            "backendNodeId": 100,
            "attributes": [],
            "children": [
                {"backendNodeId": 101, "attributes": ["id", "login-btn", "type", "submit"]},
                {"backendNodeId": 102, "attributes": ["placeholder", "you@example.com", "name", "email"]},
                {"backendNodeId": 103, "attributes": ["href", "/help"]}
            ]
        }
    })
}

/// A session scripted as the canned login page, with AX-domain state
/// tracking: getFullAXTree fails unless the domain is currently enabled.
pub fn login_page_session(state: Arc<Mutex<PageState>>) -> ScriptedSession {
    let ax_enabled = Arc::new(Mutex::new(false));

    ScriptedSession::new()
        .on("Accessibility.enable", {
            let enabled = Arc::clone(&ax_enabled);
            move |_| {
                *enabled.lock().unwrap() = true;
                Ok(json!({}))
            }
        })
        .on("Accessibility.disable", {
            let enabled = Arc::clone(&ax_enabled);
            move |_| {
                *enabled.lock().unwrap() = false;
                Ok(json!({}))
            }
        })
        .on("Accessibility.getFullAXTree", {
            let enabled = Arc::clone(&ax_enabled);
            let state = Arc::clone(&state);
            move |_| {
                if state.lock().unwrap().ax_fail {
                    return Err(ExecutorError::Transport("AX backend gone".to_string()));
                }
                if !*enabled.lock().unwrap() {
                    return Err(ExecutorError::Transport(
                        "Accessibility domain not enabled".to_string(),
                    ));
                }
                Ok(ax_tree_fixture())
            }
        })
        .respond("DOM.getDocument", dom_fixture())
        .on("DOM.resolveNode", |params| {
            let id = params.get("backendNodeId").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!({"object": {"objectId": format!("obj-{}", id)}}))
        })
        .on("Runtime.evaluate", {
            let state = Arc::clone(&state);
            move |params| {
                let expr = params.get("expression").and_then(|v| v.as_str()).unwrap_or("");
                let state = state.lock().unwrap();
                if expr.contains("location.href") {
                    return Ok(remote_value(json!(state.url.clone())));
                }
                if expr.contains("document.title") {
                    return Ok(remote_value(json!(state.title.clone())));
                }
                if expr.starts_with("document.querySelector(") {
                    return Ok(match &state.css_object {
                        Some(id) => {
                            json!({"result": {"type": "object", "subtype": "node", "objectId": id}})
                        }
                        None => json!({"result": {"type": "object", "subtype": "null", "value": null}}),
                    });
                }
                if expr.starts_with("document.evaluate(") {
                    return Ok(match &state.xpath_object {
                        Some(id) => {
                            json!({"result": {"type": "object", "subtype": "node", "objectId": id}})
                        }
                        None => json!({"result": {"type": "object", "subtype": "null", "value": null}}),
                    });
                }
                if expr.starts_with("(function()") {
                    return Ok(json!({"result": {"type": "object", "value": state.eval_result.clone()}}));
                }
                Ok(remote_value(json!(null)))
            }
        })
        .on("Runtime.callFunctionOn", {
            let state = Arc::clone(&state);
            move |params| {
                let f = params
                    .get("functionDeclaration")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let state = state.lock().unwrap();
                let value = if f.contains("scrollIntoView") {
                    json!(null)
                } else if f.contains("getComputedStyle") {
                    json!(state.element_visible)
                } else if f.contains("!this.disabled") {
                    json!(true)
                } else if f.contains("rect.left + rect.width / 2") {
                    if state.element_visible {
                        json!({"x": 100.0, "y": 50.0})
                    } else {
                        json!(null)
                    }
                } else if f.contains("isConnected") {
                    json!(true)
                } else if f.contains("tagName") {
                    json!(state.tag_name.clone())
                } else if f.contains("this.options") {
                    json!(true)
                } else if f.contains("HTMLTextAreaElement") {
                    json!(true)
                } else {
                    json!(null)
                };
                Ok(json!({"result": {"type": "object", "value": value}}))
            }
        })
        .respond("Page.navigate", json!({"frameId": "frame-1"}))
        .respond("Page.captureScreenshot", json!({"data": "aGVsbG8gd29ybGQ="}))
        .respond(
            "Page.getNavigationHistory",
            json!({"currentIndex": 1, "entries": [
                {"id": 11, "url": "https://example.test/"},
                {"id": 12, "url": "https://example.test/login"}
            ]}),
        )
        .fire_on_subscribe("Page.loadEventFired", json!({}))
        .fire_on_subscribe("Page.domContentEventFired", json!({}))
        .fire_on_subscribe("Page.frameNavigated", json!({"frame": {"id": "frame-1"}}))
}
