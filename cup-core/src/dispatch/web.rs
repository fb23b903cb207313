//! CDP action dispatcher.
//!
//! Resolves a [`CdpHandle`] back to a live DOM object via `DOM.resolveNode`,
//! then drives it through `Runtime.callFunctionOn` for element-level actions
//! (`click()`, `focus()`, value assignment) and `Input.dispatchKeyEvent` for
//! keyboard combos -- the same connect-per-RPC shape
//! [`crate::adapters::web::WebAdapter`] uses, since `ActionDispatcher` and
//! `PlatformAdapter` are decoupled and neither holds a live websocket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use crate::adapters::web::CdpHandle;
use crate::config::CupConfig;
use crate::dispatch::launch::{fuzzy_match, AppCandidate};
use crate::dispatch::{
    resolve_modifier_only, ActionDispatcher, ActionRequest, ActionResult, Direction, Modifier, ParsedCombo,
};
use crate::errors::CupError;
use crate::schema::{NativeHandle, Platform};

pub struct WebDispatcher {
    config: CupConfig,
    runtime: tokio::runtime::Runtime,
    msg_id: AtomicU64,
}

impl WebDispatcher {
    pub fn new(config: CupConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build current-thread tokio runtime for CDP dispatcher");
        Self { config, runtime, msg_id: AtomicU64::new(1) }
    }

    fn ws_url_for_target(&self, target_id: &str) -> Result<String, CupError> {
        let url = format!(
            "http://{}:{}/json/list",
            self.config.cdp_host_or_default(),
            self.config.cdp_port_or_default()
        );
        let body: Value = ureq::get(&url)
            .timeout(Duration::from_secs(5))
            .call()
            .map_err(|e| CupError::native(Platform::Web, format!("GET {url}: {e}")))?
            .into_json()
            .map_err(|e| CupError::native(Platform::Web, format!("malformed /json/list body: {e}")))?;

        body.as_array()
            .into_iter()
            .flatten()
            .find(|e| e.get("id").and_then(Value::as_str) == Some(target_id))
            .and_then(|e| e.get("webSocketDebuggerUrl"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CupError::native(Platform::Web, format!("target '{target_id}' is no longer open")))
    }

    fn send(&self, ws_url: &str, method: &str, params: Value) -> Result<Value, CupError> {
        let id = self.msg_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({ "id": id, "method": method, "params": params });

        self.runtime.block_on(async {
            let (mut stream, _) = tokio_tungstenite::connect_async(ws_url)
                .await
                .map_err(|e| CupError::native(Platform::Web, format!("connect {ws_url}: {e}")))?;
            stream
                .send(Message::Text(request.to_string()))
                .await
                .map_err(|e| CupError::native(Platform::Web, format!("send: {e}")))?;

            loop {
                let msg = tokio::time::timeout(Duration::from_secs(10), stream.next())
                    .await
                    .map_err(|_| CupError::Timeout(format!("CDP {method} timed out")))?
                    .ok_or_else(|| CupError::native(Platform::Web, "websocket closed".to_string()))?
                    .map_err(|e| CupError::native(Platform::Web, format!("recv: {e}")))?;
                let Message::Text(text) = msg else { continue };
                let parsed: Value = serde_json::from_str(&text)?;
                if parsed.get("id").and_then(Value::as_u64) != Some(id) {
                    continue;
                }
                if let Some(err) = parsed.get("error") {
                    return Err(CupError::native(Platform::Web, err.to_string()));
                }
                return Ok(parsed.get("result").cloned().unwrap_or(Value::Null));
            }
        })
    }

    /// Resolves the node to a `Runtime` remote object id via `DOM.resolveNode`.
    fn object_id(&self, ws_url: &str, backend_node_id: i64) -> Result<String, CupError> {
        let result = self.send(ws_url, "DOM.resolveNode", json!({ "backendNodeId": backend_node_id }))?;
        result
            .get("object")
            .and_then(|o| o.get("objectId"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| CupError::native(Platform::Web, "DOM.resolveNode returned no objectId".to_string()))
    }

    fn call_on_node(&self, ws_url: &str, backend_node_id: i64, function: &str, args: Vec<Value>) -> Result<Value, CupError> {
        let object_id = self.object_id(ws_url, backend_node_id)?;
        self.send(
            ws_url,
            "Runtime.callFunctionOn",
            json!({
                "functionDeclaration": function,
                "objectId": object_id,
                "arguments": args.into_iter().map(|v| json!({ "value": v })).collect::<Vec<_>>(),
            }),
        )
    }
}

fn cdp_handle<'a>(handle: Option<&'a NativeHandle>) -> Result<&'a CdpHandle, CupError> {
    match handle {
        Some(NativeHandle::Web(h)) => Ok(h),
        Some(_) => Err(CupError::InvalidInput("handle does not belong to the web adapter".into())),
        None => Err(CupError::InvalidInput("action requires a captured node".into())),
    }
}

/// Maps one [`Modifier`] to the bitmask `Input.dispatchKeyEvent` expects.
fn modifier_bit(m: Modifier) -> u8 {
    match m {
        Modifier::Alt => 1,
        Modifier::Ctrl => 2,
        Modifier::Meta => 4,
        Modifier::Shift => 8,
    }
}

impl ActionDispatcher for WebDispatcher {
    fn platform_name(&self) -> Platform {
        Platform::Web
    }

    fn dispatch(&self, request: &ActionRequest, handle: Option<&NativeHandle>) -> Result<ActionResult, CupError> {
        let Some(action) = request.action else {
            return Ok(ActionResult::ok("wait"));
        };

        if action == crate::actions::Action::PressKeys {
            let combo = request
                .combo
                .as_deref()
                .ok_or_else(|| CupError::InvalidInput("press_keys requires 'combo'".into()))?;
            return self.press_keys(&resolve_modifier_only(crate::dispatch::parse_combo(combo)?));
        }

        let cdp = cdp_handle(handle)?;
        let ws_url = self.ws_url_for_target(&cdp.target_id)?;

        use crate::actions::Action;
        match action {
            Action::Click | Action::Doubleclick => {
                self.call_on_node(&ws_url, cdp.backend_node_id, "function() { this.click(); }", vec![])?;
                Ok(ActionResult::ok("clicked element"))
            }
            Action::Rightclick => {
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function() { this.dispatchEvent(new MouseEvent('contextmenu', {bubbles: true})); }",
                    vec![],
                )?;
                Ok(ActionResult::ok("dispatched contextmenu"))
            }
            Action::Longpress => {
                self.call_on_node(&ws_url, cdp.backend_node_id, "function() { this.click(); }", vec![])?;
                Ok(ActionResult::ok("clicked element (longpress approximated)"))
            }
            Action::Toggle => {
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function() { this.checked = !this.checked; this.dispatchEvent(new Event('change', {bubbles: true})); }",
                    vec![],
                )?;
                Ok(ActionResult::ok("toggled checkbox state"))
            }
            Action::Setvalue | Action::Type => {
                let text = request
                    .text
                    .as_deref()
                    .ok_or_else(|| CupError::InvalidInput(format!("{action} requires 'text'")))?;
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function(v) { this.focus(); this.value = v; this.dispatchEvent(new Event('input', {bubbles: true})); }",
                    vec![json!(text)],
                )?;
                Ok(ActionResult::ok(format!("set value to {} chars", text.chars().count())))
            }
            Action::Select => {
                self.call_on_node(&ws_url, cdp.backend_node_id, "function() { this.selected = true; }", vec![])?;
                Ok(ActionResult::ok("selected option"))
            }
            Action::Expand | Action::Collapse => {
                let expand = action == Action::Expand;
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function(v) { this.setAttribute('aria-expanded', v ? 'true' : 'false'); }",
                    vec![json!(expand)],
                )?;
                Ok(ActionResult::ok(format!("set aria-expanded={expand}")))
            }
            Action::Scroll => {
                let direction = request
                    .direction
                    .ok_or_else(|| CupError::InvalidInput("scroll requires 'direction'".into()))?;
                let (dx, dy) = match direction {
                    Direction::Up => (0, -120),
                    Direction::Down => (0, 120),
                    Direction::Left => (-120, 0),
                    Direction::Right => (120, 0),
                };
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function(dx, dy) { this.scrollBy ? this.scrollBy(dx, dy) : (this.scrollLeft += dx, this.scrollTop += dy); }",
                    vec![json!(dx), json!(dy)],
                )?;
                Ok(ActionResult::ok(format!("scrolled {direction}")))
            }
            Action::Increment | Action::Decrement => {
                let delta = if action == Action::Increment { 1 } else { -1 };
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function(d) { this.stepUp ? (d > 0 ? this.stepUp() : this.stepDown()) : (this.value = Number(this.value) + d); this.dispatchEvent(new Event('input', {bubbles: true})); }",
                    vec![json!(delta)],
                )?;
                Ok(ActionResult::ok(format!("stepped by {delta}")))
            }
            Action::Focus => {
                self.call_on_node(&ws_url, cdp.backend_node_id, "function() { this.focus(); }", vec![])?;
                Ok(ActionResult::ok("focused element"))
            }
            Action::Dismiss => {
                self.call_on_node(
                    &ws_url,
                    cdp.backend_node_id,
                    "function() { this.dispatchEvent(new KeyboardEvent('keydown', {key: 'Escape', bubbles: true})); }",
                    vec![],
                )?;
                Ok(ActionResult::ok("dispatched Escape"))
            }
            Action::PressKeys => unreachable!("handled above"),
        }
    }

    fn press_keys(&self, combo: &ParsedCombo) -> Result<ActionResult, CupError> {
        let modifiers: u8 = combo.modifiers.iter().map(|m| modifier_bit(*m)).fold(0, |a, b| a | b);
        let ws_url = {
            // Keyboard events have no element target; CDP requires a page to
            // dispatch against, so use whichever target is currently open.
            let url = format!(
                "http://{}:{}/json/list",
                self.config.cdp_host_or_default(),
                self.config.cdp_port_or_default()
            );
            let body: Value = ureq::get(&url)
                .timeout(Duration::from_secs(5))
                .call()
                .map_err(|e| CupError::native(Platform::Web, format!("GET {url}: {e}")))?
                .into_json()
                .map_err(|e| CupError::native(Platform::Web, e.to_string()))?;
            body.as_array()
                .into_iter()
                .flatten()
                .find_map(|e| e.get("webSocketDebuggerUrl").and_then(Value::as_str))
                .map(str::to_owned)
                .ok_or_else(|| CupError::native(Platform::Web, "no open page targets".to_string()))?
        };

        for key in &combo.main_keys {
            for kind in ["keyDown", "keyUp"] {
                self.send(
                    &ws_url,
                    "Input.dispatchKeyEvent",
                    json!({ "type": kind, "key": key, "modifiers": modifiers }),
                )?;
            }
        }
        Ok(ActionResult::ok(format!("sent {} key(s)", combo.main_keys.len())))
    }

    fn launch_app(&self, query: &str) -> Result<ActionResult, CupError> {
        // "Launching an app" on the web surface means opening a new tab via
        // `Target.createTarget` against a bookmarked/well-known URL.
        let candidates: Vec<AppCandidate> = Vec::new();
        if fuzzy_match(query, &candidates).is_none() {
            let url = format!(
                "http://{}:{}/json/new?{}",
                self.config.cdp_host_or_default(),
                self.config.cdp_port_or_default(),
                urlencode(query)
            );
            ureq::put(&url)
                .timeout(Duration::from_secs(5))
                .call()
                .map_err(|e| CupError::native(Platform::Web, format!("PUT {url}: {e}")))?;
        }
        Ok(ActionResult::ok(format!("opened '{query}'")))
    }
}

fn urlencode(s: &str) -> String {
    s.bytes()
        .map(|b| if b.is_ascii_alphanumeric() { (b as char).to_string() } else { format!("%{b:02X}") })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_bits_are_distinct_powers_of_two() {
        let bits: Vec<u8> = [Modifier::Alt, Modifier::Ctrl, Modifier::Meta, Modifier::Shift]
            .into_iter()
            .map(modifier_bit)
            .collect();
        for (i, a) in bits.iter().enumerate() {
            for b in &bits[i + 1..] {
                assert_eq!(a & b, 0);
            }
        }
    }

    #[test]
    fn urlencode_escapes_spaces() {
        assert_eq!(urlencode("a b"), "a%20b");
    }
}
