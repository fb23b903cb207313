//! Chrome DevTools Protocol adapter.
//!
//! Talks to a CDP target over its websocket endpoint (`Page.getFrameTree`,
//! `Accessibility.getFullAXTree`, `DOM.getDocument`) the way the Windows
//! adapter talks to UIA: one connection, cached property reads, a
//! recursive walk into [`crate::schema::CupNode`]. Target discovery uses the
//! `/json/list` HTTP endpoint (`ureq`, grounded in
//! a `net-json`-style feature stack), the
//! RPC itself rides `tokio-tungstenite` on a private current-thread runtime
//! so the adapter keeps the same synchronous `PlatformAdapter` surface as
//! every other backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;

use crate::actions::Action;
use crate::config::CupConfig;
use crate::errors::CupError;
use crate::roles::Role;
use crate::schema::{
    CaptureStats, CupNode, IdGenerator, NativeHandle, Platform, RefTable, ScreenInfo,
    WindowDescriptor,
};
use crate::states::State;

use super::PlatformAdapter;

/// Opaque handle to one accessibility node inside a CDP target, threaded
/// back through the ref table to the web action dispatcher.
#[derive(Debug, Clone)]
pub struct CdpHandle {
    pub target_id: String,
    pub backend_node_id: i64,
}

impl CdpHandle {
    /// Test-only placeholder handle; never produced by a real capture.
    pub fn dummy() -> Self {
        CdpHandle { target_id: String::new(), backend_node_id: 0 }
    }
}

/// One open target reported by `/json/list`.
#[derive(Debug, Clone)]
struct CdpTarget {
    id: String,
    title: String,
    url: String,
    ws_url: String,
}

pub struct WebAdapter {
    config: CupConfig,
    runtime: tokio::runtime::Runtime,
    msg_id: AtomicU64,
}

impl WebAdapter {
    pub fn new(config: CupConfig) -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build current-thread tokio runtime for CDP adapter");
        Self { config, runtime, msg_id: AtomicU64::new(1) }
    }

    fn http_base(&self) -> String {
        format!("http://{}:{}", self.config.cdp_host_or_default(), self.config.cdp_port_or_default())
    }

    fn list_targets(&self) -> Result<Vec<CdpTarget>, CupError> {
        let url = format!("{}/json/list", self.http_base());
        let body: Value = ureq::get(&url)
            .timeout(Duration::from_secs(5))
            .call()
            .map_err(|e| CupError::native(Platform::Web, format!("GET {url}: {e}")))?
            .into_json()
            .map_err(|e| CupError::native(Platform::Web, format!("malformed /json/list body: {e}")))?;

        let entries = body.as_array().cloned().unwrap_or_default();
        Ok(entries
            .into_iter()
            .filter(|e| e.get("type").and_then(Value::as_str) == Some("page"))
            .filter_map(|e| {
                Some(CdpTarget {
                    id: e.get("id")?.as_str()?.to_owned(),
                    title: e.get("title").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    url: e.get("url").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    ws_url: e.get("webSocketDebuggerUrl")?.as_str()?.to_owned(),
                })
            })
            .collect())
    }

    /// Round-trip a single CDP command against one target's websocket.
    fn send_command(&self, ws_url: &str, method: &str, params: Value) -> Result<Value, CupError> {
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
                    continue; // an unrelated event notification, keep waiting
                }
                if let Some(err) = parsed.get("error") {
                    return Err(CupError::native(Platform::Web, err.to_string()));
                }
                return Ok(parsed.get("result").cloned().unwrap_or(Value::Null));
            }
        })
    }

    fn target_to_window(&self, t: &CdpTarget, foreground: bool) -> WindowDescriptor {
        WindowDescriptor {
            handle: t.id.clone(),
            title: t.title.clone(),
            pid: None,
            bundle_id: None,
            foreground,
            bounds: None,
            url: Some(t.url.clone()),
        }
    }
}

impl PlatformAdapter for WebAdapter {
    fn platform_name(&self) -> Platform {
        Platform::Web
    }

    fn initialize(&self) -> Result<(), CupError> {
        self.list_targets().map(|_| ())
    }

    fn get_screen_info(&self) -> Result<ScreenInfo, CupError> {
        // A DOM document has no physical screen; report the first target's
        // viewport via `Page.getLayoutMetrics`, falling back to a common default.
        let targets = self.list_targets()?;
        let Some(t) = targets.first() else {
            return Ok(ScreenInfo::new(1280, 720, 1.0));
        };
        let metrics = self.send_command(&t.ws_url, "Page.getLayoutMetrics", json!({}))?;
        let css = metrics.get("cssContentSize");
        let w = css.and_then(|c| c.get("width")).and_then(Value::as_f64).unwrap_or(1280.0) as i32;
        let h = css.and_then(|c| c.get("height")).and_then(Value::as_f64).unwrap_or(720.0) as i32;
        Ok(ScreenInfo::new(w, h, 1.0))
    }

    fn get_foreground_window(&self) -> Result<WindowDescriptor, CupError> {
        self.list_targets()?
            .first()
            .map(|t| self.target_to_window(t, true))
            .ok_or_else(|| CupError::native(Platform::Web, "no open page targets".to_string()))
    }

    fn get_all_windows(&self) -> Result<Vec<WindowDescriptor>, CupError> {
        let targets = self.list_targets()?;
        Ok(targets
            .iter()
            .enumerate()
            .map(|(i, t)| self.target_to_window(t, i == 0))
            .collect())
    }

    fn get_window_list(&self) -> Result<Vec<WindowDescriptor>, CupError> {
        self.get_all_windows()
    }

    fn get_desktop_window(&self) -> Result<Option<WindowDescriptor>, CupError> {
        Ok(None) // a browser has no desktop surface
    }

    fn capture_tree(
        &self,
        windows: &[WindowDescriptor],
        max_depth: usize,
    ) -> Result<(CupNode, CaptureStats, RefTable), CupError> {
        let targets = self.list_targets()?;
        let ids = IdGenerator::new();
        let ref_table = RefTable::new();
        let mut stats = CaptureStats::default();

        let mut roots = Vec::with_capacity(windows.len());
        for win in windows {
            let Some(target) = targets.iter().find(|t| t.id == win.handle) else { continue };
            self.send_command(&target.ws_url, "Accessibility.enable", json!({}))?;
            let tree = self.send_command(&target.ws_url, "Accessibility.getFullAXTree", json!({}))?;
            let nodes = tree.get("nodes").and_then(Value::as_array).cloned().unwrap_or_default();

            let by_id: HashMap<String, &Value> = nodes
                .iter()
                .filter_map(|n| Some((n.get("nodeId")?.as_str()?.to_owned(), n)))
                .collect();
            let root_ax_id = nodes
                .iter()
                .find(|n| n.get("parentId").is_none())
                .and_then(|n| n.get("nodeId"))
                .and_then(Value::as_str)
                .map(str::to_owned);

            let window_root = root_ax_id.and_then(|rid| {
                build_cup_node(rid.as_str(), &by_id, target, &ids, &ref_table, 0, max_depth, &mut stats)
            });

            let mut root = window_root.unwrap_or_else(|| CupNode {
                id: ids.next(),
                role: Role::Window,
                name: win.title.clone(),
                description: None,
                value: None,
                bounds: None,
                states: Vec::new(),
                actions: Vec::new(),
                attributes: Default::default(),
                children: Vec::new(),
                platform: HashMap::new(),
            });
            root.role = Role::Window;
            if root.name.is_empty() {
                root.name = win.title.clone();
            }
            roots.push(root);
        }

        let synthetic_root = CupNode {
            id: IdGenerator::new().next(),
            role: Role::Desktop,
            name: "Web".into(),
            description: None,
            value: None,
            bounds: None,
            states: Vec::new(),
            actions: Vec::new(),
            attributes: Default::default(),
            children: roots,
            platform: HashMap::new(),
        };
        Ok((synthetic_root, stats, ref_table))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_cup_node(
    ax_node_id: &str,
    by_id: &HashMap<String, &Value>,
    target: &CdpTarget,
    ids: &IdGenerator,
    ref_table: &RefTable,
    depth: usize,
    max_depth: usize,
    stats: &mut CaptureStats,
) -> Option<CupNode> {
    let raw = *by_id.get(ax_node_id)?;
    if raw.get("ignored").and_then(Value::as_bool) == Some(true) {
        return None;
    }

    let role_str = raw
        .get("role")
        .and_then(|r| r.get("value"))
        .and_then(Value::as_str)
        .unwrap_or("generic");
    let role = map_ax_role(role_str);

    let name = raw
        .get("name")
        .and_then(|n| n.get("value"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let value = raw
        .get("value")
        .and_then(|v| v.get("value"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let mut states = Vec::new();
    if ax_property_bool(raw, "focused") {
        states.push(State::Focused);
    }
    if ax_property_bool(raw, "disabled") {
        states.push(State::Disabled);
    }
    if ax_property_bool(raw, "checked") {
        states.push(State::Checked);
    }
    if ax_property_bool(raw, "expanded") {
        states.push(State::Expanded);
    }
    if ax_property_bool(raw, "selected") {
        states.push(State::Selected);
    }
    if ax_property_bool(raw, "required") {
        states.push(State::Required);
    }
    if ax_property_bool(raw, "modal") {
        states.push(State::Modal);
    }
    if ax_property_bool(raw, "readonly") {
        states.push(State::Readonly);
    }
    if ax_property_bool(raw, "busy") {
        states.push(State::Busy);
    }
    if ax_property_bool(raw, "hidden") || ax_property_bool(raw, "invisible") {
        states.push(State::Hidden);
    }

    let mut actions = vec![Action::Focus];
    if matches!(
        role,
        Role::Button | Role::Link | Role::Menuitem | Role::Tab | Role::Checkbox | Role::Radio
    ) {
        actions.push(Action::Click);
    }
    if matches!(role, Role::Checkbox | Role::Switch) {
        actions.push(Action::Toggle);
    }
    if matches!(role, Role::Textbox | Role::Searchbox | Role::Combobox) {
        actions.push(Action::Type);
        actions.push(Action::Setvalue);
    }
    if matches!(role, Role::Option | Role::Listitem | Role::Treeitem | Role::Tab) {
        actions.push(Action::Select);
    }
    if matches!(role, Role::Scrollbar | Role::ScrollableRegion) {
        actions.push(Action::Scroll);
    }

    let backend_node_id = raw.get("backendDOMNodeId").and_then(Value::as_i64).unwrap_or(0);
    let id = ids.next();
    ref_table.insert(
        id,
        NativeHandle::Web(CdpHandle { target_id: target.id.clone(), backend_node_id }),
    );

    let children: Vec<CupNode> = if depth < max_depth {
        raw.get("childIds")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .filter_map(|cid| {
                        build_cup_node(cid, by_id, target, ids, ref_table, depth + 1, max_depth, stats)
                    })
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    stats.nodes += 1;
    stats.max_depth = stats.max_depth.max(depth);
    *stats.roles.entry(role.wire_name().to_owned()).or_insert(0) += 1;

    Some(CupNode {
        id,
        role,
        name,
        description: None,
        value,
        bounds: None,
        states,
        actions,
        attributes: Default::default(),
        children,
        platform: HashMap::from([("axNodeId".to_string(), json!(ax_node_id))]),
    })
}

fn ax_property_bool(raw: &Value, name: &str) -> bool {
    raw.get("properties")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|p| p.get("name").and_then(Value::as_str) == Some(name))
        .and_then(|p| p.get("value"))
        .and_then(|v| v.get("value"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Maps a CDP `AXValueType` role string onto the closed CUP role vocabulary.
fn map_ax_role(role: &str) -> Role {
    match role {
        "button" => Role::Button,
        "checkbox" => Role::Checkbox,
        "radio" => Role::Radio,
        "switch" => Role::Switch,
        "combobox" | "popupbutton" => Role::Combobox,
        "textbox" | "textfield" => Role::Textbox,
        "searchbox" => Role::Searchbox,
        "spinbutton" => Role::Spinbutton,
        "slider" => Role::Slider,
        "progressbar" => Role::Progressbar,
        "link" => Role::Link,
        "image" | "img" => Role::Image,
        "heading" => Role::Heading,
        "staticText" | "text" => Role::Text,
        "labelText" | "label" => Role::Label,
        "list" => Role::List,
        "listItem" => Role::Listitem,
        "listBox" => Role::Listbox,
        "option" => Role::Option,
        "menu" => Role::Menu,
        "menuBar" => Role::Menubar,
        "menuItem" => Role::Menuitem,
        "menuItemCheckBox" => Role::Menuitemcheckbox,
        "menuItemRadio" => Role::Menuitemradio,
        "tab" => Role::Tab,
        "tabList" => Role::Tablist,
        "tabPanel" => Role::Tabpanel,
        "table" => Role::Table,
        "row" => Role::Row,
        "cell" => Role::Cell,
        "columnHeader" => Role::Columnheader,
        "rowHeader" => Role::Rowheader,
        "grid" => Role::Grid,
        "gridCell" => Role::Gridcell,
        "tree" => Role::Tree,
        "treeItem" => Role::Treeitem,
        "treeGrid" => Role::Treegrid,
        "dialog" => Role::Dialog,
        "alertDialog" => Role::Alertdialog,
        "alert" => Role::Alert,
        "status" => Role::Status,
        "tooltip" => Role::Tooltip,
        "window" => Role::Window,
        "application" => Role::Application,
        "document" | "rootWebArea" => Role::Document,
        "article" => Role::Article,
        "main" => Role::Main,
        "navigation" => Role::Navigation,
        "search" => Role::Search,
        "banner" => Role::Banner,
        "complementary" => Role::Complementary,
        "contentInfo" => Role::Contentinfo,
        "form" => Role::Form,
        "region" => Role::Region,
        "group" => Role::Group,
        "separator" => Role::Separator,
        "scrollBar" => Role::Scrollbar,
        "toolbar" => Role::Toolbar,
        "video" => Role::Video,
        "audio" => Role::Audio,
        "iframe" | "iframePresentational" => Role::IframePresentational,
        "splitter" => Role::Splitter,
        "marquee" => Role::Marquee,
        "none" | "presentation" => Role::Presentation,
        _ => Role::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_ax_roles() {
        assert_eq!(map_ax_role("button"), Role::Button);
        assert_eq!(map_ax_role("rootWebArea"), Role::Document);
        assert_eq!(map_ax_role("totally-unknown-role"), Role::Generic);
    }

    #[test]
    fn cdp_handle_dummy_is_inert() {
        let h = CdpHandle::dummy();
        assert_eq!(h.backend_node_id, 0);
        assert!(h.target_id.is_empty());
    }
}
