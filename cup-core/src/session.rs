//! `Session`: the stateful orchestrator tying one platform's adapter and
//! dispatcher together behind a single API (spec §9). Translated from
//! the Session orchestrator -- construction picks a backend, `snapshot`
//! drives capture + shaping, `action`/`press`/`open_app` drive dispatch
//! against the most recent ref table, `find` searches the last raw tree
//! (auto-capturing the foreground window if none exists yet), and `batch`
//! runs a sequence of either with first-failure short-circuiting.

use std::thread;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::adapters::{get_adapter, PlatformAdapter};
use crate::dispatch::{
    get_dispatcher, parse_combo, resolve_modifier_only, ActionDispatcher, ActionRequest, ActionResult, Direction,
};
use crate::errors::CupError;
use crate::format::{self, Detail};
use crate::schema::{Bounds, CupNode, Envelope, NodeId, Platform, RefTable, Scope, WindowDescriptor};
use crate::search::{self, SearchQuery, SearchResult};

/// Options accepted by [`Session::snapshot`] (spec §9, `Session.snapshot`'s
/// keyword-only parameter set).
#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub scope: Scope,
    /// Title substring filter, `scope: Full` only.
    pub app: Option<String>,
    pub max_depth: usize,
    pub compact: bool,
    pub detail: Detail,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self { scope: Scope::Foreground, app: None, max_depth: 999, compact: true, detail: Detail::Compact }
    }
}

/// Either rendering of a capture, chosen by [`SnapshotOptions::compact`].
#[derive(Debug, Clone)]
pub enum Snapshot {
    Text(String),
    Envelope(Box<Envelope>),
}

impl Snapshot {
    pub fn into_text(self) -> Option<String> {
        match self {
            Snapshot::Text(t) => Some(t),
            Snapshot::Envelope(_) => None,
        }
    }

    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Snapshot::Envelope(e) => Some(*e),
            Snapshot::Text(_) => None,
        }
    }
}

/// One record in a [`Session::batch`] sequence (spec §4.5.3). Either an
/// element action (`element_id` + `action` + optional `text`/`combo`) or one
/// of the two pseudo-actions `"wait"` (needs `ms`) / `"press"` (needs
/// `combo`), mirroring the record shapes a batch runner
/// accepts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchItem {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    /// Required when `action` is `"scroll"` (spec §4.5.3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

struct CaptureState {
    ref_table: RefTable,
    raw_tree: CupNode,
}

/// A CUP session: one adapter/dispatcher pair plus the ref table and raw
/// tree from the most recent tree-walking capture (spec §9: "element ids
/// are only valid for the most recent capture").
pub struct Session {
    adapter: Box<dyn PlatformAdapter>,
    dispatcher: Box<dyn ActionDispatcher>,
    platform: Platform,
    state: RwLock<Option<CaptureState>>,
}

impl Session {
    /// Picks a backend via [`get_adapter`]/[`get_dispatcher`] -- `platform`
    /// overrides auto-detection, same as `Session(platform=...)`.
    pub fn new(platform: Option<Platform>) -> Result<Self, CupError> {
        let adapter = get_adapter(platform)?;
        let resolved = adapter.platform_name();
        let dispatcher = get_dispatcher(resolved)?;
        Ok(Self { adapter, dispatcher, platform: resolved, state: RwLock::new(None) })
    }

    /// Constructs a session around a pre-built adapter/dispatcher pair,
    /// bypassing platform auto-detection -- the seam tests use to run
    /// against an in-memory fake backend.
    pub fn with_backend(adapter: Box<dyn PlatformAdapter>, dispatcher: Box<dyn ActionDispatcher>) -> Self {
        let platform = adapter.platform_name();
        Self { adapter, dispatcher, platform, state: RwLock::new(None) }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Captures the accessibility tree per `opts.scope` (spec §9).
    pub fn snapshot(&self, opts: &SnapshotOptions) -> Result<Snapshot, CupError> {
        let screen = self.adapter.get_screen_info()?;

        if opts.scope == Scope::Overview {
            return self.overview_snapshot(opts, screen);
        }

        let (windows, app_name): (Vec<WindowDescriptor>, Option<String>) = match opts.scope {
            Scope::Foreground => {
                let win = self.adapter.get_foreground_window()?;
                let name = win.title.clone();
                (vec![win], Some(name))
            }
            Scope::Desktop => match self.adapter.get_desktop_window()? {
                Some(win) => (vec![win], Some("Desktop".to_string())),
                None => return self.overview_snapshot(opts, screen),
            },
            Scope::Full => {
                let mut all = self.adapter.get_all_windows()?;
                if let Some(filter) = &opts.app {
                    let filter_lower = filter.to_lowercase();
                    all.retain(|w| w.title.to_lowercase().contains(&filter_lower));
                }
                (all, None)
            }
            Scope::Overview => unreachable!("handled above"),
        };

        let (tree, stats, ref_table) = self.adapter.capture_tree(&windows, opts.max_depth)?;

        let envelope = format::build_envelope(
            self.platform,
            screen,
            opts.scope,
            app_name,
            tree.clone(),
            Some(windows),
            None,
        );

        let viewport = Bounds { x: 0, y: 0, w: screen.w, h: screen.h };
        let (shaped, counts) = format::prune_tree(&tree, viewport, opts.detail);

        *self.state.write() = Some(CaptureState { ref_table, raw_tree: tree });

        if opts.compact {
            Ok(Snapshot::Text(format::serialize_compact(&envelope, &shaped, &counts, stats.nodes)))
        } else {
            let mut envelope = envelope;
            envelope.tree = shaped;
            Ok(Snapshot::Envelope(Box::new(envelope)))
        }
    }

    fn overview_snapshot(&self, opts: &SnapshotOptions, screen: crate::schema::ScreenInfo) -> Result<Snapshot, CupError> {
        let window_list = self.adapter.get_window_list()?;
        let empty_tree = CupNode {
            id: NodeId(0),
            role: crate::roles::Role::Desktop,
            name: String::new(),
            description: None,
            value: None,
            bounds: None,
            states: Vec::new(),
            actions: Vec::new(),
            attributes: Default::default(),
            children: Vec::new(),
            platform: Default::default(),
        };
        let envelope =
            format::build_envelope(self.platform, screen, Scope::Overview, None, empty_tree, Some(window_list), None);
        if opts.compact {
            Ok(Snapshot::Text(format::serialize_overview(&envelope)))
        } else {
            Ok(Snapshot::Envelope(Box::new(envelope)))
        }
    }

    /// Dispatches `action` against `id` from the last capture (spec §9:
    /// element ids outlive exactly one capture).
    pub fn action(
        &self,
        id: NodeId,
        action: Action,
        text: Option<String>,
        combo: Option<String>,
        direction: Option<Direction>,
    ) -> Result<ActionResult, CupError> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or_else(|| {
            CupError::InvalidInput("no snapshot has been captured yet; call snapshot() first".into())
        })?;
        let handle = state.ref_table.get(id).ok_or(CupError::StaleReference(id))?;
        let request =
            ActionRequest { action: Some(action), id: Some(id), text, combo, app: None, millis: None, direction };
        request.validate()?;
        self.dispatcher.dispatch(&request, Some(&handle))
    }

    /// Sends a keyboard shortcut to the focused window, independent of any
    /// captured element (spec §4.5.1).
    pub fn press(&self, combo: &str) -> Result<ActionResult, CupError> {
        let parsed = resolve_modifier_only(parse_combo(combo)?);
        self.dispatcher.press_keys(&parsed)
    }

    /// Fuzzy-matches and launches an application, waiting for its window
    /// (spec §4.5.2).
    pub fn open_app(&self, name: &str) -> Result<ActionResult, CupError> {
        self.dispatcher.launch_app(name)
    }

    /// Searches the last captured raw tree (spec §4.4), auto-capturing the
    /// foreground window first if nothing has been captured yet (spec §9
    /// open question 2, resolved).
    pub fn find(&self, query: &SearchQuery) -> Result<Vec<SearchResult>, CupError> {
        if self.state.read().is_none() {
            self.snapshot(&SnapshotOptions { scope: Scope::Foreground, compact: true, ..Default::default() })?;
        }
        let guard = self.state.read();
        let state = guard.as_ref().expect("snapshot() above always populates state for non-overview scope");
        Ok(search::search_tree(&state.raw_tree, query))
    }

    /// Runs `items` in order, stopping at the first failed result (spec
    /// §4.5.3). `wait` sleeps for `ms` clamped to `[50, 5000]`; `press` sends
    /// `combo`; anything else is dispatched as an element action.
    pub fn batch(&self, items: &[BatchItem]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(items.len());

        for item in items {
            let result = match item.action.as_str() {
                "wait" => {
                    let ms = item.ms.unwrap_or(500).clamp(50, 5000);
                    thread::sleep(Duration::from_millis(ms));
                    ActionResult::ok(format!("waited {ms}ms"))
                }
                "press" => match item.combo.as_deref() {
                    Some(combo) => self.press(combo).unwrap_or_else(|e| ActionResult::fail(e.to_string())),
                    None => ActionResult::fail("press action requires 'combo'"),
                },
                other => {
                    let Some(id) = item.element_id else {
                        results.push(ActionResult::fail(format!("action '{other}' requires 'element_id'")));
                        break;
                    };
                    match Action::from_wire_name(other) {
                        Some(action) => self
                            .action(id, action, item.text.clone(), item.combo.clone(), item.direction)
                            .unwrap_or_else(|e| ActionResult::fail(e.to_string())),
                        None => ActionResult::fail(format!("unknown action '{other}'")),
                    }
                }
            };

            let success = result.success;
            results.push(result);
            if !success {
                break;
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::Role;
    use crate::schema::{CaptureStats, NativeHandle, ScreenInfo};
    use crate::states::State;

    /// An in-memory backend used only to exercise `Session` without a live
    /// OS accessibility tree.
    struct FakeAdapter;

    impl PlatformAdapter for FakeAdapter {
        fn platform_name(&self) -> Platform {
            Platform::Web
        }

        fn initialize(&self) -> Result<(), CupError> {
            Ok(())
        }

        fn get_screen_info(&self) -> Result<ScreenInfo, CupError> {
            Ok(ScreenInfo::new(1920, 1080, 1.0))
        }

        fn get_foreground_window(&self) -> Result<WindowDescriptor, CupError> {
            Ok(WindowDescriptor { handle: "w1".into(), title: "Fake App".into(), foreground: true, ..Default::default() })
        }

        fn get_all_windows(&self) -> Result<Vec<WindowDescriptor>, CupError> {
            Ok(vec![self.get_foreground_window()?])
        }

        fn get_window_list(&self) -> Result<Vec<WindowDescriptor>, CupError> {
            self.get_all_windows()
        }

        fn get_desktop_window(&self) -> Result<Option<WindowDescriptor>, CupError> {
            Ok(None)
        }

        fn capture_tree(
            &self,
            windows: &[WindowDescriptor],
            _max_depth: usize,
        ) -> Result<(CupNode, CaptureStats, RefTable), CupError> {
            let ref_table = RefTable::new();
            ref_table.insert(NodeId(1), NativeHandle::Web(crate::adapters::web::CdpHandle::dummy()));
            let button = CupNode {
                id: NodeId(1),
                role: Role::Button,
                name: "OK".into(),
                description: None,
                value: None,
                bounds: Some(Bounds { x: 0, y: 0, w: 10, h: 10 }),
                states: vec![State::Focused],
                actions: vec![Action::Click],
                attributes: Default::default(),
                children: Vec::new(),
                platform: Default::default(),
            };
            let root = CupNode {
                id: NodeId(0),
                role: Role::Window,
                name: windows.first().map(|w| w.title.clone()).unwrap_or_default(),
                description: None,
                value: None,
                bounds: None,
                states: Vec::new(),
                actions: Vec::new(),
                attributes: Default::default(),
                children: vec![button],
                platform: Default::default(),
            };
            let stats = CaptureStats { nodes: 2, max_depth: 1, roles: Default::default() };
            Ok((root, stats, ref_table))
        }
    }

    struct FakeDispatcher;

    impl ActionDispatcher for FakeDispatcher {
        fn platform_name(&self) -> Platform {
            Platform::Web
        }

        fn dispatch(&self, request: &ActionRequest, handle: Option<&NativeHandle>) -> Result<ActionResult, CupError> {
            if handle.is_none() {
                return Err(CupError::InvalidInput("missing handle".into()));
            }
            Ok(ActionResult::ok(format!("dispatched {:?}", request.action)))
        }

        fn press_keys(&self, combo: &crate::dispatch::ParsedCombo) -> Result<ActionResult, CupError> {
            Ok(ActionResult::ok(format!("pressed {:?}", combo.main_keys)))
        }

        fn launch_app(&self, query: &str) -> Result<ActionResult, CupError> {
            Ok(ActionResult::ok(format!("launched {query}")))
        }
    }

    fn fake_session() -> Session {
        Session::with_backend(Box::new(FakeAdapter), Box::new(FakeDispatcher))
    }

    #[test]
    fn snapshot_foreground_populates_state_for_later_action() {
        let session = fake_session();
        let snap = session.snapshot(&SnapshotOptions::default()).unwrap();
        let text = snap.into_text().unwrap();
        assert!(text.contains("OK"));

        let result = session.action(NodeId(1), Action::Click, None, None, None).unwrap();
        assert!(result.success);
    }

    #[test]
    fn action_without_prior_snapshot_errors() {
        let session = fake_session();
        let err = session.action(NodeId(1), Action::Click, None, None, None).unwrap_err();
        assert!(matches!(err, CupError::InvalidInput(_)));
    }

    #[test]
    fn action_with_stale_id_errors() {
        let session = fake_session();
        session.snapshot(&SnapshotOptions::default()).unwrap();
        let err = session.action(NodeId(999), Action::Click, None, None, None).unwrap_err();
        assert!(matches!(err, CupError::StaleReference(NodeId(999))));
    }

    #[test]
    fn find_auto_captures_when_nothing_snapshotted_yet() {
        let session = fake_session();
        let results = session.find(&SearchQuery { query: Some("OK".into()), ..SearchQuery::new() }).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].id, NodeId(1));
    }

    #[test]
    fn overview_scope_does_not_populate_state() {
        let session = fake_session();
        let opts = SnapshotOptions { scope: Scope::Overview, ..Default::default() };
        let snap = session.snapshot(&opts).unwrap();
        assert!(snap.into_text().unwrap().contains("Fake App"));
        assert!(session.state.read().is_none());
    }

    #[test]
    fn batch_stops_on_first_failure() {
        let session = fake_session();
        session.snapshot(&SnapshotOptions::default()).unwrap();

        let items = vec![
            BatchItem { action: "click".into(), element_id: Some(NodeId(1)), ..Default::default() },
            BatchItem { action: "click".into(), element_id: Some(NodeId(404)), ..Default::default() },
            BatchItem { action: "wait".into(), ms: Some(10), ..Default::default() },
        ];
        let results = session.batch(&items);
        assert_eq!(results.len(), 2);
        assert!(results[0].success);
        assert!(!results[1].success);
    }

    #[test]
    fn batch_press_pseudo_action() {
        let session = fake_session();
        let items = vec![BatchItem { action: "press".into(), combo: Some("ctrl+s".into()), ..Default::default() }];
        let results = session.batch(&items);
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
    }

    #[test]
    fn batch_wait_clamps_ms() {
        let session = fake_session();
        let items = vec![BatchItem { action: "wait".into(), ms: Some(1), ..Default::default() }];
        let results = session.batch(&items);
        assert!(results[0].message.contains("50ms"));
    }

    #[test]
    fn batch_scroll_requires_direction() {
        let session = fake_session();
        session.snapshot(&SnapshotOptions::default()).unwrap();

        let items = vec![BatchItem { action: "scroll".into(), element_id: Some(NodeId(1)), ..Default::default() }];
        let results = session.batch(&items);
        assert!(!results[0].success);
        assert!(results[0].message.contains("direction"));
    }

    #[test]
    fn batch_scroll_with_direction_succeeds() {
        let session = fake_session();
        session.snapshot(&SnapshotOptions::default()).unwrap();

        let items = vec![BatchItem {
            action: "scroll".into(),
            element_id: Some(NodeId(1)),
            direction: Some(Direction::Down),
            ..Default::default()
        }];
        let results = session.batch(&items);
        assert!(results[0].success);
    }
}
