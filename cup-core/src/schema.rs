//! The CUP data model: nodes, envelopes, ref tables, window descriptors.
//!
//! Mirrors the wire shapes and the schema described in
//! spec §3. Every type here round-trips through `serde_json` exactly as the
//! envelope/compact-text contracts in §6 require.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::roles::Role;
use crate::states::State;

/// Opaque per-capture node id, wire format `e<nonneg-integer>`.
///
/// Ids are strictly monotonic within one capture and guaranteed stale the
/// moment the next capture replaces the ref table (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix('e').ok_or(ParseNodeIdError)?;
        rest.parse::<u32>().map(NodeId).map_err(|_| ParseNodeIdError)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseNodeIdError;

impl fmt::Display for ParseNodeIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node id must match ^e\\d+$")
    }
}

impl std::error::Error for ParseNodeIdError {}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Monotonic id generator, one per capture (spec §5: "one atomic id-generator").
#[derive(Debug, Default)]
pub struct IdGenerator(AtomicU32);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn next(&self) -> NodeId {
        NodeId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// Screen-pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bounds {
    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Intersection of two rects, `None` if they don't overlap.
    pub fn intersect(&self, other: &Bounds) -> Option<Bounds> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.w).min(other.x + other.w);
        let y2 = (self.y + self.h).min(other.y + other.h);
        if x2 <= x1 || y2 <= y1 {
            None
        } else {
            Some(Bounds {
                x: x1,
                y: y1,
                w: x2 - x1,
                h: y2 - y1,
            })
        }
    }

    pub fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.x + self.w && py >= self.y && py < self.y + self.h
    }
}

/// Recognised scalar attributes (spec §3). Kept as a struct of `Option`s
/// rather than an open map, since the set is closed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Attributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(rename = "valueMin", skip_serializing_if = "Option::is_none")]
    pub value_min: Option<f64>,
    #[serde(rename = "valueMax", skip_serializing_if = "Option::is_none")]
    pub value_max: Option<f64>,
    #[serde(rename = "valueNow", skip_serializing_if = "Option::is_none")]
    pub value_now: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autocomplete: Option<String>,
}

impl Attributes {
    pub fn is_empty(&self) -> bool {
        self.level.is_none()
            && self.placeholder.is_none()
            && self.value_min.is_none()
            && self.value_max.is_none()
            && self.value_now.is_none()
            && self.orientation.is_none()
            && self.url.is_none()
            && self.autocomplete.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A single CUP node — the atomic unit of the accessibility tree (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CupNode {
    pub id: NodeId,
    pub role: Role,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    pub states: Vec<State>,
    pub actions: Vec<Action>,
    #[serde(skip_serializing_if = "Attributes::is_empty", default)]
    pub attributes: Attributes,
    pub children: Vec<CupNode>,
    /// Raw native identifiers, preserved for debugging (spec §3: "per-platform scalar map").
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub platform: HashMap<String, serde_json::Value>,
}

impl CupNode {
    /// Truncates `name`/`description`/`value` to the 200-char ceiling from
    /// spec §3 before a node is considered emitted.
    pub fn truncate_fields(&mut self) {
        truncate_in_place(&mut self.name, 200);
        if let Some(d) = &mut self.description {
            truncate_in_place(d, 200);
        }
        if let Some(v) = &mut self.value {
            truncate_in_place(v, 200);
        }
    }

    pub fn has_state(&self, s: State) -> bool {
        self.states.contains(&s)
    }

    pub fn has_action(&self, a: Action) -> bool {
        self.actions.contains(&a)
    }

    /// True when the node has at least one action besides `focus` — the
    /// "interactive" predicate used by pruning and scoring.
    pub fn is_interactive(&self) -> bool {
        self.actions.iter().any(|a| *a != Action::Focus)
    }
}

pub fn truncate_in_place(s: &mut String, max_chars: usize) {
    if s.chars().count() > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        *s = truncated;
    }
}

/// Per-capture statistics (spec §4.1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureStats {
    pub nodes: usize,
    pub max_depth: usize,
    pub roles: HashMap<String, usize>,
}

/// Which windows a capture covers (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Overview,
    Foreground,
    Desktop,
    Full,
}

/// Supported accessibility backends (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    Web,
    Android,
    Ios,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Web => "web",
            Platform::Android => "android",
            Platform::Ios => "ios",
        };
        write!(f, "{s}")
    }
}

/// Platform-opaque handle to a native element; the payload stored in the ref
/// table and threaded through to the action dispatcher.
#[derive(Debug, Clone)]
pub enum NativeHandle {
    #[cfg(windows)]
    Windows(crate::adapters::windows::UiaHandle),
    #[cfg(target_os = "macos")]
    Macos(crate::adapters::macos::AxHandle),
    #[cfg(target_os = "linux")]
    Linux(crate::adapters::linux::AtspiHandle),
    Web(crate::adapters::web::CdpHandle),
}

/// Mapping id -> native element handle (spec §3 "Ref table").
///
/// Invariants upheld by `Session`/adapters, not by this type itself: every
/// tree id appears exactly once; ids are strictly monotonic; the whole
/// table is discarded and rebuilt on every capture.
#[derive(Debug, Default)]
pub struct RefTable {
    map: parking_lot::Mutex<HashMap<NodeId, NativeHandle>>,
}

impl RefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: NodeId, handle: NativeHandle) {
        self.map.lock().insert(id, handle);
    }

    pub fn get(&self, id: NodeId) -> Option<NativeHandle> {
        self.map.lock().get(&id).cloned()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.map.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A top-level window (spec §3 "Window descriptor").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowDescriptor {
    /// Platform-opaque handle, stringified for the wire (e.g. an HWND as
    /// decimal, an AXUIElement pointer address, a CDP targetId).
    pub handle: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(rename = "bundleId", skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub foreground: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Screen geometry of the primary display (spec §3, §4.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub w: i32,
    pub h: i32,
    /// Omitted from the wire form when exactly 1.0 (spec §6).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
}

impl ScreenInfo {
    pub fn new(w: i32, h: i32, scale: f64) -> Self {
        let scale = if (scale - 1.0).abs() < f64::EPSILON {
            None
        } else {
            Some(scale)
        };
        Self { w, h, scale }
    }
}

/// The top-level capture result (spec §3 "Envelope").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    pub version: String,
    pub platform: Platform,
    /// Unix epoch milliseconds.
    pub timestamp: u64,
    pub screen: ScreenInfo,
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    pub tree: CupNode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<WindowDescriptor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

pub const CUP_VERSION: &str = "0.1.0";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_and_parse_roundtrip() {
        let id = NodeId(42);
        assert_eq!(id.to_string(), "e42");
        assert_eq!("e42".parse::<NodeId>().unwrap(), id);
    }

    #[test]
    fn node_id_rejects_bad_format() {
        assert!("42".parse::<NodeId>().is_err());
        assert!("ex".parse::<NodeId>().is_err());
    }

    #[test]
    fn node_id_serializes_as_wire_string() {
        let id = NodeId(7);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"e7\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn id_generator_is_strictly_monotonic() {
        let gen = IdGenerator::new();
        let ids: Vec<_> = (0..5).map(|_| gen.next().0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn bounds_intersect_disjoint_is_none() {
        let a = Bounds { x: 0, y: 0, w: 10, h: 10 };
        let b = Bounds { x: 20, y: 20, w: 5, h: 5 };
        assert!(a.intersect(&b).is_none());
    }

    #[test]
    fn bounds_intersect_overlap() {
        let a = Bounds { x: 0, y: 0, w: 10, h: 10 };
        let b = Bounds { x: 5, y: 5, w: 10, h: 10 };
        let i = a.intersect(&b).unwrap();
        assert_eq!(i, Bounds { x: 5, y: 5, w: 5, h: 5 });
    }

    #[test]
    fn screen_info_omits_scale_when_one() {
        let s = ScreenInfo::new(1920, 1080, 1.0);
        let json = serde_json::to_string(&s).unwrap();
        assert!(!json.contains("scale"));
        let s2 = ScreenInfo::new(1920, 1080, 2.0);
        let json2 = serde_json::to_string(&s2).unwrap();
        assert!(json2.contains("\"scale\":2.0"));
    }

    #[test]
    fn truncate_in_place_respects_char_count() {
        let mut s = "a".repeat(250);
        truncate_in_place(&mut s, 200);
        assert_eq!(s.chars().count(), 200);
    }

    #[test]
    fn ref_table_round_trips_an_entry() {
        let t = RefTable::new();
        assert!(!t.contains(NodeId(0)));
        t.insert(NodeId(0), NativeHandle::Web(crate::adapters::web::CdpHandle::dummy()));
        assert!(t.contains(NodeId(0)));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn envelope_rejects_unknown_top_level_key() {
        let json = r#"{
            "version": "0.1.0",
            "platform": "web",
            "timestamp": 0,
            "screen": {"w": 1920, "h": 1080},
            "scope": "foreground",
            "tree": {
                "id": "e0", "role": "window", "name": "",
                "states": [], "actions": [], "children": []
            },
            "bogus": "nope"
        }"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }

    #[test]
    fn cup_node_rejects_unknown_key() {
        let json = r#"{
            "id": "e0", "role": "window", "name": "",
            "states": [], "actions": [], "children": [],
            "unexpectedField": 1
        }"#;
        assert!(serde_json::from_str::<CupNode>(json).is_err());
    }
}
