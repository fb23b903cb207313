//! The tree-shaping engine: prune, hoist, viewport-clip, and serialise a raw
//! capture into the compact text agents consume (spec §4.3, bit-exact
//! contract in §6), keeping fixed constants
//! (truncation lengths, output ceiling) and rule order exactly.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::actions::Action;
use crate::roles::Role;
use crate::schema::{
    Bounds, CupNode, Envelope, NodeId, Platform, ScreenInfo, Scope, WindowDescriptor, CUP_VERSION,
};
use crate::states::State;

pub const MAX_OUTPUT_CHARS: usize = 40_000;
const NAME_TRUNCATE: usize = 80;
const VALUE_TRUNCATE: usize = 120;

/// `full` bypasses pruning entirely and returns a deep clone (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detail {
    Compact,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClipDirection {
    Above,
    Below,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClipCounts {
    pub above: usize,
    pub below: usize,
    pub left: usize,
    pub right: usize,
}

impl ClipCounts {
    fn increment(&mut self, dir: ClipDirection) {
        match dir {
            ClipDirection::Above => self.above += 1,
            ClipDirection::Below => self.below += 1,
            ClipDirection::Left => self.left += 1,
            ClipDirection::Right => self.right += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.above + self.below + self.left + self.right
    }

    /// `"down"`, `"up, right"`, etc. — fixed order above/below/left/right.
    pub fn directions_label(&self) -> String {
        let mut parts = vec![];
        if self.above > 0 {
            parts.push("up");
        }
        if self.below > 0 {
            parts.push("down");
        }
        if self.left > 0 {
            parts.push("left");
        }
        if self.right > 0 {
            parts.push("right");
        }
        parts.join(", ")
    }
}

/// Structural pruning, independent of viewport. Bottom-up: children are
/// pruned (and may vanish, multiply via hoisting, or collapse) before the
/// parent's own rules are evaluated.
fn prune_structural(node: &CupNode) -> Vec<CupNode> {
    // Rule: drop subtree outright for purely decorative roles.
    if matches!(
        node.role,
        Role::Scrollbar | Role::Separator | Role::Titlebar | Role::Tooltip | Role::Status
    ) {
        return vec![];
    }
    // Rule: zero-area bounds.
    if let Some(b) = node.bounds {
        if b.is_empty() {
            return vec![];
        }
    }
    // Rule: offscreen with no non-focus action.
    if node.has_state(State::Offscreen) && !node.is_interactive() {
        return vec![];
    }
    // Rule: empty-named image or text.
    if node.role == Role::Image && node.name.is_empty() {
        return vec![];
    }
    if node.role == Role::Text && node.name.is_empty() {
        return vec![];
    }

    let mut children: Vec<CupNode> = Vec::new();
    for child in &node.children {
        children.extend(prune_structural(child));
    }

    // Rule: drop a lone `text` child of a named parent (redundant label).
    if !node.name.is_empty() && children.len() == 1 && children[0].role == Role::Text {
        children.clear();
    }

    // Rule: unnamed `generic` or `region` hoists its children in place,
    // regardless of how many survived (0, 1, or many).
    if (node.role == Role::Generic || node.role == Role::Region) && node.name.is_empty() {
        return children;
    }
    // Rule: unnamed, non-interactive `group` hoists too.
    if node.role == Role::Group && node.name.is_empty() && !node.is_interactive() {
        return children;
    }

    // Rule: unnamed, non-interactive landmark wrapper with exactly one
    // surviving child collapses into that child. `region` is included in
    // the source rule table but can never actually reach this branch — an
    // unnamed region already returned via the rule above.
    const COLLAPSIBLE: &[Role] = &[
        Role::Region,
        Role::Document,
        Role::Main,
        Role::Complementary,
        Role::Navigation,
        Role::Search,
        Role::Banner,
        Role::Contentinfo,
        Role::Form,
    ];
    if node.name.is_empty()
        && !node.is_interactive()
        && COLLAPSIBLE.contains(&node.role)
        && children.len() == 1
    {
        return children;
    }

    let mut out = node.clone();
    out.children = children;
    vec![out]
}

fn direction_of(child: Bounds, viewport: Bounds) -> ClipDirection {
    if child.y + child.h <= viewport.y {
        ClipDirection::Above
    } else if child.y >= viewport.y + viewport.h {
        ClipDirection::Below
    } else if child.x + child.w <= viewport.x {
        ClipDirection::Left
    } else if child.x >= viewport.x + viewport.w {
        ClipDirection::Right
    } else {
        ClipDirection::Below
    }
}

/// Second pass over the structurally-pruned tree: clips children whose
/// bounds fall entirely outside the active viewport. The active viewport
/// narrows to `intersect(bounds, inherited)` at any node with the `scroll`
/// action; counts are attributed only to that scrollable ancestor (spec §9
/// open question, resolved: "counted only at the scrollable ancestor" — if
/// there is none, clipping against the bare screen rect drops silently).
fn clip_viewport(
    mut node: CupNode,
    viewport: Bounds,
    owner: Option<NodeId>,
    counts: &mut HashMap<NodeId, ClipCounts>,
) -> CupNode {
    let (effective_viewport, new_owner) = if node.has_action(Action::Scroll) {
        if let Some(b) = node.bounds {
            (viewport.intersect(&b).unwrap_or(Bounds { x: 0, y: 0, w: 0, h: 0 }), Some(node.id))
        } else {
            (viewport, owner)
        }
    } else {
        (viewport, owner)
    };

    let mut kept = Vec::with_capacity(node.children.len());
    for child in std::mem::take(&mut node.children) {
        if let Some(cb) = child.bounds {
            if cb.intersect(&effective_viewport).is_none() {
                if let Some(owner_id) = new_owner {
                    let dir = direction_of(cb, effective_viewport);
                    counts.entry(owner_id).or_default().increment(dir);
                }
                continue;
            }
        }
        kept.push(clip_viewport(child, effective_viewport, new_owner, counts));
    }
    node.children = kept;
    node
}

/// Runs the full shaping pass: structural pruning then viewport clipping.
/// At `Detail::Full`, returns a deep clone with no shaping applied at all.
pub fn prune_tree(
    root: &CupNode,
    screen_viewport: Bounds,
    detail: Detail,
) -> (CupNode, HashMap<NodeId, ClipCounts>) {
    if detail == Detail::Full {
        return (root.clone(), HashMap::new());
    }
    let mut pruned = prune_structural(root);
    let structural_root = pruned.pop().unwrap_or_else(|| root.clone());
    let mut counts = HashMap::new();
    let clipped = clip_viewport(structural_root, screen_viewport, None, &mut counts);
    (clipped, counts)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn truncate_display(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}...")
    }
}

fn attr_shorts(node: &CupNode) -> String {
    let a = &node.attributes;
    let mut parts = vec![];
    if let Some(l) = a.level {
        parts.push(format!("lvl={l}"));
    }
    if let Some(p) = &a.placeholder {
        parts.push(format!("ph=\"{}\"", escape(&truncate_display(p, 30))));
    }
    if a.value_min.is_some() || a.value_max.is_some() || a.value_now.is_some() {
        let min = a.value_min.map(|v| v.to_string()).unwrap_or_default();
        let max = a.value_max.map(|v| v.to_string()).unwrap_or_default();
        let now = a.value_now.map(|v| v.to_string()).unwrap_or_default();
        parts.push(format!("rng={now}/{min}-{max}"));
    }
    if let Some(o) = a.orientation {
        parts.push(match o {
            crate::schema::Orientation::Horizontal => "ori=h".to_string(),
            crate::schema::Orientation::Vertical => "ori=v".to_string(),
        });
    }
    if let Some(u) = &a.url {
        parts.push(format!("url=\"{}\"", escape(&truncate_display(u, 500))));
    }
    if let Some(ac) = &a.autocomplete {
        parts.push(format!("ac={ac}"));
    }
    parts.join(" ")
}

fn format_line(node: &CupNode, depth: usize) -> String {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}[{}] {}", node.id, node.role.short_code());

    if !node.name.is_empty() {
        line.push_str(&format!(" \"{}\"", escape(&truncate_display(&node.name, NAME_TRUNCATE))));
    }

    // Bounds appear only for interactive nodes (at least one non-focus action).
    if node.is_interactive() {
        if let Some(b) = node.bounds {
            line.push_str(&format!(" [{},{} {}x{}]", b.x, b.y, b.w, b.h));
        }
    }

    if !node.states.is_empty() {
        let codes: Vec<_> = node.states.iter().map(|s| s.short_code()).collect();
        line.push_str(&format!(" {{{}}}", codes.join(",")));
    }

    if !node.actions.is_empty() {
        let codes: Vec<_> = node.actions.iter().map(|a| a.short_code()).collect();
        line.push_str(&format!(" [{}]", codes.join(",")));
    }

    if let Some(v) = &node.value {
        if !v.is_empty() {
            line.push_str(&format!(" val=\"{}\"", escape(&truncate_display(v, VALUE_TRUNCATE))));
        }
    }

    let attrs = attr_shorts(node);
    if !attrs.is_empty() {
        line.push_str(&format!(" ({attrs})"));
    }

    line
}

fn emit_compact(node: &CupNode, depth: usize, counts: &HashMap<NodeId, ClipCounts>, out: &mut Vec<String>) {
    out.push(format_line(node, depth));
    for child in &node.children {
        emit_compact(child, depth + 1, counts, out);
    }
    if let Some(c) = counts.get(&node.id) {
        if c.total() > 0 {
            out.push(format!(
                "{}# {} more items — scroll {}",
                "  ".repeat(depth + 1),
                c.total(),
                c.directions_label()
            ));
        }
    }
}

/// Counts every node in a raw tree, for the "before" half of the node-count
/// header.
pub fn count_nodes(node: &CupNode) -> usize {
    1 + node.children.iter().map(count_nodes).sum::<usize>()
}

/// Serialises a (possibly already-shaped) tree into the compact text
/// grammar (spec §4.3/§6), truncating at [`MAX_OUTPUT_CHARS`] on a line
/// boundary with a trailing diagnostic.
pub fn serialize_compact(
    envelope: &Envelope,
    shaped: &CupNode,
    counts: &HashMap<NodeId, ClipCounts>,
    raw_node_count: usize,
) -> String {
    let mut lines = vec![format!(
        "# CUP {} | {} | {}x{}",
        envelope.version, envelope.platform, envelope.screen.w, envelope.screen.h
    )];
    if let Some(app) = &envelope.app {
        lines.push(format!("# app: {app}"));
    }
    let pruned_count = count_nodes(shaped);
    lines.push(format!("# nodes: {raw_node_count} -> {pruned_count}"));
    if let Some(windows) = &envelope.windows {
        for w in windows {
            lines.push(format!("# window: {}", w.title));
        }
    }

    emit_compact(shaped, 0, counts, &mut lines);

    let mut output = lines.join("\n");
    if output.chars().count() > MAX_OUTPUT_CHARS {
        let mut truncated = String::new();
        let mut last_newline_end = 0usize;
        for (i, ch) in output.char_indices() {
            if i >= MAX_OUTPUT_CHARS {
                break;
            }
            truncated.push(ch);
            if ch == '\n' {
                last_newline_end = truncated.len();
            }
        }
        truncated.truncate(last_newline_end);
        truncated.push_str("# truncated: output exceeded 40000 characters\n");
        output = truncated;
    }
    output
}

/// Window-list-only serialiser, no tree walk (spec §4.3, §6).
pub fn serialize_overview(envelope: &Envelope) -> String {
    let mut lines = vec![format!(
        "# CUP {} | {} | {}x{}",
        envelope.version, envelope.platform, envelope.screen.w, envelope.screen.h
    )];
    if let Some(windows) = &envelope.windows {
        for w in windows {
            let mut line = String::new();
            if w.foreground {
                line.push_str("[*] ");
            }
            line.push_str(&w.title);
            if let Some(pid) = w.pid {
                line.push_str(&format!(" (pid:{pid})"));
            }
            if let Some(b) = w.bounds {
                line.push_str(&format!(" @{},{} {}x{}", b.x, b.y, b.w, b.h));
            }
            if let Some(url) = &w.url {
                line.push_str(&format!(" url:{}", truncate_display(url, 80)));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

pub fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[allow(clippy::too_many_arguments)]
pub fn build_envelope(
    platform: Platform,
    screen: ScreenInfo,
    scope: Scope,
    app: Option<String>,
    tree: CupNode,
    windows: Option<Vec<WindowDescriptor>>,
    tools: Option<Vec<String>>,
) -> Envelope {
    Envelope {
        version: CUP_VERSION.to_string(),
        platform,
        timestamp: now_unix_millis(),
        screen,
        scope,
        app,
        tree,
        windows,
        tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attributes;

    fn leaf(id: u32, role: Role, name: &str) -> CupNode {
        CupNode {
            id: NodeId(id),
            role,
            name: name.to_string(),
            description: None,
            value: None,
            bounds: None,
            states: vec![],
            actions: vec![],
            attributes: Attributes::default(),
            children: vec![],
            platform: Default::default(),
        }
    }

    #[test]
    fn scenario_three_node_tree_serializes_header_and_body() {
        let button = {
            let mut n = leaf(1, Role::Button, "OK");
            n.actions.push(Action::Click);
            n.bounds = Some(Bounds { x: 0, y: 0, w: 10, h: 10 });
            n
        };
        let textbox = {
            let mut n = leaf(2, Role::Textbox, "Q");
            n.actions.push(Action::Type);
            n.states.push(State::Editable);
            n.bounds = Some(Bounds { x: 0, y: 20, w: 10, h: 10 });
            n
        };
        let mut root = leaf(0, Role::Window, "App");
        root.children = vec![button, textbox];

        let screen = ScreenInfo::new(1920, 1080, 1.0);
        let envelope = build_envelope(
            Platform::Windows,
            screen,
            Scope::Foreground,
            None,
            root.clone(),
            None,
            None,
        );
        let (shaped, counts) =
            prune_tree(&root, Bounds { x: 0, y: 0, w: 1920, h: 1080 }, Detail::Compact);
        let text = serialize_compact(&envelope, &shaped, &counts, count_nodes(&root));

        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "# CUP 0.1.0 | windows | 1920x1080");
        assert!(text.contains("[e0] win \"App\""));
        assert!(text.contains("  [e1] btn \"OK\""));
        assert!(text.contains("  [e2] tbx \"Q\""));
    }

    #[test]
    fn prune_hoists_unnamed_generic_wrapper() {
        let button = {
            let mut n = leaf(1, Role::Button, "OK");
            n.actions.push(Action::Click);
            n
        };
        let mut wrapper = leaf(0, Role::Generic, "");
        wrapper.children = vec![button];

        let (shaped, _) = prune_tree(&wrapper, Bounds { x: 0, y: 0, w: 100, h: 100 }, Detail::Compact);
        assert_eq!(shaped.role, Role::Button);
        assert_eq!(shaped.id, NodeId(1));
        assert!(shaped.children.is_empty());
    }

    #[test]
    fn prune_is_idempotent() {
        let button = {
            let mut n = leaf(1, Role::Button, "OK");
            n.actions.push(Action::Click);
            n
        };
        let mut wrapper = leaf(0, Role::Region, "");
        wrapper.children = vec![button];
        let viewport = Bounds { x: 0, y: 0, w: 100, h: 100 };

        let (once, _) = prune_tree(&wrapper, viewport, Detail::Compact);
        let (twice, _) = prune_tree(&once, viewport, Detail::Compact);
        assert_eq!(once, twice);
    }

    #[test]
    fn full_detail_bypasses_pruning() {
        let mut wrapper = leaf(0, Role::Generic, "");
        wrapper.children = vec![leaf(1, Role::Button, "OK")];
        let (shaped, counts) =
            prune_tree(&wrapper, Bounds { x: 0, y: 0, w: 100, h: 100 }, Detail::Full);
        assert_eq!(shaped, wrapper);
        assert!(counts.is_empty());
    }

    #[test]
    fn viewport_clip_hides_children_outside_scrollable_ancestor() {
        let mut visible = leaf(1, Role::Listitem, "first");
        visible.bounds = Some(Bounds { x: 0, y: 0, w: 400, h: 50 });
        let mut offscreen_below = leaf(2, Role::Listitem, "second");
        offscreen_below.bounds = Some(Bounds { x: 0, y: 300, w: 400, h: 50 });

        let mut list = leaf(0, Role::List, "");
        list.bounds = Some(Bounds { x: 0, y: 0, w: 400, h: 200 });
        list.actions.push(Action::Scroll);
        list.children = vec![visible, offscreen_below];

        let (shaped, counts) = prune_tree(&list, Bounds { x: 0, y: 0, w: 1920, h: 1080 }, Detail::Compact);
        assert_eq!(shaped.children.len(), 1);
        assert_eq!(shaped.children[0].id, NodeId(1));
        let c = counts.get(&NodeId(0)).unwrap();
        assert_eq!(c.total(), 1);
        assert_eq!(c.directions_label(), "down");
    }

    #[test]
    fn output_at_max_chars_is_not_truncated_at_max_plus_one_it_is() {
        let root = leaf(0, Role::Generic, "root-not-hoisted-since-has-action");
        // Force a name so it survives hoisting rules, then pad the tree with siblings.
        let mut root = root;
        root.role = Role::Window;
        for i in 1..2000u32 {
            root.children.push(leaf(i, Role::Text, &"x".repeat(1)));
        }
        let screen = ScreenInfo::new(100, 100, 1.0);
        let envelope =
            build_envelope(Platform::Windows, screen, Scope::Foreground, None, root.clone(), None, None);
        let (shaped, counts) =
            prune_tree(&root, Bounds { x: 0, y: 0, w: 100, h: 100 }, Detail::Compact);
        let text = serialize_compact(&envelope, &shaped, &counts, count_nodes(&root));
        assert!(text.chars().count() <= MAX_OUTPUT_CHARS);
    }
}
