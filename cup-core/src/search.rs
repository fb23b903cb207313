//! Semantic, ranked retrieval over a raw (unpruned) tree (spec §4.4).
//! Role-synonym resolution, NFD
//! tokenisation, longest-first role-phrase matching, and the fixed scoring
//! weight budget (role 0.35, name 0.50, state bonus 0.10, context ≤0.25).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::roles::Role;
use crate::schema::{CupNode, NodeId};
use crate::states::State;

const NOISE_WORDS: &[&str] = &[
    "the", "a", "an", "for", "to", "of", "in", "on", "with", "that", "this", "find", "me",
];

/// `(phrase tokens, matching roles)` — longest phrases first so e.g.
/// `"search bar"` is tried before the single token `"search"`.
fn role_synonyms() -> Vec<(&'static [&'static str], &'static [Role])> {
    use Role::*;
    vec![
        (&["search", "bar"], &[Search, Searchbox, Textbox, Combobox]),
        (&["text", "field"], &[Textbox]),
        (&["text", "box"], &[Textbox]),
        (&["check", "box"], &[Checkbox]),
        (&["radio", "button"], &[Radio]),
        (&["drop", "down"], &[Combobox, Listbox]),
        (&["list", "box"], &[Listbox]),
        (&["progress", "bar"], &[Progressbar]),
        (&["scroll", "bar"], &[Scrollbar]),
        (&["menu", "item"], &[Menuitem]),
        (&["tool", "tip"], &[Tooltip]),
        (&["tab", "panel"], &[Tabpanel]),
        (&["button"], &[Button]),
        (&["btn"], &[Button]),
        (&["checkbox"], &[Checkbox]),
        (&["toggle"], &[Switch, Checkbox]),
        (&["switch"], &[Switch]),
        (&["link"], &[Link]),
        (&["image"], &[Image]),
        (&["picture"], &[Image]),
        (&["icon"], &[Image, Button]),
        (&["heading"], &[Heading]),
        (&["title"], &[Heading]),
        (&["label"], &[Label, Text]),
        (&["text"], &[Text, Textbox]),
        (&["textbox"], &[Textbox]),
        (&["input"], &[Textbox, Searchbox, Combobox]),
        (&["search"], &[Search, Searchbox]),
        (&["searchbox"], &[Searchbox]),
        (&["slider"], &[Slider]),
        (&["spinner"], &[Spinbutton]),
        (&["list"], &[List, Listbox]),
        (&["item"], &[Listitem, Menuitem, Treeitem]),
        (&["menu"], &[Menu, Menubar]),
        (&["tab"], &[Tab]),
        (&["table"], &[Table, Grid]),
        (&["row"], &[Row]),
        (&["cell"], &[Cell, Gridcell]),
        (&["tree"], &[Tree]),
        (&["dialog"], &[Dialog, Alertdialog]),
        (&["popup"], &[Dialog, Menu]),
        (&["alert"], &[Alert, Alertdialog]),
        (&["status"], &[Status]),
        (&["window"], &[Window]),
        (&["document"], &[Document]),
        (&["article"], &[Article]),
        (&["navigation"], &[Navigation]),
        (&["nav"], &[Navigation]),
        (&["banner"], &[Banner]),
        (&["header"], &[Banner, Heading]),
        (&["footer"], &[Contentinfo]),
        (&["form"], &[Form]),
        (&["region"], &[Region]),
        (&["group"], &[Group]),
        (&["toolbar"], &[Toolbar]),
        (&["video"], &[Video]),
        (&["audio"], &[Audio]),
        (&["option"], &[Option]),
        (&["play", "button"], &[Button]),
    ]
}

pub fn tokenize(input: &str) -> Vec<String> {
    let decomposed: String = input.nfd().filter(|c| !is_combining_mark(*c)).collect();
    decomposed
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F)
}

/// A parsed query: the role hint (if any phrase matched) and the remaining
/// name tokens (noise words stripped).
#[derive(Debug, Default, Clone)]
pub struct ParsedQuery {
    pub roles: Vec<Role>,
    pub name_tokens: Vec<String>,
}

/// Try role-synonym matches on subsequences of up to 3 adjacent tokens,
/// longest first; the first match claims those tokens as the role hint.
pub fn parse_query(tokens: &[String]) -> ParsedQuery {
    let table = role_synonyms();
    let mut consumed = vec![false; tokens.len()];
    let mut roles = vec![];

    for window in (1..=3).rev() {
        if window > tokens.len() {
            continue;
        }
        let mut i = 0;
        while i + window <= tokens.len() {
            if consumed[i..i + window].iter().any(|&c| c) {
                i += 1;
                continue;
            }
            let phrase: Vec<&str> = tokens[i..i + window].iter().map(|s| s.as_str()).collect();
            if let Some((_, matched_roles)) =
                table.iter().find(|(p, _)| p.len() == window && p.iter().eq(phrase.iter()))
            {
                if roles.is_empty() {
                    roles = matched_roles.to_vec();
                }
                for c in &mut consumed[i..i + window] {
                    *c = true;
                }
                i += window;
                continue;
            }
            i += 1;
        }
    }

    let name_tokens: Vec<String> = tokens
        .iter()
        .enumerate()
        .filter(|(i, t)| !consumed[*i] && !NOISE_WORDS.contains(&t.as_str()))
        .map(|(_, t)| t.clone())
        .collect();

    ParsedQuery { roles, name_tokens }
}

/// Resolve an explicit `role` argument string (exact CUP role name, or
/// substring match for queries ≥3 chars — never the reverse direction).
pub fn resolve_role_string(s: &str) -> Vec<Role> {
    let lower = s.to_lowercase();
    if let Some(r) = Role::from_wire_name(&lower) {
        return vec![r];
    }
    let table = role_synonyms();
    for (phrase, roles) in &table {
        if phrase.len() == 1 && phrase[0] == lower {
            return roles.to_vec();
        }
    }
    if lower.chars().count() >= 3 {
        return Role::all().iter().copied().filter(|r| r.wire_name().contains(&lower)).collect();
    }
    vec![]
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub role: Option<String>,
    pub name: Option<String>,
    pub state: Option<State>,
    pub limit: usize,
    pub threshold: f64,
}

impl SearchQuery {
    pub fn new() -> Self {
        Self { limit: 20, threshold: 0.15, ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: NodeId,
    pub role: Role,
    pub name: String,
    pub score: f64,
}

struct ResolvedQuery {
    roles: Vec<Role>,
    name_tokens: Vec<String>,
    state: Option<State>,
}

fn resolve(query: &SearchQuery) -> ResolvedQuery {
    let mut roles = vec![];
    let mut name_tokens = vec![];

    if let Some(free) = &query.query {
        let tokens = tokenize(free);
        let parsed = parse_query(&tokens);
        roles = parsed.roles;
        name_tokens = parsed.name_tokens;
    }
    if let Some(role_str) = &query.role {
        roles = resolve_role_string(role_str);
    }
    if let Some(name) = &query.name {
        name_tokens = tokenize(name);
    }

    ResolvedQuery { roles, name_tokens, state: query.state }
}

fn name_score(node_tokens: &[String], query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let joined_node = node_tokens.join(" ");
    let joined_query = query_tokens.join(" ");

    let substring_score = if !joined_node.is_empty() && joined_node == joined_query {
        1.0
    } else if !joined_node.is_empty() && joined_node.contains(&joined_query) {
        0.85
    } else {
        0.0
    };

    let node_set: HashSet<&str> = node_tokens.iter().map(|s| s.as_str()).collect();
    let mut overlap_total = 0.0;
    for qt in query_tokens {
        let best = node_tokens
            .iter()
            .map(|nt| {
                if nt == qt {
                    1.0
                } else if nt.starts_with(qt.as_str()) {
                    0.7
                } else if qt.starts_with(nt.as_str()) {
                    0.5
                } else if nt.contains(qt.as_str()) {
                    0.6
                } else {
                    0.0
                }
            })
            .fold(0.0_f64, f64::max);
        overlap_total += best;
    }
    let overlap_score = overlap_total / query_tokens.len() as f64;
    let _ = node_set;

    let base = substring_score.max(overlap_score);
    let exactness = if substring_score >= 1.0 { 1.0 } else { 0.0 };
    base * (0.85 + 0.15 * exactness)
}

fn secondary_score(node: &CupNode, query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let mut fields = vec![];
    if let Some(d) = &node.description {
        fields.push(d.to_lowercase());
    }
    if let Some(v) = &node.value {
        fields.push(v.to_lowercase());
    }
    if let Some(p) = &node.attributes.placeholder {
        fields.push(p.to_lowercase());
    }
    let query_joined = query_tokens.join(" ");
    let mut best = 0.0_f64;
    for f in &fields {
        if f.contains(&query_joined) {
            best = best.max(0.15);
        }
    }
    best
}

fn context_score(
    node: &CupNode,
    ancestors: &[&CupNode],
    query_tokens: &[String],
    target_roles: &[Role],
) -> f64 {
    let mut score = 0.0;
    if !query_tokens.is_empty() {
        let joined = query_tokens.join(" ");
        if ancestors.iter().any(|a| a.name.to_lowercase().contains(&joined)) {
            score += 0.1;
        }
    }
    if !target_roles.is_empty() && ancestors.iter().any(|a| target_roles.contains(&a.role)) {
        score += 0.1;
    }
    if node.is_interactive() {
        score += 0.05;
    }
    if !node.has_state(State::Offscreen) {
        score += 0.05;
    }
    if node.has_state(State::Focused) {
        score += 0.02;
    }
    score
}

fn score_node(
    node: &CupNode,
    ancestors: &[&CupNode],
    resolved: &ResolvedQuery,
) -> Option<f64> {
    if let Some(state) = resolved.state {
        if !node.has_state(state) {
            return None;
        }
    }

    let mut score = 0.0;
    if !resolved.roles.is_empty() {
        if !resolved.roles.contains(&node.role) {
            return None;
        }
        score += 0.35;
    }

    if !resolved.name_tokens.is_empty() {
        let node_tokens = tokenize(&node.name);
        let name = name_score(&node_tokens, &resolved.name_tokens);
        if name <= 0.0 {
            return None;
        }
        score += name * 0.50;
        score += secondary_score(node, &resolved.name_tokens).min(0.15);
    }

    if resolved.state.is_some() {
        score += 0.10;
    }

    score += context_score(node, ancestors, &resolved.name_tokens, &resolved.roles);

    Some(score)
}

fn walk_and_score<'a>(
    node: &'a CupNode,
    ancestors: &mut Vec<&'a CupNode>,
    resolved: &ResolvedQuery,
    out: &mut Vec<(usize, SearchResult)>,
    order: &mut usize,
) {
    if let Some(score) = score_node(node, ancestors, resolved) {
        out.push((
            *order,
            SearchResult { id: node.id, role: node.role, name: node.name.clone(), score },
        ));
    }
    *order += 1;

    ancestors.push(node);
    for child in &node.children {
        walk_and_score(child, ancestors, resolved, out, order);
    }
    ancestors.pop();
}

/// Walks the full unpruned tree, scores every node, and returns the top
/// `limit` results above `threshold`, sorted descending by score with ties
/// broken by tree (pre-order) position — a stable sort.
pub fn search_tree(root: &CupNode, query: &SearchQuery) -> Vec<SearchResult> {
    let resolved = resolve(query);
    let mut ancestors = vec![];
    let mut scored = vec![];
    let mut order = 0usize;
    walk_and_score(root, &mut ancestors, &resolved, &mut scored, &mut order);

    scored.retain(|(_, r)| r.score >= query.threshold);
    scored.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(query.limit.max(1));
    scored.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
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
    fn tokenize_strips_accents_and_splits_non_alnum() {
        let tokens = tokenize("Café-Bar 2!");
        assert_eq!(tokens, vec!["cafe", "bar", "2"]);
    }

    #[test]
    fn parse_query_extracts_role_phrase_and_name_tokens() {
        let tokens = tokenize("play button");
        let parsed = parse_query(&tokens);
        assert!(parsed.roles.contains(&Role::Button));
    }

    #[test]
    fn search_ranks_exact_name_match_first() {
        let play = {
            let mut n = leaf(1, Role::Button, "Play");
            n.actions.push(Action::Click);
            n
        };
        let pause = leaf(2, Role::Button, "Pause");
        let volume = leaf(3, Role::Slider, "Volume");
        let mut root = leaf(0, Role::Window, "App");
        root.children = vec![play, pause, volume];

        let mut q = SearchQuery::new();
        q.query = Some("play button".into());
        let results = search_tree(&root, &q);
        assert!(!results.is_empty());
        assert_eq!(results[0].id, NodeId(1));
    }

    #[test]
    fn search_respects_limit_threshold_and_stable_order() {
        let mut root = leaf(0, Role::Window, "App");
        for i in 1..10 {
            root.children.push(leaf(i, Role::Button, "Thing"));
        }
        let mut q = SearchQuery::new();
        q.query = Some("thing".into());
        q.limit = 3;
        let results = search_tree(&root, &q);
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }
}
