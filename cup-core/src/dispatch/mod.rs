//! Action dispatch: the canonical-action -> native-pattern -> synthetic-input
//! fallback chain (spec §4.5), the keyboard combo grammar (spec §4.5.1), and
//! app-launch fuzzy matching (spec §4.5.2) shared across backends.
//!
//! One [`ActionDispatcher`] implementation per platform, selected the same
//! way [`crate::adapters::get_adapter`] selects a capture backend.

pub mod launch;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod web;
#[cfg(windows)]
pub mod windows;

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::errors::CupError;
use crate::schema::{NativeHandle, NodeId, Platform};

/// Returns a dispatcher for `platform`, mirroring [`crate::adapters::get_adapter`]'s
/// selection shape.
pub fn get_dispatcher(platform: Platform) -> Result<Box<dyn ActionDispatcher>, CupError> {
    Ok(match platform {
        #[cfg(windows)]
        Platform::Windows => Box::new(windows::WindowsDispatcher::new()),
        #[cfg(not(windows))]
        Platform::Windows => {
            return Err(CupError::Environment("windows dispatcher unavailable on this build".into()))
        }
        #[cfg(target_os = "macos")]
        Platform::Macos => Box::new(macos::MacosDispatcher::new()),
        #[cfg(not(target_os = "macos"))]
        Platform::Macos => {
            return Err(CupError::Environment("macos dispatcher unavailable on this build".into()))
        }
        #[cfg(target_os = "linux")]
        Platform::Linux => Box::new(linux::LinuxDispatcher::new()),
        #[cfg(not(target_os = "linux"))]
        Platform::Linux => {
            return Err(CupError::Environment("linux dispatcher unavailable on this build".into()))
        }
        Platform::Web => Box::new(web::WebDispatcher::new(crate::config::CupConfig::from_env())),
        Platform::Android | Platform::Ios => {
            return Err(CupError::Environment(format!("no dispatcher available for platform '{platform}'")))
        }
    })
}

/// Scroll direction for the `scroll` action (spec §4.5: "`direction` maps to
/// small/large inc/dec").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn wire_name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }

    pub fn from_wire_name(s: &str) -> Option<Direction> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// One request in a batch (spec §4.5.3): "each record is validated for
/// required fields before dispatch".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    /// `wait` pseudo-action duration in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub millis: Option<u64>,
    /// Required for `scroll`; `up`/`down`/`left`/`right` (spec §4.5.3).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl ActionRequest {
    /// Validates the fields an action needs before it reaches a dispatcher
    /// (spec §4.5.3). `wait` is not a real [`Action`] variant -- it is
    /// recognised here by the absence of `action` plus the presence of
    /// `millis`, the same "pseudo-action" shape a batch
    /// runner gives it.
    pub fn validate(&self) -> Result<(), CupError> {
        let Some(action) = self.action else {
            if self.millis.is_some() {
                return Ok(());
            }
            return Err(CupError::InvalidInput("request is missing 'action'".into()));
        };
        match action {
            Action::Type | Action::Setvalue => {
                if self.text.is_none() {
                    return Err(CupError::InvalidInput(format!("{action} requires 'text'")));
                }
            }
            Action::PressKeys => {
                if self.combo.is_none() {
                    return Err(CupError::InvalidInput("press_keys requires 'combo'".into()));
                }
            }
            Action::Scroll => {
                if self.direction.is_none() {
                    return Err(CupError::InvalidInput("scroll requires 'direction'".into()));
                }
                if self.id.is_none() && self.app.is_none() {
                    return Err(CupError::InvalidInput(format!("{action} requires 'id'")));
                }
            }
            _ => {
                if self.id.is_none() && self.app.is_none() {
                    return Err(CupError::InvalidInput(format!("{action} requires 'id'")));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), error: None }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        let message = message.into();
        Self { success: false, error: Some(message.clone()), message }
    }
}

pub trait ActionDispatcher: Send + Sync {
    fn platform_name(&self) -> Platform;

    /// Dispatches one canonical action against a previously-captured node,
    /// trying the native pattern chain before falling back to synthetic
    /// input (spec §4.5). `handle` is `None` for `launch_app`, since that
    /// action addresses an application, not a captured element.
    fn dispatch(&self, request: &ActionRequest, handle: Option<&NativeHandle>) -> Result<ActionResult, CupError>;

    /// Executes a parsed, modifier-resolved keyboard combo.
    fn press_keys(&self, combo: &ParsedCombo) -> Result<ActionResult, CupError>;

    /// Fuzzy-matches `query` against installed applications and launches
    /// the best match, waiting for its window to appear (spec §4.5.2).
    fn launch_app(&self, query: &str) -> Result<ActionResult, CupError>;
}

// ---------------------------------------------------------------------------
// Keyboard combo grammar (spec §4.5.1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

impl Modifier {
    fn from_token(tok: &str) -> Option<Modifier> {
        match tok.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" | "opt" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "meta" | "cmd" | "command" | "win" | "windows" | "super" => Some(Modifier::Meta),
            _ => None,
        }
    }
}

/// A combo after modifier-only reclassification: at least one main key.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCombo {
    pub modifiers: Vec<Modifier>,
    pub main_keys: Vec<String>,
}

/// Splits `"ctrl+shift+s"` into modifier/main-key tokens. Token order inside
/// `main_keys` is preserved for multi-key sequences like `"g g"` (not a
/// combo, two sequential presses -- callers distinguish on `+` vs whitespace,
/// mirrored from the keyboard combo grammar's reference parser).
pub fn parse_combo(raw: &str) -> Result<ParsedCombo, CupError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CupError::InvalidInput("empty key combo".into()));
    }

    let mut modifiers = Vec::new();
    let mut main_keys = Vec::new();

    for token in raw.split('+').map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(m) = Modifier::from_token(token) {
            if !modifiers.contains(&m) {
                modifiers.push(m);
            }
        } else {
            main_keys.push(token.to_ascii_lowercase());
        }
    }

    Ok(ParsedCombo { modifiers, main_keys })
}

/// Re-classifies a modifier-only combo (e.g. a lone `"meta"` to open the
/// Start Menu) as a main-key press, the same rebalancing
/// the Windows key-combo translation step performs right before building
/// the keypress sequence -- `parse_combo` itself stays purely lexical.
pub fn resolve_modifier_only(mut combo: ParsedCombo) -> ParsedCombo {
    if combo.main_keys.is_empty() && !combo.modifiers.is_empty() {
        combo.main_keys = combo.modifiers.drain(..).map(|m| format!("{m:?}").to_lowercase()).collect();
    }
    combo
}

/// Renders a [`ParsedCombo`] back to its canonical `"ctrl+shift+s"` form,
/// modifiers first in `Ctrl, Alt, Shift, Meta` order followed by main keys in
/// their original order, satisfying `parse_combo(combo_to_string(c)) == c`
/// for any combo with at least one main key (spec §4.5.1, §8 scenario 6).
pub fn combo_to_string(combo: &ParsedCombo) -> String {
    let modifier_name = |m: Modifier| match m {
        Modifier::Ctrl => "ctrl",
        Modifier::Alt => "alt",
        Modifier::Shift => "shift",
        Modifier::Meta => "meta",
    };
    combo
        .modifiers
        .iter()
        .map(|&m| modifier_name(m).to_string())
        .chain(combo.main_keys.iter().cloned())
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_missing_action() {
        let r = ActionRequest::default();
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_wait_pseudo_action_needs_only_millis() {
        let r = ActionRequest { millis: Some(500), ..Default::default() };
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validate_type_requires_text() {
        let r = ActionRequest { action: Some(Action::Type), id: Some(NodeId(1)), ..Default::default() };
        assert!(r.validate().is_err());
        let r2 = ActionRequest { text: Some("hi".into()), ..r };
        assert!(r2.validate().is_ok());
    }

    #[test]
    fn validate_scroll_requires_direction() {
        let r = ActionRequest { action: Some(Action::Scroll), id: Some(NodeId(1)), ..Default::default() };
        assert!(r.validate().is_err());
        let r2 = ActionRequest { direction: Some(Direction::Up), ..r };
        assert!(r2.validate().is_ok());
    }

    #[test]
    fn validate_scroll_still_requires_id_or_app() {
        let r = ActionRequest { action: Some(Action::Scroll), direction: Some(Direction::Left), ..Default::default() };
        assert!(r.validate().is_err());
    }

    #[test]
    fn direction_round_trips_through_wire_name() {
        for d in [Direction::Up, Direction::Down, Direction::Left, Direction::Right] {
            assert_eq!(Direction::from_wire_name(d.wire_name()), Some(d));
        }
    }

    #[test]
    fn parse_combo_splits_modifiers_and_main_keys() {
        let c = parse_combo("ctrl+shift+s").unwrap();
        assert_eq!(c.modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
        assert_eq!(c.main_keys, vec!["s".to_string()]);
    }

    #[test]
    fn modifier_only_combo_is_reclassified_as_main_key() {
        let c = parse_combo("meta").unwrap();
        assert!(c.main_keys.is_empty());
        let resolved = resolve_modifier_only(c);
        assert!(resolved.modifiers.is_empty());
        assert_eq!(resolved.main_keys, vec!["meta".to_string()]);
    }

    #[test]
    fn combo_with_main_key_is_left_untouched() {
        let c = parse_combo("ctrl+c").unwrap();
        let resolved = resolve_modifier_only(c.clone());
        assert_eq!(resolved, c);
    }

    #[test]
    fn parse_combo_lowercases_main_key_tokens() {
        let c = parse_combo("Ctrl+Shift+P").unwrap();
        assert_eq!(c.modifiers, vec![Modifier::Ctrl, Modifier::Shift]);
        assert_eq!(c.main_keys, vec!["p".to_string()]);
    }

    #[test]
    fn combo_to_string_round_trips_through_parse_combo() {
        let c = parse_combo("ctrl+shift+s").unwrap();
        let rendered = combo_to_string(&c);
        assert_eq!(rendered, "ctrl+shift+s");
        assert_eq!(parse_combo(&rendered).unwrap(), c);
    }

    #[test]
    fn combo_to_string_matches_mixed_case_input_after_normalizing() {
        let c = parse_combo("Ctrl+Shift+P").unwrap();
        let rendered = combo_to_string(&c);
        assert_eq!(rendered, "ctrl+shift+p");
        assert_eq!(parse_combo(&rendered).unwrap(), c);
    }
}
