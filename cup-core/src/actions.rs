//! The closed CUP action vocabulary (spec §3, §4.5: "~16-element enum").

use serde::{Deserialize, Serialize};

macro_rules! action_table {
    ($($variant:ident => $wire:literal, $code:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Action {
            $(#[serde(rename = $wire)] $variant,)*
        }

        impl Action {
            pub fn short_code(self) -> &'static str {
                match self {
                    $(Action::$variant => $code,)*
                }
            }

            pub fn wire_name(self) -> &'static str {
                match self {
                    $(Action::$variant => $wire,)*
                }
            }

            pub fn from_wire_name(s: &str) -> Option<Action> {
                match s {
                    $($wire => Some(Action::$variant),)*
                    _ => None,
                }
            }

            pub fn all() -> &'static [Action] {
                &[$(Action::$variant,)*]
            }
        }
    };
}

action_table! {
    Click => "click", "clk";
    Rightclick => "rightclick", "rcl";
    Doubleclick => "doubleclick", "dcl";
    Longpress => "longpress", "lng";
    Toggle => "toggle", "tog";
    Type => "type", "typ";
    Setvalue => "setvalue", "set";
    Select => "select", "sel";
    Expand => "expand", "exp";
    Collapse => "collapse", "col";
    Scroll => "scroll", "scr";
    Increment => "increment", "inc";
    Decrement => "decrement", "dec";
    Focus => "focus", "foc";
    Dismiss => "dismiss", "dis";
    PressKeys => "press_keys", "prs";
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Every canonical action that is valid input to the dispatcher (spec §4.5.3:
/// "Each record is validated for required fields before dispatch").
pub const VALID_ACTIONS: &[Action] = Action::all();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_round_trips() {
        for &a in Action::all() {
            assert_eq!(Action::from_wire_name(a.wire_name()), Some(a));
        }
    }

    #[test]
    fn action_set_has_sixteen_members() {
        assert_eq!(Action::all().len(), 16);
    }

    #[test]
    fn display_matches_wire_name() {
        assert_eq!(Action::Click.to_string(), "click");
        assert_eq!(Action::PressKeys.to_string(), "press_keys");
    }

    #[test]
    fn action_serde_rename_matches_wire_name() {
        for &a in Action::all() {
            let json = serde_json::to_string(&a).unwrap();
            assert_eq!(json, format!("\"{}\"", a.wire_name()));
        }
    }

    #[test]
    fn press_keys_serializes_with_underscore_not_concatenated() {
        let json = serde_json::to_string(&Action::PressKeys).unwrap();
        assert_eq!(json, "\"press_keys\"");
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Action::PressKeys);
    }
}
