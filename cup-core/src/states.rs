//! The closed CUP state vocabulary (spec §3: "~16-element enum").

use serde::{Deserialize, Serialize};

macro_rules! state_table {
    ($($variant:ident => $wire:literal, $code:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum State {
            $($variant,)*
        }

        impl State {
            pub fn short_code(self) -> &'static str {
                match self {
                    $(State::$variant => $code,)*
                }
            }

            pub fn wire_name(self) -> &'static str {
                match self {
                    $(State::$variant => $wire,)*
                }
            }

            pub fn from_wire_name(s: &str) -> Option<State> {
                match s {
                    $($wire => Some(State::$variant),)*
                    _ => None,
                }
            }

            pub fn all() -> &'static [State] {
                &[$(State::$variant,)*]
            }
        }
    };
}

state_table! {
    Focused => "focused", "foc";
    Disabled => "disabled", "dis";
    Checked => "checked", "chk";
    Mixed => "mixed", "mix";
    Expanded => "expanded", "exp";
    Collapsed => "collapsed", "col";
    Selected => "selected", "sel";
    Required => "required", "req";
    Modal => "modal", "mod";
    Readonly => "readonly", "ro";
    Editable => "editable", "edt";
    Busy => "busy", "bsy";
    Multiselectable => "multiselectable", "mls";
    Pressed => "pressed", "prs";
    Offscreen => "offscreen", "ofs";
    Hidden => "hidden", "hid";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_round_trips() {
        for &s in State::all() {
            assert_eq!(State::from_wire_name(s.wire_name()), Some(s));
        }
    }

    #[test]
    fn known_short_codes() {
        assert_eq!(State::Focused.short_code(), "foc");
        assert_eq!(State::Offscreen.short_code(), "ofs");
    }

    #[test]
    fn state_set_has_sixteen_members() {
        assert_eq!(State::all().len(), 16);
    }
}
