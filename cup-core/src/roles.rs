//! The closed CUP role vocabulary and its compact short-code table.
//!
//! Grounded in the compact-serialiser's role short-code table and the search engine's
//! `ALL_ROLES`/`ROLE_SYNONYMS` — both read off the *same* enum there, which
//! is why role short-codes and role-synonym resolution live side by side
//! conceptually even though the short codes are used by `format` and the
//! synonyms by `search`.

use serde::{Deserialize, Serialize};

macro_rules! role_table {
    ($($variant:ident => $wire:literal, $code:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Role {
            $(#[serde(rename = $wire)] $variant,)*
        }

        impl Role {
            /// The frozen two/three-letter short code used by the compact serialiser (spec §4.3, §6).
            pub fn short_code(self) -> &'static str {
                match self {
                    $(Role::$variant => $code,)*
                }
            }

            /// The wire/ARIA-ish name (lowercase, matches `serde` rename).
            pub fn wire_name(self) -> &'static str {
                match self {
                    $(Role::$variant => $wire,)*
                }
            }

            pub fn from_wire_name(s: &str) -> Option<Role> {
                match s {
                    $($wire => Some(Role::$variant),)*
                    _ => None,
                }
            }

            pub fn all() -> &'static [Role] {
                &[$(Role::$variant,)*]
            }
        }
    };
}

role_table! {
    Button => "button", "btn";
    Checkbox => "checkbox", "chk";
    Radio => "radio", "rad";
    Switch => "switch", "swt";
    Combobox => "combobox", "cmb";
    Textbox => "textbox", "tbx";
    Searchbox => "searchbox", "sbx";
    Spinbutton => "spinbutton", "spn";
    Slider => "slider", "sld";
    Progressbar => "progressbar", "prg";
    Link => "link", "lnk";
    Image => "img", "img";
    Heading => "heading", "hdg";
    Text => "text", "txt";
    Label => "label", "lbl";
    List => "list", "lst";
    Listitem => "listitem", "li";
    Listbox => "listbox", "lbx";
    Option => "option", "opt";
    Menu => "menu", "mnu";
    Menubar => "menubar", "mnb";
    Menuitem => "menuitem", "mni";
    Menuitemcheckbox => "menuitemcheckbox", "mic";
    Menuitemradio => "menuitemradio", "mir";
    Tab => "tab", "tab";
    Tablist => "tablist", "tbl";
    Tabpanel => "tabpanel", "tbp";
    Table => "table", "gtb";
    Row => "row", "row";
    Cell => "cell", "cel";
    Columnheader => "columnheader", "clh";
    Rowheader => "rowheader", "rwh";
    Grid => "grid", "grd";
    Gridcell => "gridcell", "gdc";
    Tree => "tree", "tre";
    Treeitem => "treeitem", "tri";
    Treegrid => "treegrid", "trg";
    Dialog => "dialog", "dlg";
    Alertdialog => "alertdialog", "adl";
    Alert => "alert", "alt";
    Status => "status", "sts";
    Tooltip => "tooltip", "tip";
    Window => "window", "win";
    Application => "application", "app";
    Document => "document", "doc";
    Article => "article", "art";
    Main => "main", "mai";
    Navigation => "navigation", "nav";
    Search => "search", "sea";
    Banner => "banner", "ban";
    Complementary => "complementary", "cmp";
    Contentinfo => "contentinfo", "cnf";
    Form => "form", "frm";
    Region => "region", "reg";
    Group => "group", "grp";
    Generic => "generic", "gen";
    Separator => "separator", "sep";
    Scrollbar => "scrollbar", "scb";
    Titlebar => "titlebar", "ttl";
    Toolbar => "toolbar", "tlb";
    Statusbar => "statusbar", "stb";
    Meter => "meter", "met";
    Figure => "figure", "fig";
    Canvas => "canvas", "cnv";
    Paragraph => "paragraph", "par";
    Blockquote => "blockquote", "bqt";
    Code => "code", "cod";
    Math => "math", "mth";
    Term => "term", "trm";
    Definition => "definition", "dfn";
    Note => "note", "not";
    Presentation => "presentation", "pre";
    None_ => "none", "non";
    Unknown => "unknown", "unk";
    Video => "video", "vid";
    Audio => "audio", "aud";
    IframePresentational => "iframe", "ifr";
    Splitter => "splitter", "spl";
    Marquee => "marquee", "mrq";
    ScrollableRegion => "scrollableregion", "scr";
    Desktop => "desktop", "dsk";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_round_trips_through_wire_name() {
        for &role in Role::all() {
            assert_eq!(Role::from_wire_name(role.wire_name()), Some(role));
        }
    }

    #[test]
    fn short_codes_are_non_empty_and_stable() {
        assert_eq!(Role::Button.short_code(), "btn");
        assert_eq!(Role::Heading.short_code(), "hdg");
        for &role in Role::all() {
            assert!(!role.short_code().is_empty());
        }
    }

    #[test]
    fn generic_is_the_fallback_role() {
        assert_eq!(Role::from_wire_name("generic"), Some(Role::Generic));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Textbox).unwrap();
        assert_eq!(json, "\"textbox\"");
    }

    #[test]
    fn role_serde_rename_matches_wire_name() {
        for &role in Role::all() {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.wire_name()));
        }
    }

    #[test]
    fn image_serializes_as_short_wire_name_not_variant_name() {
        let json = serde_json::to_string(&Role::Image).unwrap();
        assert_eq!(json, "\"img\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Image);
    }
}
