//! Windows action dispatcher.
//!
//! Generalises UIA pattern invocation (see `pattern.rs`) and
//! `input.rs` (`SendInput` keyboard/mouse) into the canonical-action fallback
//! chains: try the matching UIA pattern
//! first, fall back to a synthetic click/keypress when the element doesn't
//! support it.

use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::actions::Action;
use crate::adapters::windows::UiaHandle;
use crate::dispatch::launch::{fuzzy_match, wait_for_window, AppCandidate};
use crate::dispatch::{
    resolve_modifier_only, ActionDispatcher, ActionRequest, ActionResult, Direction, Modifier, ParsedCombo,
};
use crate::errors::CupError;
use crate::input;
use crate::pattern;
use crate::schema::{NativeHandle, Platform};
use crate::window;

pub struct WindowsDispatcher;

impl WindowsDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn uia_handle<'a>(handle: Option<&'a NativeHandle>) -> Result<&'a UiaHandle, CupError> {
    match handle {
        Some(NativeHandle::Windows(h)) => Ok(h),
        Some(_) => Err(CupError::InvalidInput("handle does not belong to the windows adapter".into())),
        None => Err(CupError::InvalidInput("action requires a captured node".into())),
    }
}

fn vk_for_key(key: &str) -> Option<u16> {
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        VK_BACK, VK_DELETE, VK_DOWN, VK_END, VK_ESCAPE, VK_F1, VK_HOME, VK_LEFT, VK_LWIN,
        VK_MENU, VK_RETURN, VK_RIGHT, VK_SHIFT, VK_SPACE, VK_TAB, VK_UP,
    };
    let lower = key.to_ascii_lowercase();
    if lower.len() == 1 {
        let c = lower.chars().next().unwrap();
        if c.is_ascii_alphanumeric() {
            return Some(c.to_ascii_uppercase() as u16);
        }
    }
    Some(match lower.as_str() {
        "enter" | "return" => VK_RETURN.0,
        "tab" => VK_TAB.0,
        "esc" | "escape" => VK_ESCAPE.0,
        "space" => VK_SPACE.0,
        "backspace" => VK_BACK.0,
        "delete" | "del" => VK_DELETE.0,
        "up" => VK_UP.0,
        "down" => VK_DOWN.0,
        "left" => VK_LEFT.0,
        "right" => VK_RIGHT.0,
        "home" => VK_HOME.0,
        "end" => VK_END.0,
        "meta" | "win" | "windows" | "super" => VK_LWIN.0,
        "alt" => VK_MENU.0,
        "shift" => VK_SHIFT.0,
        "f1" => VK_F1.0,
        _ => return None,
    })
}

fn modifier_vk(m: Modifier) -> u16 {
    use windows::Win32::UI::Input::KeyboardAndMouse::{VK_CONTROL, VK_LWIN, VK_MENU, VK_SHIFT};
    match m {
        Modifier::Ctrl => VK_CONTROL.0,
        Modifier::Alt => VK_MENU.0,
        Modifier::Shift => VK_SHIFT.0,
        Modifier::Meta => VK_LWIN.0,
    }
}

fn combo_to_vk_sequence(combo: &ParsedCombo) -> Result<Vec<u16>, CupError> {
    let mut codes: Vec<u16> = combo.modifiers.iter().map(|m| modifier_vk(*m)).collect();
    for key in &combo.main_keys {
        let vk = vk_for_key(key).ok_or_else(|| CupError::InvalidInput(format!("unknown key '{key}'")))?;
        codes.push(vk);
    }
    if codes.is_empty() {
        return Err(CupError::InvalidInput("combo resolved to no keys".into()));
    }
    Ok(codes)
}

impl ActionDispatcher for WindowsDispatcher {
    fn platform_name(&self) -> Platform {
        Platform::Windows
    }

    fn dispatch(&self, request: &ActionRequest, handle: Option<&NativeHandle>) -> Result<ActionResult, CupError> {
        let Some(action) = request.action else {
            return Ok(ActionResult::ok("wait"));
        };

        if action == Action::PressKeys {
            let combo = request
                .combo
                .as_deref()
                .ok_or_else(|| CupError::InvalidInput("press_keys requires 'combo'".into()))?;
            return self.press_keys(&resolve_modifier_only(crate::dispatch::parse_combo(combo)?));
        }

        let uia = uia_handle(handle)?;
        let (x, y) = uia.point;

        match action {
            Action::Click => {
                // Invoke -> focus+Enter -> synthetic click (spec §4.5, `_windows.py::click`).
                if let Ok(r) = pattern::invoke_at(x, y) {
                    if r.success {
                        return Ok(ActionResult::ok(r.detail));
                    }
                }
                input::send_click_raw(x, y, "left");
                Ok(ActionResult::ok(format!("synthetic click at ({x},{y})")))
            }
            Action::Rightclick => {
                input::send_click_raw(x, y, "right");
                Ok(ActionResult::ok(format!("synthetic right click at ({x},{y})")))
            }
            Action::Doubleclick => {
                input::send_click_raw(x, y, "left");
                input::send_click_raw(x, y, "left");
                Ok(ActionResult::ok(format!("synthetic double click at ({x},{y})")))
            }
            Action::Longpress => {
                input::send_click_raw(x, y, "left");
                thread::sleep(Duration::from_millis(600));
                Ok(ActionResult::ok(format!("long press at ({x},{y})")))
            }
            Action::Toggle => {
                if let Ok(r) = pattern::toggle_at(x, y) {
                    if r.success {
                        return Ok(ActionResult::ok(r.detail));
                    }
                }
                input::send_click_raw(x, y, "left");
                Ok(ActionResult::ok(format!("synthetic toggle click at ({x},{y})")))
            }
            Action::Setvalue | Action::Type => {
                let text = request
                    .text
                    .as_deref()
                    .ok_or_else(|| CupError::InvalidInput(format!("{action} requires 'text'")))?;
                if action == Action::Setvalue {
                    if let Ok(r) = pattern::set_value_at(x, y, text) {
                        if r.success {
                            return Ok(ActionResult::ok(r.detail));
                        }
                    }
                }
                input::send_click_raw(x, y, "left");
                input::send_text_raw(text);
                Ok(ActionResult::ok(format!("typed {} chars", text.chars().count())))
            }
            Action::Select => {
                if let Ok(r) = pattern::select_at(x, y) {
                    if r.success {
                        return Ok(ActionResult::ok(r.detail));
                    }
                }
                input::send_click_raw(x, y, "left");
                Ok(ActionResult::ok(format!("synthetic select click at ({x},{y})")))
            }
            Action::Expand => {
                let r = pattern::expand_at(x, y)?;
                Ok(ActionResult { success: r.success, message: r.detail.clone(), error: (!r.success).then_some(r.detail) })
            }
            Action::Collapse => {
                let r = pattern::collapse_at(x, y)?;
                Ok(ActionResult { success: r.success, message: r.detail.clone(), error: (!r.success).then_some(r.detail) })
            }
            Action::Scroll => {
                let direction = request
                    .direction
                    .ok_or_else(|| CupError::InvalidInput("scroll requires 'direction'".into()))?;
                let (delta, horizontal) = match direction {
                    Direction::Up => (120, false),
                    Direction::Down => (-120, false),
                    Direction::Right => (120, true),
                    Direction::Left => (-120, true),
                };
                input::send_scroll_raw(x, y, delta, horizontal);
                Ok(ActionResult::ok(format!("scrolled {direction} at ({x},{y})")))
            }
            Action::Increment => {
                input::send_key_raw(vk_for_key("up").unwrap(), false);
                input::send_key_raw(vk_for_key("up").unwrap(), true);
                Ok(ActionResult::ok("incremented"))
            }
            Action::Decrement => {
                input::send_key_raw(vk_for_key("down").unwrap(), false);
                input::send_key_raw(vk_for_key("down").unwrap(), true);
                Ok(ActionResult::ok("decremented"))
            }
            Action::Focus => {
                input::send_mouse_move_raw(x, y);
                Ok(ActionResult::ok(format!("focused element at ({x},{y})")))
            }
            Action::Dismiss => {
                let esc = vk_for_key("escape").unwrap();
                input::send_key_raw(esc, false);
                input::send_key_raw(esc, true);
                Ok(ActionResult::ok("dismissed"))
            }
            Action::PressKeys => unreachable!("handled above"),
        }
    }

    fn press_keys(&self, combo: &ParsedCombo) -> Result<ActionResult, CupError> {
        let codes = combo_to_vk_sequence(combo)?;
        input::send_hotkey_raw(&codes);
        Ok(ActionResult::ok(format!("sent {} key(s)", codes.len())))
    }

    fn launch_app(&self, query: &str) -> Result<ActionResult, CupError> {
        let candidates = get_start_apps()?;
        let Some(app) = fuzzy_match(query, &candidates) else {
            return Ok(ActionResult::fail(format!("no installed app matched '{query}'")));
        };

        Command::new("powershell")
            .args(["-NoProfile", "-Command", &format!("Start-Process -FilePath '{}'", app.launch_id)])
            .status()
            .map_err(|e| CupError::native(Platform::Windows, format!("Start-Process: {e}")))?;

        wait_for_window(|| {
            Ok(window::list_windows()
                .map_err(|e| CupError::native(Platform::Windows, e.to_string()))?
                .iter()
                .any(|w| w.title.to_lowercase().contains(&app.name.to_lowercase())))
        })?;

        Ok(ActionResult::ok(format!("launched '{}'", app.name)))
    }
}

/// Enumerates installed applications via PowerShell's `Get-StartApps`,
/// mirroring PowerShell's `Get-StartApps` enumeration.
fn get_start_apps() -> Result<Vec<AppCandidate>, CupError> {
    let output = Command::new("powershell")
        .args(["-NoProfile", "-Command", "Get-StartApps | ConvertTo-Json"])
        .output()
        .map_err(|e| CupError::native(Platform::Windows, format!("Get-StartApps: {e}")))?;

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let entries = match parsed {
        serde_json::Value::Array(a) => a,
        single @ serde_json::Value::Object(_) => vec![single],
        _ => Vec::new(),
    };

    Ok(entries
        .into_iter()
        .filter_map(|e| {
            Some(AppCandidate {
                name: e.get("Name")?.as_str()?.to_owned(),
                launch_id: e.get("AppID")?.as_str()?.to_owned(),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_lookup_resolves_letters_and_named_keys() {
        assert_eq!(vk_for_key("a"), Some(b'A' as u16));
        assert!(vk_for_key("enter").is_some());
        assert!(vk_for_key("not-a-key").is_none());
    }

    #[test]
    fn combo_to_vk_sequence_rejects_unknown_key() {
        let combo = ParsedCombo { modifiers: vec![Modifier::Ctrl], main_keys: vec!["???".into()] };
        assert!(combo_to_vk_sequence(&combo).is_err());
    }

    #[test]
    fn combo_to_vk_sequence_builds_modifier_plus_key() {
        let combo = ParsedCombo { modifiers: vec![Modifier::Ctrl], main_keys: vec!["c".into()] };
        let codes = combo_to_vk_sequence(&combo).unwrap();
        assert_eq!(codes.len(), 2);
    }
}
