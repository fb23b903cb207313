//! Linux action dispatcher.
//!
//! Tries the AT-SPI2 `org.a11y.atspi.Action` interface's `DoAction` first
//! (the direct D-Bus analogue of UIA pattern invocation), then falls back to
//! a synthetic `xdotool` input event addressed by screen coordinates -- the
//! closest portable equivalent to `SendInput`/`CGEvent` available without a
//! vendored XTest/uinput binding. `xdotool` wraps libXtst, the same
//! injection path a hand-rolled XTest client would use.

use std::process::Command;
use std::thread;
use std::time::Duration;

use zbus::blocking::Connection;
use zbus::names::{BusName, InterfaceName};
use zbus::zvariant::ObjectPath;

use crate::actions::Action;
use crate::adapters::linux::AtspiHandle;
use crate::dispatch::launch::{fuzzy_match, wait_for_window, AppCandidate};
use crate::dispatch::{
    resolve_modifier_only, ActionDispatcher, ActionRequest, ActionResult, Direction, Modifier, ParsedCombo,
};
use crate::errors::CupError;
use crate::schema::{NativeHandle, Platform};

const ATSPI_ACTION: &str = "org.a11y.atspi.Action";
const ATSPI_COMPONENT: &str = "org.a11y.atspi.Component";
const ATSPI_VALUE: &str = "org.a11y.atspi.Value";
const DBUS_PROPERTIES: &str = "org.freedesktop.DBus.Properties";

pub struct LinuxDispatcher;

impl LinuxDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LinuxDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn atspi_handle<'a>(handle: Option<&'a NativeHandle>) -> Result<&'a AtspiHandle, CupError> {
    match handle {
        Some(NativeHandle::Linux(h)) => Ok(h),
        Some(_) => Err(CupError::InvalidInput("handle does not belong to the linux adapter".into())),
        None => Err(CupError::InvalidInput("action requires a captured node".into())),
    }
}

fn connect() -> Result<Connection, CupError> {
    Connection::session().map_err(|e| CupError::Environment(format!("D-Bus session bus unavailable: {e}")))
}

fn dbus_call<B: serde::ser::Serialize + zbus::zvariant::DynamicType>(
    conn: &Connection,
    dest: &str,
    path: &str,
    iface: &str,
    method: &str,
    body: &B,
) -> zbus::Result<zbus::Message> {
    let dest: BusName = dest.try_into().map_err(zbus::Error::from)?;
    let obj_path: ObjectPath = path.try_into().map_err(zbus::Error::from)?;
    let iface_name: InterfaceName = iface.try_into().map_err(zbus::Error::from)?;
    conn.call_method(Some(dest), obj_path, Some(iface_name), method, body)
}

/// Finds the index of a named AT-SPI2 action ("click"/"press"/"toggle"/...)
/// among the element's `GetNActions`/`GetName` list.
fn find_action_index(conn: &Connection, h: &AtspiHandle, names: &[&str]) -> Option<i32> {
    let count: i32 = dbus_call(conn, &h.bus_name, &h.path, ATSPI_ACTION, "GetNActions", &())
        .ok()?
        .body()
        .deserialize()
        .ok()?;
    for i in 0..count {
        if let Ok(reply) = dbus_call(conn, &h.bus_name, &h.path, ATSPI_ACTION, "GetName", &(i,)) {
            if let Ok(name) = reply.body().deserialize::<String>() {
                if names.iter().any(|n| name.eq_ignore_ascii_case(n)) {
                    return Some(i);
                }
            }
        }
    }
    None
}

fn do_action(conn: &Connection, h: &AtspiHandle, names: &[&str]) -> Result<bool, CupError> {
    let Some(idx) = find_action_index(conn, h, names) else { return Ok(false) };
    let reply = dbus_call(conn, &h.bus_name, &h.path, ATSPI_ACTION, "DoAction", &(idx,))?;
    Ok(reply.body().deserialize::<bool>().unwrap_or(false))
}

fn component_center(conn: &Connection, h: &AtspiHandle) -> Option<(i32, i32)> {
    let (x, y, w, hgt): (i32, i32, i32, i32) =
        dbus_call(conn, &h.bus_name, &h.path, ATSPI_COMPONENT, "GetExtents", &(0u32,)).ok()?.body().deserialize().ok()?;
    if w <= 0 || hgt <= 0 {
        return None;
    }
    Some((x + w / 2, y + hgt / 2))
}

fn set_text_value(conn: &Connection, h: &AtspiHandle, text: &str) -> Result<bool, CupError> {
    let reply = dbus_call(
        conn,
        &h.bus_name,
        &h.path,
        DBUS_PROPERTIES,
        "Set",
        &(ATSPI_VALUE, "CurrentValue", zbus::zvariant::Value::from(text.parse::<f64>().unwrap_or(0.0))),
    );
    // `Value.CurrentValue` is numeric-only (sliders/spinners); text widgets
    // have no settable D-Bus property, so a failure here is expected and the
    // caller falls through to the `xdotool` keystroke path.
    Ok(reply.is_ok())
}

fn xdotool(args: &[&str]) -> Result<(), CupError> {
    let status = Command::new("xdotool")
        .args(args)
        .status()
        .map_err(|e| CupError::native(Platform::Linux, format!("xdotool: {e} (is xdotool installed?)")))?;
    if status.success() {
        Ok(())
    } else {
        Err(CupError::native(Platform::Linux, format!("xdotool {:?} exited with {status}", args)))
    }
}

fn synthetic_click(x: i32, y: i32, button: &str) -> Result<(), CupError> {
    let btn = match button {
        "right" => "3",
        "middle" => "2",
        _ => "1",
    };
    xdotool(&["mousemove", &x.to_string(), &y.to_string()])?;
    xdotool(&["click", btn])
}

fn xdotool_key_name(key: &str) -> &str {
    match key.to_ascii_lowercase().as_str() {
        "enter" | "return" => "Return",
        "tab" => "Tab",
        "esc" | "escape" => "Escape",
        "space" => "space",
        "backspace" => "BackSpace",
        "delete" | "del" => "Delete",
        "up" => "Up",
        "down" => "Down",
        "left" => "Left",
        "right" => "Right",
        "home" => "Home",
        "end" => "End",
        other => other,
    }
}

fn modifier_name(m: Modifier) -> &'static str {
    match m {
        Modifier::Ctrl => "ctrl",
        Modifier::Alt => "alt",
        Modifier::Shift => "shift",
        Modifier::Meta => "super",
    }
}

impl ActionDispatcher for LinuxDispatcher {
    fn platform_name(&self) -> Platform {
        Platform::Linux
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

        let handle = atspi_handle(handle)?;
        let conn = connect()?;

        match action {
            Action::Click | Action::Doubleclick | Action::Longpress => {
                if do_action(&conn, handle, &["click", "press"])? {
                    return Ok(ActionResult::ok("AT-SPI2 DoAction succeeded"));
                }
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to click"));
                };
                synthetic_click(x, y, "left")?;
                if action == Action::Doubleclick {
                    synthetic_click(x, y, "left")?;
                }
                if action == Action::Longpress {
                    thread::sleep(Duration::from_millis(600));
                }
                Ok(ActionResult::ok(format!("synthetic click at ({x},{y})")))
            }
            Action::Rightclick => {
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to click"));
                };
                synthetic_click(x, y, "right")?;
                Ok(ActionResult::ok(format!("synthetic right click at ({x},{y})")))
            }
            Action::Toggle => {
                if do_action(&conn, handle, &["toggle", "click"])? {
                    Ok(ActionResult::ok("toggled via AT-SPI2 DoAction"))
                } else {
                    Ok(ActionResult::fail("element does not expose a toggle action"))
                }
            }
            Action::Setvalue | Action::Type => {
                let text = request
                    .text
                    .as_deref()
                    .ok_or_else(|| CupError::InvalidInput(format!("{action} requires 'text'")))?;
                if action == Action::Setvalue && set_text_value(&conn, handle, text)? {
                    return Ok(ActionResult::ok("set numeric value via AT-SPI2 Value interface"));
                }
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to focus"));
                };
                xdotool(&["mousemove", &x.to_string(), &y.to_string()])?;
                xdotool(&["click", "1"])?;
                xdotool(&["type", "--clearmodifiers", text])?;
                Ok(ActionResult::ok(format!("typed {} chars", text.chars().count())))
            }
            Action::Select => {
                if do_action(&conn, handle, &["select", "click"])? {
                    return Ok(ActionResult::ok("selected via AT-SPI2 DoAction"));
                }
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to select"));
                };
                synthetic_click(x, y, "left")?;
                Ok(ActionResult::ok(format!("synthetic select click at ({x},{y})")))
            }
            Action::Expand => {
                if do_action(&conn, handle, &["expand", "click"])? {
                    Ok(ActionResult::ok("expanded via AT-SPI2 DoAction"))
                } else {
                    Ok(ActionResult::fail("element does not expose an expand action"))
                }
            }
            Action::Collapse => {
                if do_action(&conn, handle, &["collapse", "click"])? {
                    Ok(ActionResult::ok("collapsed via AT-SPI2 DoAction"))
                } else {
                    xdotool(&["key", "Escape"])?;
                    Ok(ActionResult::ok("collapsed (sent Escape)"))
                }
            }
            Action::Scroll => {
                let direction = request
                    .direction
                    .ok_or_else(|| CupError::InvalidInput("scroll requires 'direction'".into()))?;
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to scroll"));
                };
                // xdotool mouse buttons 4-7: up, down, left, right.
                let button = match direction {
                    Direction::Up => "4",
                    Direction::Down => "5",
                    Direction::Left => "6",
                    Direction::Right => "7",
                };
                xdotool(&["mousemove", &x.to_string(), &y.to_string()])?;
                xdotool(&["click", button])?;
                Ok(ActionResult::ok(format!("scrolled {direction} at ({x},{y})")))
            }
            Action::Increment => {
                xdotool(&["key", "Up"])?;
                Ok(ActionResult::ok("incremented"))
            }
            Action::Decrement => {
                xdotool(&["key", "Down"])?;
                Ok(ActionResult::ok("decremented"))
            }
            Action::Focus => {
                let Some((x, y)) = component_center(&conn, handle) else {
                    return Ok(ActionResult::fail("element has no Component extents to focus"));
                };
                xdotool(&["mousemove", &x.to_string(), &y.to_string()])?;
                Ok(ActionResult::ok(format!("focused element at ({x},{y})")))
            }
            Action::Dismiss => {
                xdotool(&["key", "Escape"])?;
                Ok(ActionResult::ok("dismissed (sent Escape)"))
            }
            Action::PressKeys => unreachable!("handled above"),
        }
    }

    fn press_keys(&self, combo: &ParsedCombo) -> Result<ActionResult, CupError> {
        let mut parts: Vec<String> = combo.modifiers.iter().map(|m| modifier_name(*m).to_string()).collect();
        parts.extend(combo.main_keys.iter().map(|k| xdotool_key_name(k).to_string()));
        if parts.is_empty() {
            return Err(CupError::InvalidInput("combo resolved to no keys".into()));
        }
        let combo_str = parts.join("+");
        xdotool(&["key", &combo_str])?;
        Ok(ActionResult::ok(format!("sent combo '{combo_str}'")))
    }

    fn launch_app(&self, query: &str) -> Result<ActionResult, CupError> {
        let candidates = scan_desktop_entries()?;
        let Some(app) = fuzzy_match(query, &candidates) else {
            return Ok(ActionResult::fail(format!("no installed app matched '{query}'")));
        };

        Command::new("gtk-launch")
            .arg(&app.launch_id)
            .status()
            .or_else(|_| Command::new("gio").args(["launch", &app.launch_id]).status())
            .map_err(|e| CupError::native(Platform::Linux, format!("failed to launch '{}': {e}", app.launch_id)))?;

        let name_lower = app.name.to_lowercase();
        wait_for_window(|| {
            let adapter = crate::adapters::linux::LinuxAdapter::new();
            Ok(crate::adapters::PlatformAdapter::get_all_windows(&adapter)
                .map_err(|e| CupError::native(Platform::Linux, e.to_string()))?
                .iter()
                .any(|w| w.title.to_lowercase().contains(&name_lower)))
        })?;

        Ok(ActionResult::ok(format!("launched '{}'", app.name)))
    }
}

/// Scans the standard XDG application directories for `.desktop` entries,
/// the Linux analogue of `Get-StartApps`/`/Applications` enumeration.
fn scan_desktop_entries() -> Result<Vec<AppCandidate>, CupError> {
    let mut dirs = vec!["/usr/share/applications".to_string(), "/usr/local/share/applications".to_string()];
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(format!("{home}/.local/share/applications"));
    }

    let mut out = Vec::new();
    for dir in dirs {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("desktop") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let name = std::fs::read_to_string(&path)
                .ok()
                .and_then(|contents| {
                    contents.lines().find_map(|l| l.strip_prefix("Name=").map(str::to_owned))
                })
                .unwrap_or_else(|| stem.to_owned());
            out.push(AppCandidate { name, launch_id: stem.to_owned() });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xdotool_key_name_maps_named_keys() {
        assert_eq!(xdotool_key_name("enter"), "Return");
        assert_eq!(xdotool_key_name("esc"), "Escape");
        assert_eq!(xdotool_key_name("x"), "x");
    }

    #[test]
    fn modifier_name_maps_all_variants() {
        assert_eq!(modifier_name(Modifier::Ctrl), "ctrl");
        assert_eq!(modifier_name(Modifier::Meta), "super");
    }
}
