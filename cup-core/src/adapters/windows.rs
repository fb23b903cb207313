//! Windows UI Automation adapter.
//!
//! Generalises `tree::capture_tree_raw` (one
//! `BuildUpdatedCache(TreeScope_Subtree)` call per window, parallelised over
//! Rayon) and `window::{enumerate_visible_windows, get_window_info}` into the
//! [`PlatformAdapter`] surface: the raw [`crate::tree::element::TreeElementSnapshot`]
//! walk is unchanged, only the leaf conversion differs -- each snapshot now
//! becomes a [`CupNode`] with a closed role/state/action vocabulary instead
//! of a free-form `control_type` string, following the property-to-role
//! mapping a `build_cup_node()`-style function applies to the same
//! UIA properties.

use std::collections::HashMap;

use rayon::prelude::*;
use windows::Win32::Foundation::HWND;
use windows::Win32::UI::WindowsAndMessaging::{GetDesktopWindow, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN};

use crate::actions::Action;
use crate::com::COMGuard;
use crate::errors::CupError;
use crate::roles::Role;
use crate::schema::{
    Bounds, CaptureStats, CupNode, IdGenerator, NativeHandle, Platform, RefTable, ScreenInfo,
    WindowDescriptor,
};
use crate::states::State;
use crate::tree::element::TreeElementSnapshot;
use crate::tree::capture_tree_raw;
use crate::window;

use super::PlatformAdapter;

/// Handle to one UIA element, re-resolved by screen point the same way the
/// teacher's `pattern.rs` re-resolves elements per call rather than holding
/// onto a COM reference (`IUIAutomationElement` is not `Send`).
#[derive(Debug, Clone)]
pub struct UiaHandle {
    pub hwnd: isize,
    pub point: (i32, i32),
    pub automation_id: String,
    pub accelerator_key: String,
}

pub struct WindowsAdapter;

impl WindowsAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn window_descriptor(info: &window::WindowInfo, foreground_hwnd: isize) -> WindowDescriptor {
    WindowDescriptor {
        handle: info.hwnd.to_string(),
        title: info.title.clone(),
        pid: Some(info.pid),
        bundle_id: None,
        foreground: info.hwnd == foreground_hwnd,
        bounds: Some(Bounds {
            x: info.rect.left,
            y: info.rect.top,
            w: info.rect.right - info.rect.left,
            h: info.rect.bottom - info.rect.top,
        }),
        url: None,
    }
}

impl PlatformAdapter for WindowsAdapter {
    fn platform_name(&self) -> Platform {
        Platform::Windows
    }

    fn initialize(&self) -> Result<(), CupError> {
        COMGuard::init().map_err(|e| CupError::native(Platform::Windows, e.to_string()))?;
        Ok(())
    }

    fn get_screen_info(&self) -> Result<ScreenInfo, CupError> {
        let w = unsafe { GetSystemMetrics(SM_CXSCREEN) };
        let h = unsafe { GetSystemMetrics(SM_CYSCREEN) };
        if w <= 0 || h <= 0 {
            return Err(CupError::native(Platform::Windows, "GetSystemMetrics returned 0".into()));
        }
        Ok(ScreenInfo::new(w, h, 1.0))
    }

    fn get_foreground_window(&self) -> Result<WindowDescriptor, CupError> {
        let fg = window::get_foreground_hwnd();
        let info = window::get_window_info(fg)
            .map_err(|e| CupError::native(Platform::Windows, e.to_string()))?;
        Ok(window_descriptor(&info, fg))
    }

    fn get_all_windows(&self) -> Result<Vec<WindowDescriptor>, CupError> {
        let fg = window::get_foreground_hwnd();
        let infos =
            window::list_windows().map_err(|e| CupError::native(Platform::Windows, e.to_string()))?;
        Ok(infos.iter().map(|i| window_descriptor(i, fg)).collect())
    }

    fn get_window_list(&self) -> Result<Vec<WindowDescriptor>, CupError> {
        self.get_all_windows()
    }

    fn get_desktop_window(&self) -> Result<Option<WindowDescriptor>, CupError> {
        let hwnd = unsafe { GetDesktopWindow() };
        let info = window::get_window_info(hwnd.0 as isize)
            .map_err(|e| CupError::native(Platform::Windows, e.to_string()))?;
        Ok(Some(window_descriptor(&info, window::get_foreground_hwnd())))
    }

    fn capture_tree(
        &self,
        windows: &[WindowDescriptor],
        max_depth: usize,
    ) -> Result<(CupNode, CaptureStats, RefTable), CupError> {
        let handles: Vec<isize> = windows
            .iter()
            .filter_map(|w| w.handle.parse::<isize>().ok())
            .collect();

        let snapshots = capture_tree_raw(&handles, max_depth);

        let ids = IdGenerator::new();
        let ref_table = RefTable::new();
        let mut stats = CaptureStats::default();

        let mut roots = Vec::with_capacity(snapshots.len());
        for (win, snapshot) in windows.iter().zip(snapshots.iter()) {
            let hwnd = win.handle.parse::<isize>().unwrap_or(0);
            let mut node = convert_snapshot(snapshot, hwnd, &ids, &ref_table, &mut stats);
            node.role = Role::Window;
            if node.name.is_empty() {
                node.name = win.title.clone();
            }
            roots.push(node);
        }

        let synthetic_root = CupNode {
            id: IdGenerator::new().next(),
            role: Role::Desktop,
            name: "Desktop".into(),
            description: None,
            value: None,
            bounds: None,
            states: Vec::new(),
            actions: Vec::new(),
            attributes: Default::default(),
            children: roots,
            platform: HashMap::new(),
        };
        Ok((synthetic_root, stats, ref_table))
    }
}

fn convert_snapshot(
    snap: &TreeElementSnapshot,
    hwnd: isize,
    ids: &IdGenerator,
    ref_table: &RefTable,
    stats: &mut CaptureStats,
) -> CupNode {
    let role = map_control_type(&snap.control_type, &snap.class_name);

    let mut states = Vec::new();
    if snap.has_keyboard_focus {
        states.push(State::Focused);
    }
    if !snap.is_enabled {
        states.push(State::Disabled);
    }
    if snap.is_offscreen {
        states.push(State::Offscreen);
    }

    let mut actions = Vec::new();
    if snap.is_keyboard_focusable {
        actions.push(Action::Focus);
    }
    if matches!(
        role,
        Role::Button | Role::Link | Role::Menuitem | Role::Tab | Role::Treeitem | Role::Listitem
    ) {
        actions.push(Action::Click);
    }
    if matches!(role, Role::Checkbox | Role::Radio | Role::Switch) {
        actions.push(Action::Toggle);
    }
    if matches!(role, Role::Textbox | Role::Searchbox | Role::Combobox | Role::Spinbutton) {
        actions.push(Action::Type);
        actions.push(Action::Setvalue);
    }
    if matches!(role, Role::Slider | Role::Spinbutton | Role::Progressbar) {
        actions.push(Action::Increment);
        actions.push(Action::Decrement);
    }
    if matches!(role, Role::Scrollbar) {
        actions.push(Action::Scroll);
    }
    if matches!(role, Role::Listitem | Role::Treeitem | Role::Option | Role::Tab) {
        actions.push(Action::Select);
    }

    let [left, top, right, bottom] = snap.bounding_rect;
    let bounds = if right > left && bottom > top {
        Some(Bounds {
            x: left as i32,
            y: top as i32,
            w: (right - left) as i32,
            h: (bottom - top) as i32,
        })
    } else {
        None
    };

    let id = ids.next();
    let center = bounds
        .map(|b| (b.x + b.w / 2, b.y + b.h / 2))
        .unwrap_or((0, 0));
    ref_table.insert(
        id,
        NativeHandle::Windows(UiaHandle {
            hwnd,
            point: center,
            automation_id: snap.automation_id.clone(),
            accelerator_key: snap.accelerator_key.clone(),
        }),
    );

    let children: Vec<CupNode> = snap
        .children
        .iter()
        .map(|c| convert_snapshot(c, hwnd, ids, ref_table, stats))
        .collect();

    stats.nodes += 1;
    stats.max_depth = stats.max_depth.max(snap.depth);
    *stats.roles.entry(role.wire_name().to_owned()).or_insert(0) += 1;

    let mut platform = HashMap::new();
    if !snap.automation_id.is_empty() {
        platform.insert("automationId".to_string(), serde_json::json!(snap.automation_id));
    }
    if !snap.class_name.is_empty() {
        platform.insert("className".to_string(), serde_json::json!(snap.class_name));
    }

    CupNode {
        id,
        role,
        name: snap.name.clone(),
        description: None,
        value: None,
        bounds,
        states,
        actions,
        attributes: Default::default(),
        children,
        platform,
    }
}

/// Maps a UIA `LocalizedControlType`/`ControlType` name onto the closed CUP
/// role vocabulary (spec §3, §4.2).
fn map_control_type(control_type: &str, class_name: &str) -> Role {
    match control_type {
        "Button" | "SplitButton" => Role::Button,
        "CheckBox" => Role::Checkbox,
        "RadioButton" => Role::Radio,
        "ComboBox" => Role::Combobox,
        "Edit" => Role::Textbox,
        "Spinner" => Role::Spinbutton,
        "Slider" => Role::Slider,
        "ProgressBar" => Role::Progressbar,
        "Hyperlink" => Role::Link,
        "Image" => Role::Image,
        "Text" if class_name.eq_ignore_ascii_case("heading") => Role::Heading,
        "Text" => Role::Text,
        "List" => Role::List,
        "ListItem" => Role::Listitem,
        "DataItem" => Role::Gridcell,
        "Menu" => Role::Menu,
        "MenuBar" => Role::Menubar,
        "MenuItem" => Role::Menuitem,
        "Tab" => Role::Tablist,
        "TabItem" => Role::Tab,
        "DataGrid" => Role::Grid,
        "Table" => Role::Table,
        "Tree" => Role::Tree,
        "TreeItem" => Role::Treeitem,
        "Pane" => Role::Group,
        "Group" => Role::Group,
        "Document" => Role::Document,
        "ScrollBar" => Role::Scrollbar,
        "StatusBar" => Role::Statusbar,
        "TitleBar" => Role::Titlebar,
        "ToolBar" => Role::Toolbar,
        "ToolTip" => Role::Tooltip,
        "Window" => Role::Window,
        "Separator" => Role::Separator,
        "Thumb" => Role::Slider,
        "Header" | "HeaderItem" => Role::Columnheader,
        "AppBar" => Role::Toolbar,
        "Calendar" => Role::Grid,
        "SemanticZoom" => Role::Region,
        "Custom" => Role::Generic,
        _ => Role::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_control_types() {
        assert_eq!(map_control_type("Button", ""), Role::Button);
        assert_eq!(map_control_type("Edit", ""), Role::Textbox);
        assert_eq!(map_control_type("SomethingNew", ""), Role::Generic);
    }

    #[test]
    fn heading_detected_via_class_name() {
        assert_eq!(map_control_type("Text", "Heading"), Role::Heading);
        assert_eq!(map_control_type("Text", ""), Role::Text);
    }
}
