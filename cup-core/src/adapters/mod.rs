//! Platform adapter interface (spec §4.1) and platform auto-detection
//! (`detect_platform`/`get_adapter`).
//!
//! Modelled as a capability set per spec §9: identity, lifecycle, screen
//! query, window enumeration, tree capture — one trait, one implementation
//! per platform, the session picks one at construction.

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod web;
#[cfg(windows)]
pub mod windows;

use crate::errors::CupError;
use crate::schema::{CaptureStats, CupNode, Platform, RefTable, ScreenInfo, WindowDescriptor};

/// Everything a platform backend must provide to drive capture (spec §4.1).
pub trait PlatformAdapter: Send + Sync {
    fn platform_name(&self) -> Platform;

    /// Idempotent one-time setup (COM init, D-Bus registry bootstrap, CDP
    /// target probe). Safe to call more than once.
    fn initialize(&self) -> Result<(), CupError>;

    /// Primary display geometry, logical units, scale >= 1.
    fn get_screen_info(&self) -> Result<ScreenInfo, CupError>;

    fn get_foreground_window(&self) -> Result<WindowDescriptor, CupError>;

    /// All visible top-level windows.
    fn get_all_windows(&self) -> Result<Vec<WindowDescriptor>, CupError>;

    /// MUST NOT walk trees; near-instant lightweight descriptors.
    fn get_window_list(&self) -> Result<Vec<WindowDescriptor>, CupError>;

    /// The desktop surface (icons, widgets), if the platform has one.
    fn get_desktop_window(&self) -> Result<Option<WindowDescriptor>, CupError>;

    /// Walks each window's accessibility subtree to `max_depth`, builds CUP
    /// nodes, and returns the ref table. More than one window handle
    /// produces a synthetic root wrapping one child tree per window.
    fn capture_tree(
        &self,
        windows: &[WindowDescriptor],
        max_depth: usize,
    ) -> Result<(CupNode, CaptureStats, RefTable), CupError>;
}

pub fn detect_platform() -> Result<Platform, CupError> {
    if cfg!(windows) {
        Ok(Platform::Windows)
    } else if cfg!(target_os = "macos") {
        Ok(Platform::Macos)
    } else if cfg!(target_os = "linux") {
        Ok(Platform::Linux)
    } else {
        Err(CupError::Environment("unsupported platform".into()))
    }
}

/// Returns a freshly-initialized adapter instance. Callers (e.g. `Session`)
/// hold onto it for reuse; each call constructs a new one.
pub fn get_adapter(platform: Option<Platform>) -> Result<Box<dyn PlatformAdapter>, CupError> {
    let platform = match platform {
        Some(p) => p,
        None => detect_platform()?,
    };

    let adapter: Box<dyn PlatformAdapter> = match platform {
        #[cfg(windows)]
        Platform::Windows => Box::new(windows::WindowsAdapter::new()),
        #[cfg(not(windows))]
        Platform::Windows => {
            return Err(CupError::Environment("windows adapter unavailable on this build".into()))
        }
        #[cfg(target_os = "macos")]
        Platform::Macos => Box::new(macos::MacosAdapter::new()),
        #[cfg(not(target_os = "macos"))]
        Platform::Macos => {
            return Err(CupError::Environment("macos adapter unavailable on this build".into()))
        }
        #[cfg(target_os = "linux")]
        Platform::Linux => Box::new(linux::LinuxAdapter::new()),
        #[cfg(not(target_os = "linux"))]
        Platform::Linux => {
            return Err(CupError::Environment("linux adapter unavailable on this build".into()))
        }
        Platform::Web => Box::new(web::WebAdapter::new(crate::config::CupConfig::from_env())),
        Platform::Android | Platform::Ios => {
            return Err(CupError::Environment(format!(
                "no adapter available for platform '{platform}'. currently supported: windows, macos, linux, web"
            )))
        }
    };

    adapter.initialize()?;
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_platform_picks_a_supported_backend() {
        let p = detect_platform().unwrap();
        assert!(matches!(p, Platform::Windows | Platform::Macos | Platform::Linux));
    }
}
