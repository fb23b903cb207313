//! Error types for `cup_core`.
//!
//! All Rust-side failures are funnelled through [`CupError`], which uses
//! `thiserror` for `Display`/`Error` derives, with one variant per error
//! kind (Environment, Invalid input, Stale reference, Native failure,
//! Timeout) shared across all four platform backends instead of one
//! variant per OS subsystem.

use thiserror::Error;

use crate::schema::{NodeId, Platform};

/// Top-level error type for the `cup_core` library.
///
/// Nothing in the core panics or propagates past a public API as an
/// exception/unwind; every fallible operation returns `Result<_, CupError>`
/// (spec §7: "propagated as typed results, never as exceptions").
#[derive(Debug, Error)]
pub enum CupError {
    /// Missing permission, missing native library, missing display, missing
    /// CDP target — surfaced with a remediation hint naming the OS setting.
    #[error("environment error: {0}")]
    Environment(String),

    /// Unknown action, missing required parameter, bad id, bad role string.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `id` is not present in the current ref table; caller must re-capture.
    #[error("stale reference: {0} not found in current capture")]
    StaleReference(NodeId),

    /// The underlying platform API returned a non-success code, or the
    /// element it refers to no longer exists.
    #[error("native {platform} failure: {detail}")]
    Native { platform: Platform, detail: String },

    /// A blocking wait (app-launch poll, CDP RPC round trip) exceeded its
    /// ceiling. Never reported as "still waiting" — every wait has a limit.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl CupError {
    pub fn native(platform: Platform, detail: impl Into<String>) -> Self {
        CupError::Native { platform, detail: detail.into() }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for CupError {
    fn from(err: windows::core::Error) -> Self {
        CupError::native(Platform::Windows, err.to_string())
    }
}

#[cfg(target_os = "linux")]
impl From<zbus::Error> for CupError {
    fn from(err: zbus::Error) -> Self {
        CupError::native(Platform::Linux, err.to_string())
    }
}

impl From<serde_json::Error> for CupError {
    fn from(err: serde_json::Error) -> Self {
        CupError::InvalidInput(format!("malformed json: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_reference_message_names_the_id() {
        let e = CupError::StaleReference(NodeId(3));
        assert!(e.to_string().contains("e3"));
    }

    #[test]
    fn native_error_names_the_platform() {
        let e = CupError::native(Platform::Macos, "AXError -25204");
        assert!(e.to_string().contains("macos"));
        assert!(e.to_string().contains("AXError"));
    }
}
