//! `cup_core` -- cross-platform accessibility tree capture and action
//! dispatch (Computer Use Protocol).
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | `CupError` enum via `thiserror` |
//! | [`config`] | ambient environment configuration |
//! | [`schema`] | node/envelope/ref-table wire types |
//! | [`roles`], [`states`], [`actions`] | the three closed CUP vocabularies |
//! | [`format`] | tree shaping + compact-text serialisation |
//! | [`search`] | natural-language element search |
//! | [`adapters`] | one `PlatformAdapter` per backend (Windows/macOS/Linux/web) |
//! | [`dispatch`] | one `ActionDispatcher` per backend |
//! | [`session`] | orchestrates capture, search and dispatch behind one API |
//! | [`system_info`] | host telemetry via `sysinfo` |

pub mod actions;
pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod format;
pub mod roles;
pub mod schema;
pub mod search;
pub mod session;
pub mod states;
pub mod system_info;

#[cfg(windows)]
pub mod com;
#[cfg(windows)]
pub mod input;
#[cfg(windows)]
pub mod pattern;
#[cfg(windows)]
pub mod query;
#[cfg(windows)]
pub mod tree;
#[cfg(windows)]
pub mod window;

pub use errors::CupError;
pub use schema::{CupNode, Envelope, NodeId};
pub use session::Session;
