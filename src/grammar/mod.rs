//! Inline grammar checking for editable elements in the chat page.
//!
//! Text flows page -> [`controller`] -> [`service`] -> [`resolver`] ->
//! [`renderer`], and corrections go back through [`applier`]. Everything
//! that touches the page goes through [`host::SurfaceHost`].

pub mod applier;
pub mod commands;
pub mod controller;
pub mod host;
pub mod model;
pub mod renderer;
pub mod resolver;
pub mod service;
pub mod tauri_host;

pub use controller::{CheckReport, GrammarController, InputOutcome};
pub use model::{Finding, SurfaceId, TextSnapshot};
pub use tauri_host::TauriSurfaceHost;

/// Injected into the chat page before its own scripts run.
pub const HOST_SCRIPT: &str = include_str!("host_script.js");
