//! Boundary between the grammar core and whatever draws the page.
//!
//! The core never touches the DOM. It asks a [`SurfaceHost`] to mark spans,
//! show a picker or swap text, and every request reports back through
//! [`HostError`] instead of failing silently.

use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use super::model::{AnnotationSpan, PickerPosition, Replacement, SurfaceId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("surface {0} is no longer in the page")]
    SurfaceLost(SurfaceId),
    #[error("host rejected the edit: {0}")]
    Rejected(String),
    #[error("host did not acknowledge in time")]
    Timeout,
    #[error("host unavailable: {0}")]
    Unavailable(String),
}

/// Payload for the single correction picker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerView {
    pub surface: SurfaceId,
    pub finding_index: usize,
    pub position: PickerPosition,
    pub message: String,
    pub replacements: Vec<Replacement>,
}

/// Short, non-blocking messages shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Notice {
    /// The grammar server could not be reached; shown once per outage.
    ServiceUnavailable,
    /// A correction could not be written in place and was copied instead.
    CopiedToClipboard,
}

pub trait SurfaceHost: Send + Sync + 'static {
    fn mark_spans(&self, surface: &SurfaceId, spans: &[AnnotationSpan]) -> Result<(), HostError>;

    fn clear_spans(&self, surface: &SurfaceId) -> Result<(), HostError>;

    fn show_picker(&self, picker: &PickerView) -> Result<(), HostError>;

    fn dismiss_picker(&self) -> Result<(), HostError>;

    /// Replaces the whole text of `surface` and places the caret at `caret`
    /// (UTF-16 units). Resolves once the page confirms or refuses the edit.
    fn commit_text(
        &self,
        surface: &SurfaceId,
        text: &str,
        caret: usize,
    ) -> impl Future<Output = Result<(), HostError>> + Send;

    fn write_clipboard_fallback(&self, text: &str) -> Result<(), HostError>;

    fn notify(&self, notice: Notice) -> Result<(), HostError>;
}
