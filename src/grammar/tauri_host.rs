use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter};
use tauri_plugin_clipboard_manager::ClipboardExt;
use tokio::{sync::oneshot, time};

use crate::shell::window::MAIN_WINDOW;

use super::{
    host::{HostError, Notice, PickerView, SurfaceHost},
    model::{AnnotationSpan, SurfaceId},
};

/// Event names the injected page script listens on.
pub mod events {
    pub const SPANS: &str = "grammar://spans";
    pub const CLEAR: &str = "grammar://clear";
    pub const PICKER: &str = "grammar://picker";
    pub const PICKER_DISMISS: &str = "grammar://picker-dismiss";
    pub const COMMIT: &str = "grammar://commit";
    pub const NOTICE: &str = "grammar://notice";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommitStatus {
    Ok,
    Lost,
    Rejected,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SpansPayload<'a> {
    surface_id: &'a SurfaceId,
    spans: &'a [AnnotationSpan],
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SurfacePayload<'a> {
    surface_id: &'a SurfaceId,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct CommitPayload<'a> {
    surface_id: &'a SurfaceId,
    request_id: u64,
    text: &'a str,
    caret: usize,
}

/// [`SurfaceHost`] backed by the main webview. Requests go out as events;
/// text commits wait for the page to answer through `grammar_commit_ack`.
pub struct TauriSurfaceHost {
    app: AppHandle,
    next_request: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<CommitStatus>>>,
    ack_timeout_ms: AtomicU64,
}

impl TauriSurfaceHost {
    pub fn new(app: AppHandle, ack_timeout: Duration) -> Self {
        Self {
            app,
            next_request: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            ack_timeout_ms: AtomicU64::new(ack_timeout.as_millis() as u64),
        }
    }

    /// Used by commits issued after the call.
    pub fn set_ack_timeout(&self, ack_timeout: Duration) {
        self.ack_timeout_ms
            .store(ack_timeout.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms.load(Ordering::Relaxed))
    }

    /// Routes the page's answer to the waiting commit. Returns `false` for
    /// unknown or already timed-out requests.
    pub fn acknowledge(&self, request_id: u64, status: CommitStatus) -> bool {
        let sender = self.pending.lock().unwrap().remove(&request_id);
        match sender {
            Some(sender) => sender.send(status).is_ok(),
            None => false,
        }
    }

    fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) -> Result<(), HostError> {
        self.app
            .emit_to(MAIN_WINDOW, event, payload)
            .map_err(|err| HostError::Unavailable(err.to_string()))
    }
}

impl SurfaceHost for TauriSurfaceHost {
    fn mark_spans(&self, surface: &SurfaceId, spans: &[AnnotationSpan]) -> Result<(), HostError> {
        self.emit(
            events::SPANS,
            SpansPayload {
                surface_id: surface,
                spans,
            },
        )
    }

    fn clear_spans(&self, surface: &SurfaceId) -> Result<(), HostError> {
        self.emit(events::CLEAR, SurfacePayload { surface_id: surface })
    }

    fn show_picker(&self, picker: &PickerView) -> Result<(), HostError> {
        self.emit(events::PICKER, picker)
    }

    fn dismiss_picker(&self) -> Result<(), HostError> {
        self.emit(events::PICKER_DISMISS, ())
    }

    async fn commit_text(&self, surface: &SurfaceId, text: &str, caret: usize) -> Result<(), HostError> {
        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id, tx);

        let payload = CommitPayload {
            surface_id: surface,
            request_id,
            text,
            caret,
        };
        if let Err(err) = self.emit(events::COMMIT, payload) {
            self.pending.lock().unwrap().remove(&request_id);
            return Err(err);
        }

        let answer = time::timeout(self.ack_timeout(), rx).await;
        self.pending.lock().unwrap().remove(&request_id);

        match answer {
            Ok(Ok(CommitStatus::Ok)) => Ok(()),
            Ok(Ok(CommitStatus::Lost)) => Err(HostError::SurfaceLost(surface.clone())),
            Ok(Ok(CommitStatus::Rejected)) => {
                Err(HostError::Rejected("page refused the edit".into()))
            }
            Ok(Err(_)) => Err(HostError::Unavailable("commit channel closed".into())),
            Err(_) => Err(HostError::Timeout),
        }
    }

    fn write_clipboard_fallback(&self, text: &str) -> Result<(), HostError> {
        self.app
            .clipboard()
            .write_text(text.to_string())
            .map_err(|err| HostError::Unavailable(err.to_string()))
    }

    fn notify(&self, notice: Notice) -> Result<(), HostError> {
        self.emit(events::NOTICE, notice)
    }
}
