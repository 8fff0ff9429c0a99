use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use anyhow::Result;
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle, time};

use crate::settings::GrammarSettings;

use super::{
    applier::{self, ApplyResult},
    host::{HostError, Notice, SurfaceHost},
    model::{Finding, PickerPosition, Replacement, SurfaceId, TextSnapshot},
    renderer::AnnotationRenderer,
    resolver::{normalize, resolve, Resolution},
    service::{GrammarClient, ServiceError, ServiceErrorKind},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    Disabled,
    TooShort,
    TooLong,
    SurfaceGone,
    /// Nothing on the page has focus.
    NoFocus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CheckReport {
    Skipped {
        reason: SkipReason,
    },
    /// A newer check for the same surface was scheduled while this one was
    /// in flight; its result was thrown away.
    Superseded,
    Annotated {
        findings: usize,
        stale: usize,
        discarded: usize,
    },
    /// Findings came back but the page refused the spans; nothing is shown.
    NotRendered {
        findings: usize,
    },
    /// The server answered with something unusable; shown to the user as
    /// "no issues".
    Discarded,
    Failed {
        kind: ServiceErrorKind,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum InputOutcome {
    Scheduled { seq: u64 },
    BelowThreshold,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyAllReport {
    pub result: ApplyResult,
    pub applied: usize,
    pub skipped: usize,
    pub stale: usize,
}

struct CheckedText {
    snapshot: TextSnapshot,
    /// Only findings that still matched the live text when rendered; span
    /// `finding_index` values point into this list.
    findings: Vec<Finding>,
}

#[derive(Default)]
struct SurfaceSession {
    latest_seq: u64,
    live_text: String,
    pending: Option<JoinHandle<()>>,
    checked: Option<CheckedText>,
    /// The element left the page while its picker was open. Kept only so a
    /// click already on its way can still reach the clipboard.
    lost: bool,
}

impl SurfaceSession {
    /// Bumps the sequence number, which supersedes anything in flight.
    fn next_seq(&mut self) -> u64 {
        self.latest_seq += 1;
        self.latest_seq
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl Drop for SurfaceSession {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

/// Per-surface grammar sessions plus the shared renderer. Cheap to clone;
/// clones share state.
pub struct GrammarController<H: SurfaceHost> {
    inner: Arc<ControllerInner<H>>,
}

impl<H: SurfaceHost> Clone for GrammarController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<H> {
    host: H,
    settings: RwLock<GrammarSettings>,
    client: RwLock<GrammarClient>,
    sessions: Mutex<HashMap<SurfaceId, SurfaceSession>>,
    renderer: Mutex<AnnotationRenderer>,
    focused: RwLock<Option<SurfaceId>>,
    outage_notified: AtomicBool,
}

impl<H: SurfaceHost> GrammarController<H> {
    pub fn new(host: H, settings: GrammarSettings) -> Result<Self> {
        let client = GrammarClient::from_settings(&settings)?;
        let renderer = AnnotationRenderer::new(settings.max_picker_choices);
        Ok(Self {
            inner: Arc::new(ControllerInner {
                host,
                settings: RwLock::new(settings),
                client: RwLock::new(client),
                sessions: Mutex::new(HashMap::new()),
                renderer: Mutex::new(renderer),
                focused: RwLock::new(None),
                outage_notified: AtomicBool::new(false),
            }),
        })
    }

    pub fn host(&self) -> &H {
        &self.inner.host
    }

    pub fn settings(&self) -> GrammarSettings {
        self.inner.settings.read().unwrap().clone()
    }

    /// Swaps in new settings. Turning the checker off wipes every surface.
    pub async fn reconfigure(&self, settings: GrammarSettings) -> Result<()> {
        let client = GrammarClient::from_settings(&settings)?;
        let enabled = settings.enabled;
        let max_choices = settings.max_picker_choices;
        *self.inner.client.write().unwrap() = client;
        *self.inner.settings.write().unwrap() = settings;

        let mut sessions = self.inner.sessions.lock().await;
        let mut renderer = self.inner.renderer.lock().await;
        renderer.set_max_choices(max_choices);

        if !enabled {
            for surface in sessions.keys() {
                if let Err(err) = renderer.clear(&self.inner.host, surface) {
                    log_debug!("clearing {} on disable: {}", surface, err);
                }
            }
            sessions.clear();
        }
        Ok(())
    }

    pub fn on_focus(&self, surface: SurfaceId) {
        *self.inner.focused.write().unwrap() = Some(surface);
    }

    pub fn active_surface(&self) -> Option<SurfaceId> {
        self.inner.focused.read().unwrap().clone()
    }

    /// Records the surface's new text and (re)arms its debounce timer.
    pub async fn on_user_input(&self, surface: SurfaceId, text: String) -> InputOutcome {
        let settings = self.settings();
        if !settings.enabled {
            return InputOutcome::Disabled;
        }

        let mut sessions = self.inner.sessions.lock().await;
        let session = sessions.entry(surface.clone()).or_default();
        session.lost = false;
        session.live_text = text;
        session.cancel_pending();
        let seq = session.next_seq();

        if text_len(&session.live_text) < settings.min_text_chars {
            if session.checked.take().is_some() {
                let mut renderer = self.inner.renderer.lock().await;
                if let Err(err) = renderer.clear(&self.inner.host, &surface) {
                    log_debug!("clearing spans for {}: {}", surface, err);
                }
            }
            return InputOutcome::BelowThreshold;
        }

        let controller = self.clone();
        let delay = Duration::from_millis(settings.debounce_ms);
        session.pending = Some(tokio::spawn(async move {
            time::sleep(delay).await;
            let report = controller.run_check(&surface, seq).await;
            log_debug!("debounced check for {} (seq {}): {:?}", surface, seq, report);
        }));

        InputOutcome::Scheduled { seq }
    }

    /// Checks `text` right away, bypassing the debounce window.
    pub async fn on_check_requested(&self, surface: SurfaceId, text: String) -> CheckReport {
        self.check_now(surface, Some(text)).await
    }

    /// Checks the focused surface right away. Without `text` the last input
    /// seen for it is used.
    pub async fn on_check_active(&self, text: Option<String>) -> CheckReport {
        let Some(surface) = self.active_surface() else {
            return CheckReport::Skipped {
                reason: SkipReason::NoFocus,
            };
        };
        self.check_now(surface, text).await
    }

    async fn check_now(&self, surface: SurfaceId, text: Option<String>) -> CheckReport {
        if !self.settings().enabled {
            return CheckReport::Skipped {
                reason: SkipReason::Disabled,
            };
        }

        let seq = {
            let mut sessions = self.inner.sessions.lock().await;
            let session = match text {
                Some(text) => {
                    let session = sessions.entry(surface.clone()).or_default();
                    session.lost = false;
                    session.live_text = text;
                    session
                }
                None => match sessions.get_mut(&surface) {
                    Some(session) if !session.lost => session,
                    _ => {
                        return CheckReport::Skipped {
                            reason: SkipReason::SurfaceGone,
                        }
                    }
                },
            };
            session.cancel_pending();
            session.next_seq()
        };

        self.run_check(&surface, seq).await
    }

    pub async fn on_surface_lost(&self, surface: &SurfaceId) {
        {
            let mut sessions = self.inner.sessions.lock().await;
            let mut renderer = self.inner.renderer.lock().await;
            let picker_open = match renderer.release(&self.inner.host, surface) {
                Ok(dismissed) => dismissed,
                Err(err) => {
                    log_debug!("dismissing picker of lost {}: {}", surface, err);
                    true
                }
            };

            if picker_open {
                if let Some(session) = sessions.get_mut(surface) {
                    session.cancel_pending();
                    session.next_seq();
                    session.lost = true;
                    log_debug!("{} lost with its picker open; holding findings", surface);
                }
            } else if sessions.remove(surface).is_some() {
                log_debug!("disposed grammar session for {}", surface);
            }
        }

        let mut focused = self.inner.focused.write().unwrap();
        if focused.as_ref() == Some(surface) {
            *focused = None;
        }
    }

    /// Opens the picker for one of the surface's current findings.
    pub async fn on_context_action(
        &self,
        surface: &SurfaceId,
        finding_index: usize,
        position: PickerPosition,
    ) -> bool {
        let mut sessions = self.inner.sessions.lock().await;
        sessions.retain(|_, session| !session.lost);
        let Some(finding) = sessions
            .get(surface)
            .and_then(|session| session.checked.as_ref())
            .and_then(|checked| checked.findings.get(finding_index))
        else {
            return false;
        };

        let mut renderer = self.inner.renderer.lock().await;
        match renderer.show_picker(&self.inner.host, position, surface, finding_index, finding) {
            Ok(view) => view.is_some(),
            Err(err) => {
                log_warn!("could not open picker on {}: {}", surface, err);
                false
            }
        }
    }

    pub async fn on_dismiss_picker(&self) {
        self.inner
            .sessions
            .lock()
            .await
            .retain(|_, session| !session.lost);
        let mut renderer = self.inner.renderer.lock().await;
        if let Err(err) = renderer.dismiss_picker(&self.inner.host) {
            log_debug!("dismissing picker: {}", err);
        }
    }

    /// Applies one replacement. `live_text` is the surface's text at the time
    /// of the click, when the page can provide it.
    pub async fn on_apply_requested(
        &self,
        surface: &SurfaceId,
        finding_index: usize,
        replacement_index: usize,
        live_text: Option<String>,
    ) -> ApplyResult {
        let prepared = {
            let mut sessions = self.inner.sessions.lock().await;
            let Some(session) = sessions.get_mut(surface) else {
                return failed("no grammar session for this surface");
            };
            if let Some(live) = live_text {
                session.live_text = live;
            }
            let lost = session.lost;
            let Some(checked) = session.checked.as_ref() else {
                return failed("no findings for this surface");
            };
            let Some(finding) = checked.findings.get(finding_index) else {
                return failed("unknown finding");
            };
            let Some(replacement) = finding.replacements.get(replacement_index) else {
                return failed("unknown replacement");
            };

            let prepared = match resolve(finding, &checked.snapshot, &session.live_text) {
                Resolution::Stale => None,
                Resolution::Resolved(_) => Some((
                    live_basis(&checked.snapshot, &session.live_text),
                    finding.clone(),
                    replacement.clone(),
                )),
            };
            if lost {
                sessions.remove(surface);
            }
            (prepared, lost)
        };

        self.on_dismiss_picker().await;

        let (prepared, lost) = prepared;
        let Some((basis, finding, replacement)) = prepared else {
            log_debug!("finding {} on {} went stale before apply", finding_index, surface);
            return failed("text changed since it was checked");
        };

        if lost {
            let Some(correction) = applier::corrected_text(&basis, &finding, &replacement) else {
                return failed("finding does not fit the checked text");
            };
            return applier::clipboard_fallback(
                &self.inner.host,
                surface,
                correction.text,
                HostError::SurfaceLost(surface.clone()),
            );
        }

        let result = applier::apply(&self.inner.host, &basis, &finding, &replacement).await;
        if let ApplyResult::Committed { text, .. } = &result {
            self.after_commit(surface, text).await;
        }
        result
    }

    /// Applies the default replacement of every current finding that still
    /// matches the live text, in one edit.
    pub async fn on_apply_all_requested(
        &self,
        surface: &SurfaceId,
        live_text: Option<String>,
    ) -> ApplyAllReport {
        let prepared = {
            let mut sessions = self.inner.sessions.lock().await;
            let Some(session) = sessions.get_mut(surface) else {
                return ApplyAllReport::failed("no grammar session for this surface");
            };
            if session.lost {
                return ApplyAllReport::failed("surface left the page");
            }
            if let Some(live) = live_text {
                session.live_text = live;
            }
            let Some(checked) = session.checked.as_ref() else {
                return ApplyAllReport::failed("no findings for this surface");
            };

            let mut stale = 0;
            let mut edits: Vec<(Finding, Replacement)> = Vec::new();
            for finding in &checked.findings {
                let Some(replacement) = finding.default_replacement() else {
                    continue;
                };
                match resolve(finding, &checked.snapshot, &session.live_text) {
                    Resolution::Resolved(_) => edits.push((finding.clone(), replacement.clone())),
                    Resolution::Stale => stale += 1,
                }
            }
            (live_basis(&checked.snapshot, &session.live_text), edits, stale)
        };

        self.on_dismiss_picker().await;

        let (basis, edits, stale) = prepared;
        let (result, batch) = applier::apply_all(&self.inner.host, &basis, &edits).await;
        if let ApplyResult::Committed { text, .. } = &result {
            self.after_commit(surface, text).await;
        }

        ApplyAllReport {
            result,
            applied: batch.applied,
            skipped: batch.skipped,
            stale,
        }
    }

    async fn after_commit(&self, surface: &SurfaceId, text: &str) {
        let mut sessions = self.inner.sessions.lock().await;
        if let Some(session) = sessions.get_mut(surface) {
            session.live_text = text.to_string();
            session.checked = None;
            session.next_seq();
        }
        let mut renderer = self.inner.renderer.lock().await;
        if let Err(err) = renderer.clear(&self.inner.host, surface) {
            log_debug!("clearing spans after commit on {}: {}", surface, err);
        }
    }

    async fn run_check(&self, surface: &SurfaceId, seq: u64) -> CheckReport {
        let settings = self.settings();

        let text = {
            let mut sessions = self.inner.sessions.lock().await;
            let Some(session) = sessions.get_mut(surface) else {
                return CheckReport::Skipped {
                    reason: SkipReason::SurfaceGone,
                };
            };
            if session.lost {
                return CheckReport::Skipped {
                    reason: SkipReason::SurfaceGone,
                };
            }
            if session.latest_seq != seq {
                return CheckReport::Superseded;
            }
            // From here on newer input supersedes this check instead of
            // aborting it.
            session.pending = None;
            session.live_text.clone()
        };

        let chars = text_len(&text);
        if chars < settings.min_text_chars {
            return CheckReport::Skipped {
                reason: SkipReason::TooShort,
            };
        }
        if chars > settings.max_text_chars {
            log_info!("skipping check of {} chars on {} (limit {})", chars, surface, settings.max_text_chars);
            return CheckReport::Skipped {
                reason: SkipReason::TooLong,
            };
        }

        let snapshot = TextSnapshot::capture(surface.clone(), text);
        let client = self.inner.client.read().unwrap().clone();
        let result = client.check(snapshot.content(), &settings.language).await;

        let mut sessions = self.inner.sessions.lock().await;
        let Some(session) = sessions.get_mut(surface) else {
            return CheckReport::Skipped {
                reason: SkipReason::SurfaceGone,
            };
        };
        if session.latest_seq != seq {
            log_debug!(
                "dropping response for {} seq {} (latest {})",
                surface,
                seq,
                session.latest_seq
            );
            return CheckReport::Superseded;
        }

        let mut renderer = self.inner.renderer.lock().await;
        let response = match result {
            Ok(response) => {
                self.inner.outage_notified.store(false, Ordering::Relaxed);
                response
            }
            Err(err) => {
                session.checked = None;
                if let Err(host_err) = renderer.clear(&self.inner.host, surface) {
                    log_debug!("clearing spans for {}: {}", surface, host_err);
                }
                return self.report_service_error(err);
            }
        };

        let normalized = normalize(&response, &snapshot);
        let mut fresh = Vec::with_capacity(normalized.findings.len());
        let mut stale = 0;
        for finding in normalized.findings {
            match resolve(&finding, &snapshot, &session.live_text) {
                Resolution::Resolved(_) => fresh.push(finding),
                Resolution::Stale => stale += 1,
            }
        }

        let rendered = renderer.render(&self.inner.host, &snapshot, &fresh);
        let findings = fresh.len();
        match rendered {
            Ok(_) => {
                session.checked = Some(CheckedText {
                    snapshot,
                    findings: fresh,
                });
            }
            Err(HostError::SurfaceLost(_)) => {
                sessions.remove(surface);
                if let Err(err) = renderer.release(&self.inner.host, surface) {
                    log_debug!("dismissing picker of lost {}: {}", surface, err);
                }
                return CheckReport::Skipped {
                    reason: SkipReason::SurfaceGone,
                };
            }
            Err(err) => {
                log_warn!("could not render spans on {}: {}", surface, err);
                session.checked = None;
                return CheckReport::NotRendered { findings };
            }
        }

        log_debug!(
            "check for {} seq {}: {} findings, {} stale, {} discarded, language={:?}",
            surface,
            seq,
            findings,
            stale,
            normalized.discarded,
            response.detected_language()
        );

        CheckReport::Annotated {
            findings,
            stale,
            discarded: normalized.discarded,
        }
    }

    fn report_service_error(&self, err: ServiceError) -> CheckReport {
        if err.is_outage() {
            if !self.inner.outage_notified.swap(true, Ordering::Relaxed) {
                log_warn!("grammar service unavailable: {}", err);
                if let Err(host_err) = self.inner.host.notify(Notice::ServiceUnavailable) {
                    log_debug!("could not show outage notice: {}", host_err);
                }
            }
            return CheckReport::Failed { kind: err.kind() };
        }

        log_warn!("discarding grammar response: {}", err);
        CheckReport::Discarded
    }
}

impl ApplyAllReport {
    fn failed(reason: &str) -> Self {
        Self {
            result: failed(reason),
            applied: 0,
            skipped: 0,
            stale: 0,
        }
    }
}

fn failed(reason: &str) -> ApplyResult {
    ApplyResult::Failed {
        reason: reason.to_string(),
    }
}

fn text_len(text: &str) -> usize {
    text.trim().chars().count()
}

/// The snapshot to splice into. When the user kept typing after the checked
/// region, the live text carries those edits and still agrees with the
/// snapshot up to every resolved finding.
fn live_basis(snapshot: &TextSnapshot, live: &str) -> TextSnapshot {
    if snapshot.content() == live {
        snapshot.clone()
    } else {
        TextSnapshot::capture(snapshot.surface().clone(), live)
    }
}
