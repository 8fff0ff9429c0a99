use std::time::Duration;

use tauri::State;

use crate::{
    settings::{GrammarSettings, SettingsStore},
    AppState,
};

use super::{
    applier::ApplyResult,
    controller::{ApplyAllReport, CheckReport, GrammarController, InputOutcome},
    host::SurfaceHost,
    model::{PickerPosition, SurfaceId},
    tauri_host::CommitStatus,
};

#[tauri::command]
pub async fn grammar_input(
    state: State<'_, AppState>,
    surface_id: SurfaceId,
    text: String,
) -> Result<InputOutcome, String> {
    Ok(state.grammar.on_user_input(surface_id, text).await)
}

#[tauri::command]
pub fn grammar_focus(state: State<'_, AppState>, surface_id: SurfaceId) {
    state.grammar.on_focus(surface_id);
}

#[tauri::command]
pub async fn grammar_surface_lost(
    state: State<'_, AppState>,
    surface_id: SurfaceId,
) -> Result<(), String> {
    state.grammar.on_surface_lost(&surface_id).await;
    Ok(())
}

/// Without a `surface_id` the focused surface is checked.
#[tauri::command]
pub async fn grammar_check(
    state: State<'_, AppState>,
    surface_id: Option<SurfaceId>,
    text: Option<String>,
) -> Result<CheckReport, String> {
    let report = match (surface_id, text) {
        (Some(surface_id), Some(text)) => state.grammar.on_check_requested(surface_id, text).await,
        (Some(surface_id), None) => {
            state.grammar.on_focus(surface_id);
            state.grammar.on_check_active(None).await
        }
        (None, text) => state.grammar.on_check_active(text).await,
    };
    Ok(report)
}

#[tauri::command]
pub async fn grammar_show_picker(
    state: State<'_, AppState>,
    surface_id: SurfaceId,
    finding_index: usize,
    x: f64,
    y: f64,
) -> Result<bool, String> {
    Ok(state
        .grammar
        .on_context_action(&surface_id, finding_index, PickerPosition { x, y })
        .await)
}

#[tauri::command]
pub async fn grammar_dismiss_picker(state: State<'_, AppState>) -> Result<(), String> {
    state.grammar.on_dismiss_picker().await;
    Ok(())
}

#[tauri::command]
pub async fn grammar_apply(
    state: State<'_, AppState>,
    surface_id: SurfaceId,
    finding_index: usize,
    replacement_index: usize,
    live_text: Option<String>,
) -> Result<ApplyResult, String> {
    Ok(state
        .grammar
        .on_apply_requested(&surface_id, finding_index, replacement_index, live_text)
        .await)
}

#[tauri::command]
pub async fn grammar_apply_all(
    state: State<'_, AppState>,
    surface_id: SurfaceId,
    live_text: Option<String>,
) -> Result<ApplyAllReport, String> {
    Ok(state
        .grammar
        .on_apply_all_requested(&surface_id, live_text)
        .await)
}

#[tauri::command]
pub fn grammar_commit_ack(
    state: State<'_, AppState>,
    request_id: u64,
    status: CommitStatus,
) -> bool {
    state.grammar.host().acknowledge(request_id, status)
}

#[tauri::command]
pub fn get_grammar_settings(state: State<'_, AppState>) -> GrammarSettings {
    state.settings.grammar()
}

#[tauri::command]
pub async fn set_grammar_settings(
    state: State<'_, AppState>,
    settings: GrammarSettings,
) -> Result<(), String> {
    let ack_timeout = Duration::from_millis(settings.commit_ack_timeout_ms);
    let newly_enabled = update_grammar_settings(&state.grammar, &state.settings, settings.clone())
        .await
        .map_err(|e| e.to_string())?;
    state.grammar.host().set_ack_timeout(ack_timeout);

    if newly_enabled {
        crate::spawn_sidecar(state.sidecar.clone(), state.settings.sidecar(), &settings)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Applies settings to the running checker and only then saves them, so a
/// rejected update leaves both untouched. Returns whether checking was just
/// switched on.
pub(crate) async fn update_grammar_settings<H: SurfaceHost>(
    grammar: &GrammarController<H>,
    store: &SettingsStore,
    settings: GrammarSettings,
) -> anyhow::Result<bool> {
    let was_enabled = grammar.settings().enabled;
    let enabled = settings.enabled;
    grammar.reconfigure(settings.clone()).await?;
    store.update_grammar(settings)?;
    Ok(enabled && !was_enabled)
}
