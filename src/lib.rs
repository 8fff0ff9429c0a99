pub mod grammar;
mod settings;
mod shell;
mod sidecar;
mod utils;

use std::{sync::Arc, time::Duration};

use grammar::{
    commands::{
        get_grammar_settings, grammar_apply, grammar_apply_all, grammar_check, grammar_commit_ack,
        grammar_dismiss_picker, grammar_focus, grammar_input, grammar_show_picker,
        grammar_surface_lost, set_grammar_settings,
    },
    service::GrammarClient,
    GrammarController, TauriSurfaceHost,
};
use log::warn;
use settings::{GrammarSettings, SettingsStore, SidecarSettings};
use shell::unread::{shell_report_unread, UnreadMonitor};
use sidecar::Sidecar;
use tauri::{Manager, RunEvent};

pub struct AppState {
    pub(crate) grammar: GrammarController<TauriSurfaceHost>,
    pub(crate) settings: SettingsStore,
    pub(crate) unread: UnreadMonitor,
    sidecar: Arc<Sidecar>,
}

/// Starts (or reuses) the grammar server in the background. The server can
/// take a while to boot; callers don't wait for it.
fn spawn_sidecar(
    sidecar: Arc<Sidecar>,
    sidecar_settings: SidecarSettings,
    grammar_settings: &GrammarSettings,
) -> anyhow::Result<()> {
    let client = GrammarClient::from_settings(grammar_settings)?;
    tauri::async_runtime::spawn(async move {
        match sidecar.start(&sidecar_settings, &client).await {
            Ok(status) => log::info!("grammar sidecar status: {:?}", status),
            Err(err) => warn!("Grammar sidecar failed to start: {err:?}"),
        }
    });
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let level = if settings::debug_mode() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    log::info!("Flock starting up...");

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
                let grammar_settings = settings_store.grammar();
                let shell_settings = settings_store.shell();

                let host = TauriSurfaceHost::new(
                    app.handle().clone(),
                    Duration::from_millis(grammar_settings.commit_ack_timeout_ms),
                );
                let grammar = GrammarController::new(host, grammar_settings.clone())?;

                let sidecar = Arc::new(Sidecar::new());
                if grammar_settings.enabled {
                    spawn_sidecar(sidecar.clone(), settings_store.sidecar(), &grammar_settings)?;
                }

                let unread = UnreadMonitor::spawn(
                    app.handle().clone(),
                    Duration::from_millis(shell_settings.unread_poll_ms),
                );

                app.manage(AppState {
                    grammar,
                    settings: settings_store,
                    unread,
                    sidecar,
                });

                // Commands need the state above before the page loads.
                shell::window::create_main_window(app.handle(), &shell_settings)?;
                if let Err(err) = shell::tray::create_tray(app.handle()) {
                    warn!("Failed to create tray icon: {err}");
                }

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .invoke_handler(tauri::generate_handler![
            grammar_input,
            grammar_focus,
            grammar_surface_lost,
            grammar_check,
            grammar_show_picker,
            grammar_dismiss_picker,
            grammar_apply,
            grammar_apply_all,
            grammar_commit_ack,
            get_grammar_settings,
            set_grammar_settings,
            shell_report_unread,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = app.try_state::<AppState>() {
                state.unread.stop();
                tauri::async_runtime::block_on(state.sidecar.stop());
            }
        }
    });
}
