//! Tray icon with a show/hide toggle and quit, plus the unread tooltip.

use tauri::{
    menu::{Menu, MenuItem, PredefinedMenuItem},
    tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent},
    AppHandle, Manager, Wry,
};

use crate::AppState;

use super::window::toggle_main_window;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const TRAY_ID: &str = "main-tray";

pub mod menu_ids {
    pub const TOGGLE: &str = "toggle";
    pub const CHECK_GRAMMAR: &str = "check-grammar";
    pub const QUIT: &str = "quit";
}

/// Handle to the toggle item so its label can follow window visibility.
pub struct TrayState {
    toggle: MenuItem<Wry>,
}

pub fn create_tray(app: &AppHandle) -> tauri::Result<()> {
    // the window starts hidden until the page has loaded
    let toggle = MenuItem::with_id(app, menu_ids::TOGGLE, toggle_label(false), true, None::<&str>)?;
    let check = MenuItem::with_id(app, menu_ids::CHECK_GRAMMAR, "Check Grammar", true, None::<&str>)?;
    let separator = PredefinedMenuItem::separator(app)?;
    let quit = MenuItem::with_id(app, menu_ids::QUIT, "Quit", true, None::<&str>)?;
    let menu = Menu::with_items(app, &[&toggle, &check, &separator, &quit])?;

    let mut builder = TrayIconBuilder::with_id(TRAY_ID)
        .menu(&menu)
        .show_menu_on_left_click(false)
        .tooltip(tooltip(0))
        .on_tray_icon_event(|tray, event| handle_tray_icon_event(tray.app_handle(), event))
        .on_menu_event(|app, event| handle_menu_event(app, event.id.as_ref()));

    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone());
    }

    builder.build(app)?;
    app.manage(TrayState { toggle });
    Ok(())
}

pub fn toggle_label(window_visible: bool) -> &'static str {
    if window_visible {
        "Hide"
    } else {
        "Show"
    }
}

pub fn tooltip(unread: u32) -> String {
    match unread {
        0 => "Flock".to_string(),
        n => format!("Flock ({n} unread)"),
    }
}

pub fn sync_toggle_label(app: &AppHandle, window_visible: bool) {
    if let Some(state) = app.try_state::<TrayState>() {
        if let Err(err) = state.toggle.set_text(toggle_label(window_visible)) {
            log_debug!("updating tray label: {}", err);
        }
    }
}

pub fn set_unread(app: &AppHandle, unread: u32) {
    if let Some(tray) = app.tray_by_id(TRAY_ID) {
        if let Err(err) = tray.set_tooltip(Some(tooltip(unread))) {
            log_debug!("updating tray tooltip: {}", err);
        }
    }
}

fn handle_tray_icon_event(app: &AppHandle, event: TrayIconEvent) {
    if let TrayIconEvent::Click {
        button: MouseButton::Left,
        button_state: MouseButtonState::Up,
        ..
    } = event
    {
        toggle_main_window(app);
    }
}

fn handle_menu_event(app: &AppHandle, menu_id: &str) {
    match menu_id {
        menu_ids::TOGGLE => toggle_main_window(app),
        menu_ids::CHECK_GRAMMAR => check_focused_surface(app),
        menu_ids::QUIT => {
            log_info!("quit requested from tray");
            app.exit(0);
        }
        _ => {}
    }
}

/// Runs an immediate check on whichever field last had focus in the page.
fn check_focused_surface(app: &AppHandle) {
    let Some(state) = app.try_state::<AppState>() else {
        return;
    };
    let grammar = state.grammar.clone();
    tauri::async_runtime::spawn(async move {
        let report = grammar.on_check_active(None).await;
        log_info!("tray grammar check: {:?}", report);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_ids_are_unique() {
        let ids = [menu_ids::TOGGLE, menu_ids::CHECK_GRAMMAR, menu_ids::QUIT];
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn toggle_label_follows_visibility() {
        assert_eq!(toggle_label(true), "Hide");
        assert_eq!(toggle_label(false), "Show");
    }

    #[test]
    fn tooltip_mentions_unread_count() {
        assert_eq!(tooltip(0), "Flock");
        assert_eq!(tooltip(4), "Flock (4 unread)");
    }
}
