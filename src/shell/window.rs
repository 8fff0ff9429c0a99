use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use tauri::{
    webview::PageLoadEvent, AppHandle, Manager, Url, WebviewUrl, WebviewWindow,
    WebviewWindowBuilder, WindowEvent,
};
use tauri_plugin_opener::OpenerExt;

use crate::{grammar::HOST_SCRIPT, settings::ShellSettings};

use super::tray;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const MAIN_WINDOW: &str = "main";

/// Builds the chat window. It stays hidden until the first page load
/// finishes so the user never sees a blank frame.
pub fn create_main_window(app: &AppHandle, settings: &ShellSettings) -> Result<WebviewWindow> {
    let home: Url = settings
        .url
        .parse()
        .with_context(|| format!("invalid chat url {}", settings.url))?;

    let nav_home = home.clone();
    let nav_app = app.clone();
    let shown = Arc::new(AtomicBool::new(false));

    let window = WebviewWindowBuilder::new(app, MAIN_WINDOW, WebviewUrl::External(home))
        .title("Flock")
        .inner_size(1200.0, 800.0)
        .visible(false)
        .user_agent(&settings.user_agent)
        .initialization_script(HOST_SCRIPT)
        .on_navigation(move |target| {
            if is_internal_navigation(target, &nav_home) {
                return true;
            }
            open_external(&nav_app, target.as_str());
            false
        })
        .on_page_load(move |window, payload| {
            if payload.event() != PageLoadEvent::Finished {
                return;
            }
            if !shown.swap(true, Ordering::SeqCst) {
                show_main_window(window.app_handle());
            }
        })
        .build()
        .context("failed to create main window")?;

    if settings.close_to_tray {
        let window_clone = window.clone();
        window.on_window_event(move |event| {
            if let WindowEvent::CloseRequested { api, .. } = event {
                api.prevent_close();
                hide_main_window(window_clone.app_handle());
            }
        });
    }

    Ok(window)
}

/// Same site (any subdomain of the chat host's parent domain) or a
/// non-network scheme the page uses internally.
pub fn is_internal_navigation(target: &Url, home: &Url) -> bool {
    if !matches!(target.scheme(), "http" | "https") {
        return true;
    }
    let (Some(host), Some(home_host)) = (target.host_str(), home.host_str()) else {
        return false;
    };
    let site = parent_domain(home_host);
    host == site || host.ends_with(&format!(".{site}"))
}

/// `web.flock.com` -> `flock.com`
fn parent_domain(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.');
    match (dots.next(), dots.next()) {
        (Some(_), Some((idx, _))) => &host[idx + 1..],
        _ => host,
    }
}

pub fn open_external(app: &AppHandle, url: &str) {
    log_info!("opening external link {}", url);
    if let Err(err) = app.opener().open_url(url, None::<&str>) {
        log_warn!("failed to open {}: {}", url, err);
    }
}

pub fn show_main_window(app: &AppHandle) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        let _ = window.unminimize();
        let _ = window.show();
        let _ = window.set_focus();
        tray::sync_toggle_label(app, true);
    }
}

pub fn hide_main_window(app: &AppHandle) {
    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        if let Err(err) = window.hide() {
            log_debug!("hiding main window: {}", err);
        }
        tray::sync_toggle_label(app, false);
    }
}

pub fn toggle_main_window(app: &AppHandle) {
    let visible = app
        .get_webview_window(MAIN_WINDOW)
        .and_then(|window| window.is_visible().ok())
        .unwrap_or(false);
    if visible {
        hide_main_window(app);
    } else {
        show_main_window(app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    #[test]
    fn same_site_links_stay_in_app() {
        let home = url("https://web.flock.com");
        assert!(is_internal_navigation(&url("https://web.flock.com/#/chat"), &home));
        assert!(is_internal_navigation(&url("https://files.flock.com/a.png"), &home));
        assert!(is_internal_navigation(&url("https://flock.com/login"), &home));
        assert!(is_internal_navigation(&url("about:blank"), &home));
    }

    #[test]
    fn foreign_links_go_to_browser() {
        let home = url("https://web.flock.com");
        assert!(!is_internal_navigation(&url("https://example.com"), &home));
        assert!(!is_internal_navigation(&url("https://notflock.com"), &home));
        assert!(!is_internal_navigation(&url("https://flock.com.evil.io"), &home));
    }

    #[test]
    fn parent_domain_of_short_hosts() {
        assert_eq!(parent_domain("web.flock.com"), "flock.com");
        assert_eq!(parent_domain("flock.com"), "flock.com");
        assert_eq!(parent_domain("localhost"), "localhost");
    }
}
