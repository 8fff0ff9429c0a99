use std::{
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use tauri::{AppHandle, Manager, State};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::AppState;

use super::{tray, window::MAIN_WINDOW};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Evaluated in the chat page on every tick. Reports the title and the
/// number of badge indicators back through `shell_report_unread`.
const UNREAD_PROBE: &str = r#"(function () {
  var core = window.__TAURI__ && window.__TAURI__.core;
  if (!core) return;
  var badges = document.querySelectorAll('.unread-dot, .unread-indicator, .badge-count');
  var total = 0;
  badges.forEach(function (el) {
    var n = parseInt((el.textContent || '').trim(), 10);
    total += isNaN(n) ? 1 : n;
  });
  core.invoke('shell_report_unread', { title: document.title || '', badgeCount: total }).catch(function () {});
})();"#;

/// Periodically probes the page for unread messages.
pub struct UnreadMonitor {
    cancel: CancellationToken,
    last: AtomicU32,
}

impl UnreadMonitor {
    pub fn spawn(app: AppHandle, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tauri::async_runtime::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => probe(&app),
                }
            }
            log_debug!("unread monitor stopped");
        });

        Self {
            cancel,
            last: AtomicU32::new(0),
        }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stores the new count and reports whether it differs from the last one.
    fn record(&self, count: u32) -> bool {
        self.last.swap(count, Ordering::SeqCst) != count
    }
}

fn probe(app: &AppHandle) {
    let Some(window) = app.get_webview_window(MAIN_WINDOW) else {
        return;
    };
    if let Err(err) = window.eval(UNREAD_PROBE) {
        log_debug!("unread probe failed: {}", err);
    }
}

/// Reads the `(N)` counter chat pages put in the document title.
pub fn unread_from_title(title: &str) -> Option<u32> {
    let mut rest = title;
    while let Some(open) = rest.find('(') {
        let after = &rest[open + 1..];
        if let Some(close) = after.find(')') {
            let inner = &after[..close];
            if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = inner.parse() {
                    return Some(n);
                }
            }
        }
        rest = after;
    }
    None
}

/// The title counter wins over badge indicators when both are present.
pub fn unread_count(title: &str, badge_count: u32) -> u32 {
    unread_from_title(title).unwrap_or(badge_count)
}

#[tauri::command]
pub fn shell_report_unread(
    app: AppHandle,
    state: State<'_, AppState>,
    title: String,
    badge_count: u32,
) {
    let count = unread_count(&title, badge_count);
    if state.unread.record(count) {
        log_info!("unread count now {}", count);
        tray::set_unread(&app, count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_counter_is_parsed() {
        assert_eq!(unread_from_title("(3) Flock"), Some(3));
        assert_eq!(unread_from_title("Flock (12)"), Some(12));
        assert_eq!(unread_from_title("Flock"), None);
    }

    #[test]
    fn non_numeric_parentheses_are_skipped() {
        assert_eq!(unread_from_title("Team (design) (5)"), Some(5));
        assert_eq!(unread_from_title("Flock ()"), None);
        assert_eq!(unread_from_title("Flock (beta"), None);
    }

    #[test]
    fn badges_used_when_title_has_no_counter() {
        assert_eq!(unread_count("Flock", 2), 2);
        assert_eq!(unread_count("(7) Flock", 2), 7);
        assert_eq!(unread_count("Flock", 0), 0);
    }
}
