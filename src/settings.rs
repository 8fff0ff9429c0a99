use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

pub const ENDPOINT_ENV: &str = "FLOCK_GRAMMAR_ENDPOINT";
pub const DEBUG_ENV: &str = "FLOCK_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GrammarSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub language: String,
    pub debounce_ms: u64,
    /// Trimmed inputs shorter than this never reach the server.
    pub min_text_chars: usize,
    pub max_text_chars: usize,
    pub request_timeout_ms: u64,
    pub max_picker_choices: usize,
    pub commit_ack_timeout_ms: u64,
}

impl Default for GrammarSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: "http://127.0.0.1:8081/v2/check".into(),
            language: "auto".into(),
            debounce_ms: 1500,
            min_text_chars: 10,
            max_text_chars: 20_000,
            request_timeout_ms: 5_000,
            max_picker_choices: 5,
            commit_ack_timeout_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SidecarSettings {
    pub autostart: bool,
    pub program: String,
    pub args: Vec<String>,
    pub ready_timeout_ms: u64,
}

impl Default for SidecarSettings {
    fn default() -> Self {
        Self {
            autostart: true,
            program: "java".into(),
            args: vec![
                "-cp".into(),
                "languagetool-server.jar".into(),
                "org.languagetool.server.HTTPServer".into(),
                "--port".into(),
                "8081".into(),
                "--allow-origin".into(),
                "*".into(),
            ],
            ready_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ShellSettings {
    pub url: String,
    pub user_agent: String,
    pub unread_poll_ms: u64,
    pub close_to_tray: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            url: "https://web.flock.com".into(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            unread_poll_ms: 2_000,
            close_to_tray: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    grammar: GrammarSettings,
    sidecar: SidecarSettings,
    shell: ShellSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data: UserSettings = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!("Ignoring unreadable settings at {}: {}", path.display(), err);
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            if !endpoint.trim().is_empty() {
                data.grammar.endpoint = endpoint;
            }
        }

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn grammar(&self) -> GrammarSettings {
        self.data.read().unwrap().grammar.clone()
    }

    pub fn sidecar(&self) -> SidecarSettings {
        self.data.read().unwrap().sidecar.clone()
    }

    pub fn shell(&self) -> ShellSettings {
        self.data.read().unwrap().shell.clone()
    }

    pub fn update_grammar(&self, settings: GrammarSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.grammar = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

pub fn debug_mode() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.grammar().debounce_ms, 1500);
        assert_eq!(store.grammar().min_text_chars, 10);
        assert_eq!(store.shell().unread_poll_ms, 2_000);
        assert!(store.sidecar().autostart);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"grammar": {"language": "en-GB"}}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let grammar = store.grammar();
        assert_eq!(grammar.language, "en-GB");
        assert_eq!(grammar.max_picker_choices, 5);
        assert_eq!(store.shell(), ShellSettings::default());
    }

    #[test]
    fn garbage_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{not json").unwrap();
        let store = SettingsStore::new(path).unwrap();
        assert!(store.grammar().enabled);
    }

    #[test]
    fn update_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut grammar = store.grammar();
        grammar.enabled = false;
        grammar.debounce_ms = 800;
        store.update_grammar(grammar.clone()).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        let reloaded = reopened.grammar();
        assert!(!reloaded.enabled);
        assert_eq!(reloaded.debounce_ms, 800);
    }
}
