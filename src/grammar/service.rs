use std::time::Duration;

use anyhow::Context;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::GrammarSettings;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("grammar service unreachable: {0}")]
    Unreachable(String),
    #[error("grammar service returned an unusable response: {0}")]
    BadResponse(String),
    #[error("grammar service timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            ServiceError::Unreachable(_) => ServiceErrorKind::Unreachable,
            ServiceError::BadResponse(_) => ServiceErrorKind::BadResponse,
            ServiceError::Timeout(_) => ServiceErrorKind::Timeout,
        }
    }

    /// The sidecar is down or hung, as opposed to answering with garbage.
    pub fn is_outage(&self) -> bool {
        matches!(
            self,
            ServiceError::Unreachable(_) | ServiceError::Timeout(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceErrorKind {
    Unreachable,
    BadResponse,
    Timeout,
}

/// Body of a LanguageTool `/v2/check` response. Only the fields the
/// annotation pipeline reads are modelled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(default)]
    pub matches: Vec<RawMatch>,
    #[serde(default)]
    pub language: Option<ResponseLanguage>,
}

impl CheckResponse {
    pub fn detected_language(&self) -> Option<&str> {
        let language = self.language.as_ref()?;
        language
            .detected_language
            .as_ref()
            .map(|detected| detected.code.as_str())
            .or(Some(language.code.as_str()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMatch {
    /// Signed so that a misbehaving server's negative offsets survive
    /// decoding and can be counted as discards.
    pub offset: i64,
    pub length: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub short_message: Option<String>,
    #[serde(default)]
    pub replacements: Vec<RawReplacement>,
    #[serde(default)]
    pub rule: Option<RawRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawReplacement {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRule {
    pub id: String,
    pub category: RawCategory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCategory {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLanguage {
    pub code: String,
    #[serde(default)]
    pub detected_language: Option<DetectedLanguage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectedLanguage {
    pub code: String,
}

/// HTTP client for a LanguageTool-compatible server.
#[derive(Clone)]
pub struct GrammarClient {
    http: Client,
    endpoint: String,
    timeout: Duration,
}

impl GrammarClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint).with_context(|| format!("invalid grammar endpoint {endpoint:?}"))?;
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    pub fn from_settings(settings: &GrammarSettings) -> anyhow::Result<Self> {
        Self::new(
            settings.endpoint.clone(),
            Duration::from_millis(settings.request_timeout_ms),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends one check request. Never retries; the caller decides whether a
    /// later input should trigger another attempt.
    pub async fn check(&self, text: &str, language: &str) -> Result<CheckResponse, ServiceError> {
        log_debug!(
            "grammar check: {} chars, language={}, endpoint={}",
            text.chars().count(),
            language,
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .form(&[("text", text), ("language", language)])
            .send()
            .await
            .map_err(|err| self.map_transport_error(err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| self.map_transport_error(err))?;

        if !status.is_success() {
            log_warn!("grammar service answered {}: {}", status, truncate(&body, 200));
            return Err(ServiceError::BadResponse(format!("HTTP {status}")));
        }

        serde_json::from_str(&body)
            .map_err(|err| ServiceError::BadResponse(format!("malformed body: {err}")))
    }

    /// Probes the server's language list, which LanguageTool answers cheaply
    /// once it has finished starting.
    pub async fn ping(&self) -> bool {
        let Some(url) = languages_url(&self.endpoint) else {
            return false;
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(_) => false,
        }
    }

    fn map_transport_error(&self, err: reqwest::Error) -> ServiceError {
        if err.is_timeout() {
            ServiceError::Timeout(self.timeout)
        } else if err.is_decode() {
            ServiceError::BadResponse(err.to_string())
        } else {
            ServiceError::Unreachable(err.to_string())
        }
    }
}

/// `http://host:port/v2/check` -> `http://host:port/v2/languages`
fn languages_url(endpoint: &str) -> Option<String> {
    let (base, _) = endpoint.trim_end_matches('/').rsplit_once('/')?;
    Some(format!("{base}/languages"))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn languages_url_replaces_last_segment() {
        assert_eq!(
            languages_url("http://127.0.0.1:8081/v2/check").as_deref(),
            Some("http://127.0.0.1:8081/v2/languages")
        );
        assert_eq!(
            languages_url("http://localhost:8081/v2/check/").as_deref(),
            Some("http://localhost:8081/v2/languages")
        );
    }

    #[test]
    fn decodes_languagetool_match() {
        let body = r#"{
            "software": {"name": "LanguageTool"},
            "language": {"name": "English (US)", "code": "en-US",
                         "detectedLanguage": {"name": "English (US)", "code": "en-US"}},
            "matches": [{
                "message": "Possible spelling mistake found.",
                "shortMessage": "Spelling mistake",
                "replacements": [{"value": "have"}, {"value": "had"}],
                "offset": 2, "length": 3,
                "context": {"text": "I has a apple", "offset": 2, "length": 3},
                "rule": {"id": "MORFOLOGIK_RULE_EN_US", "description": "x",
                         "category": {"id": "TYPOS", "name": "Possible Typo"}}
            }]
        }"#;
        let response: CheckResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.matches.len(), 1);
        let raw = &response.matches[0];
        assert_eq!(raw.offset, 2);
        assert_eq!(raw.replacements[0].value, "have");
        assert_eq!(raw.rule.as_ref().unwrap().category.id, "TYPOS");
        assert_eq!(response.detected_language(), Some("en-US"));
    }

    #[test]
    fn endpoint_must_be_a_url() {
        assert!(GrammarClient::new("not a url", Duration::from_secs(1)).is_err());
        assert!(GrammarClient::new("http://127.0.0.1:8081/v2/check", Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn outage_classification() {
        assert!(ServiceError::Unreachable("refused".into()).is_outage());
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_outage());
        assert!(!ServiceError::BadResponse("x".into()).is_outage());
    }
}
