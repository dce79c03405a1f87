//! Live reasoning backends.
//!
//! The [`ReasoningBackend`] trait decouples the reasoning adapter from the
//! concrete model provider. Two backends exist: an external reasoning CLI fed
//! the prompt on stdin, and the Gemini `generateContent` HTTP API. Tests use
//! scripted backends that return predetermined responses.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::config::{BackendConfig, BackendKind};
use crate::io::process::{ChildExit, run_bounded};

const RESPONSE_LIMIT_BYTES: usize = 1024 * 1024;
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Quota or rate limit hit; worth retrying after a delay.
    #[error("rate limited: {0}")]
    RateLimited(String),
    /// Transient outage (timeout, connection failure, 5xx); worth retrying.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Anything else; retrying will not help.
    #[error("backend error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackendError::RateLimited(_) | BackendError::Unavailable(_)
        )
    }
}

pub trait ReasoningBackend {
    /// Short identifier used in logs and reports.
    fn name(&self) -> &str;

    /// Send one prompt and return the raw response text.
    fn complete(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Build the configured live backend, or `None` for `kind = "none"`.
pub fn backend_from_config(cfg: &BackendConfig) -> Result<Option<Box<dyn ReasoningBackend>>> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    match cfg.kind {
        BackendKind::None => Ok(None),
        BackendKind::Command => Ok(Some(Box::new(CommandBackend::new(
            cfg.command.clone(),
            timeout,
        )?))),
        BackendKind::Gemini => Ok(Some(Box::new(GeminiBackend::from_env(
            &cfg.model,
            &cfg.api_key_env,
            timeout,
        )?))),
    }
}

fn looks_rate_limited(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    [
        "429",
        "rate limit",
        "rate_limit",
        "too many requests",
        "quota",
        "resource_exhausted",
    ]
    .iter()
    .any(|needle| lowered.contains(needle))
}

/// Backend that spawns an external reasoning CLI.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandBackend {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Result<Self> {
        if argv.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(anyhow!("backend command must be a non-empty array"));
        }
        Ok(Self { argv, timeout })
    }
}

impl ReasoningBackend for CommandBackend {
    fn name(&self) -> &str {
        &self.argv[0]
    }

    #[instrument(skip_all, fields(program = %self.argv[0], timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        info!("invoking reasoning command");
        let mut cmd = Command::new(&self.argv[0]);
        cmd.args(&self.argv[1..]);

        let output = run_bounded(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            RESPONSE_LIMIT_BYTES,
        )
        .map_err(|err| BackendError::Unavailable(err.to_string()))?;

        let code = match output.exit {
            ChildExit::Code(code) => code,
            ChildExit::TimedOut => {
                warn!("reasoning command timed out");
                return Err(BackendError::Unavailable(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };
        let stdout = output.stdout;
        if code != 0 {
            let stderr = output.stderr;
            let detail = format!("exit status {code}: {}", stderr.trim());
            warn!(exit_code = code, "reasoning command failed");
            if looks_rate_limited(&stderr) || looks_rate_limited(&stdout) {
                return Err(BackendError::RateLimited(detail));
            }
            return Err(BackendError::Other(detail));
        }

        debug!(bytes = stdout.len(), "reasoning command completed");
        Ok(stdout)
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateContentRequest {
    fn new(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                max_output_tokens: 2048,
            },
        }
    }
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, BackendError> {
        if let Some(err) = self.error {
            let rate_limited = err.status.as_deref() == Some("RESOURCE_EXHAUSTED");
            let detail = format!("{}: {}", err.status.unwrap_or_default(), err.message);
            return Err(if rate_limited {
                BackendError::RateLimited(detail)
            } else {
                BackendError::Other(detail)
            });
        }
        let text = self
            .candidates
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(BackendError::Other("empty response from gemini".to_string()));
        }
        Ok(text)
    }
}

fn classify_status(status: u16, body: &str) -> BackendError {
    let detail = format!("gemini api error ({status}): {}", body.trim());
    match status {
        429 => BackendError::RateLimited(detail),
        500..=599 if looks_rate_limited(body) => BackendError::RateLimited(detail),
        500..=599 => BackendError::Unavailable(detail),
        _ => BackendError::Other(detail),
    }
}

/// Backend calling the Gemini `generateContent` API.
pub struct GeminiBackend {
    client: reqwest::blocking::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl GeminiBackend {
    /// Read the API key from `api_key_env`; the key is never stored in config.
    pub fn from_env(model: &str, api_key_env: &str, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .with_context(|| format!("read gemini api key from ${api_key_env}"))?;
        if api_key.trim().is_empty() {
            return Err(anyhow!("${api_key_env} is empty"));
        }
        Self::new(model, api_key, GEMINI_BASE_URL, timeout)
    }

    pub fn new(
        model: &str,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            model: model.trim_start_matches("models/").to_string(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

impl ReasoningBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&GenerateContentRequest::new(prompt))
            .send()
            .map_err(|err| {
                // reqwest errors embed the URL, which carries the key.
                let err = err.without_url();
                if err.is_timeout() || err.is_connect() {
                    BackendError::Unavailable(err.to_string())
                } else {
                    BackendError::Other(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), "gemini request failed");
            return Err(classify_status(status.as_u16(), &body));
        }
        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|err| BackendError::Other(format!("decode gemini response: {}", err.without_url())))?;
        let text = parsed.into_text()?;
        debug!(chars = text.len(), "gemini response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rate_limit_classification() {
        assert!(looks_rate_limited("Error: 429 Too Many Requests"));
        assert!(looks_rate_limited("You exceeded your current QUOTA"));
        assert!(!looks_rate_limited("permission denied"));

        assert!(matches!(classify_status(429, "slow down"), BackendError::RateLimited(_)));
        assert!(matches!(classify_status(503, "overloaded"), BackendError::Unavailable(_)));
        assert!(matches!(classify_status(400, "bad request"), BackendError::Other(_)));
        assert!(BackendError::Unavailable(String::new()).is_retryable());
        assert!(!BackendError::Other(String::new()).is_retryable());
    }

    #[test]
    fn gemini_request_uses_generation_config_wire_names() {
        let value = serde_json::to_value(GenerateContentRequest::new("hi")).expect("serialize");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn gemini_response_text_and_errors() {
        let ok: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"tool\":"}, {"text": "\"ss\"}"}]}}]
        }))
        .expect("decode");
        assert_eq!(ok.into_text().expect("text"), "{\"tool\":\n\"ss\"}");

        let quota: GenerateContentResponse = serde_json::from_value(json!({
            "error": {"code": 429, "message": "quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        }))
        .expect("decode");
        assert!(matches!(quota.into_text(), Err(BackendError::RateLimited(_))));

        let empty: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).expect("decode");
        assert!(matches!(empty.into_text(), Err(BackendError::Other(_))));
    }

    #[test]
    fn command_backend_requires_a_program() {
        assert!(CommandBackend::new(Vec::new(), Duration::from_secs(1)).is_err());
        assert!(CommandBackend::new(vec![" ".to_string()], Duration::from_secs(1)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn command_backend_pipes_prompt_and_classifies_failures() {
        let sh = |script: &str| {
            CommandBackend::new(
                vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                Duration::from_secs(5),
            )
            .expect("backend")
        };

        let echo = sh("cat");
        assert_eq!(echo.complete("{\"tool\": \"ss\"}").expect("ok"), "{\"tool\": \"ss\"}");

        let limited = sh("cat >/dev/null; echo '429 rate limit exceeded' >&2; exit 1");
        assert!(matches!(limited.complete("x"), Err(BackendError::RateLimited(_))));

        let broken = sh("cat >/dev/null; echo 'invalid api key' >&2; exit 2");
        assert!(matches!(broken.complete("x"), Err(BackendError::Other(_))));
    }
}
