//! Mission configuration stored in `mender.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::retry::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "mender.toml";

/// Smallest accepted `result_limit_chars`; smaller limits leave no room for
/// the head and tail windows.
const MIN_RESULT_LIMIT: usize = 64;

/// Mission configuration (TOML).
///
/// Edited by operators. Missing fields default to the values below; secrets
/// are never stored here, only the name of the environment variable holding
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MissionConfig {
    /// Transport target: container name for `docker`, host for `ssh`.
    pub target: String,

    /// Run against scripted fixtures instead of a live backend and target.
    pub simulation: bool,

    /// Cycle budget per mission.
    pub max_cycles: u32,

    /// Number of recent steps included in each cycle's context.
    pub history_window: usize,

    /// Consecutive unparseable responses tolerated before halting.
    pub parse_failure_tolerance: u32,

    /// Consecutive failed cycles tolerated before halting.
    pub error_tolerance: u32,

    /// Per-command transport timeout.
    pub command_timeout_secs: u64,

    /// Tool results longer than this many characters are truncated.
    pub result_limit_chars: usize,

    /// Directory holding audits and the knowledge store.
    pub state_dir: PathBuf,

    pub transport: TransportConfig,
    pub backend: BackendConfig,
    pub retry: RetryConfig,
    pub knowledge: KnowledgeConfig,
    pub safety: SafetyConfig,
    pub simulation_script: SimulationScriptConfig,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            target: "sandbox".to_string(),
            simulation: false,
            max_cycles: 10,
            history_window: 5,
            parse_failure_tolerance: 3,
            error_tolerance: 3,
            command_timeout_secs: 10,
            result_limit_chars: 800,
            state_dir: PathBuf::from(".mender"),
            transport: TransportConfig::default(),
            backend: BackendConfig::default(),
            retry: RetryConfig::default(),
            knowledge: KnowledgeConfig::default(),
            safety: SafetyConfig::default(),
            simulation_script: SimulationScriptConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Local,
    #[default]
    Docker,
    Ssh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// No live backend; every decision comes from the simulation table.
    #[default]
    None,
    /// External reasoning CLI: prompt on stdin, response on stdout.
    Command,
    /// Gemini `generateContent` HTTP API.
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Argv for `kind = "command"`.
    pub command: Vec<String>,
    /// Model selector for HTTP backends.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::None,
            command: Vec::new(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub max_lessons: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self { max_lessons: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SafetyConfig {
    /// Patterns denied in addition to the built-in blacklist.
    pub extra_blacklist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SimulationScriptConfig {
    /// TOML pattern table replacing the built-in simulation scenarios.
    pub path: Option<PathBuf>,
}

impl MissionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_cycles == 0 {
            return Err(anyhow!("max_cycles must be > 0"));
        }
        if self.history_window == 0 {
            return Err(anyhow!("history_window must be > 0"));
        }
        if self.parse_failure_tolerance == 0 {
            return Err(anyhow!("parse_failure_tolerance must be > 0"));
        }
        if self.error_tolerance == 0 {
            return Err(anyhow!("error_tolerance must be > 0"));
        }
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.result_limit_chars < MIN_RESULT_LIMIT {
            return Err(anyhow!("result_limit_chars must be >= {MIN_RESULT_LIMIT}"));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(anyhow!("state_dir must not be empty"));
        }
        if self.transport.kind != TransportKind::Local && self.target.trim().is_empty() {
            return Err(anyhow!("target must be set for docker and ssh transports"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(anyhow!("retry.max_delay_ms must be >= retry.base_delay_ms"));
        }
        if self.knowledge.max_lessons == 0 {
            return Err(anyhow!("knowledge.max_lessons must be > 0"));
        }
        match self.backend.kind {
            BackendKind::Command
                if self.backend.command.is_empty() || self.backend.command[0].trim().is_empty() =>
            {
                return Err(anyhow!(
                    "backend.command must be a non-empty array when backend.kind = \"command\""
                ));
            }
            BackendKind::Gemini if self.backend.model.trim().is_empty() => {
                return Err(anyhow!("backend.model must be set when backend.kind = \"gemini\""));
            }
            _ => {}
        }
        if self.backend.kind != BackendKind::None && self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.state_dir.join("audits")
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.state_dir.join("knowledge.json")
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MissionConfig::default()`.
pub fn load_config(path: &Path) -> Result<MissionConfig> {
    if !path.exists() {
        let cfg = MissionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MissionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MissionConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::write_atomic(path, buf.as_bytes())
}
