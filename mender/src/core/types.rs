//! Shared deterministic types for the mission core.
//!
//! These types define stable contracts between the control loop, the reasoning
//! adapter, the safety gate and the recorder. They must not depend on external
//! state or I/O.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument mapping attached to an action request.
pub type Args = Map<String, Value>;

/// History tool name used for non-actionable reasoning steps.
pub const THOUGHT_TOOL: &str = "thought";
/// Tool name that terminates a mission with a summary.
pub const COMPLETE_TOOL: &str = "mission_complete";
/// History tool name used when a whole cycle failed before producing intents.
pub const CYCLE_ERROR_TOOL: &str = "cycle_error";

/// Coarse severity a backend may attach to a reasoning step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" | "mid" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(anyhow!("unknown risk tier '{other}'")),
        }
    }
}

/// Whether the mission acts on a real target or on scripted fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissionMode {
    Live,
    Simulation,
}

impl MissionMode {
    pub fn from_flag(simulation: bool) -> Self {
        if simulation {
            MissionMode::Simulation
        } else {
            MissionMode::Live
        }
    }

    pub fn is_simulation(self) -> bool {
        self == MissionMode::Simulation
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MissionMode::Live => "live",
            MissionMode::Simulation => "simulation",
        }
    }
}

/// Terminal status of a mission. Serialized verbatim into audit artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MissionStatus {
    /// The backend declared the objective met.
    Resolved,
    /// Cycle budget or a failure tolerance was exhausted.
    Halted,
    /// A human operator vetoed a high-risk action.
    Aborted,
}

impl MissionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MissionStatus::Resolved => "Resolved",
            MissionStatus::Halted => "Halted",
            MissionStatus::Aborted => "Aborted",
        }
    }
}

/// One tool invocation requested by the reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Args,
}

impl ActionRequest {
    pub fn new(tool: impl Into<String>, args: Args) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }

    /// Build a request from a JSON object literal (non-objects yield empty args).
    pub fn from_value(tool: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Args::new(),
        };
        Self::new(tool, args)
    }
}

/// Typed output of the action parser and the simulation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    /// Free-text reasoning, optionally annotated with a risk tier. Never dispatched.
    Thought {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        risk: Option<RiskTier>,
    },
    /// A tool invocation to vet and dispatch.
    Action(ActionRequest),
    /// The objective is met; terminates the mission as resolved.
    Completion { summary: String },
}

impl Intent {
    pub fn thought(text: impl Into<String>) -> Self {
        Intent::Thought {
            text: text.into(),
            risk: None,
        }
    }

    pub fn action(tool: impl Into<String>, args: Value) -> Self {
        Intent::Action(ActionRequest::from_value(tool, args))
    }

    pub fn completion(summary: impl Into<String>) -> Self {
        Intent::Completion {
            summary: summary.into(),
        }
    }
}

/// Append-only record of one step, as stored in history and audit artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-indexed position in the mission history.
    pub step: u32,
    /// Cycle that produced the step.
    #[serde(default)]
    pub cycle: u32,
    pub tool: String,
    #[serde(default)]
    pub args: Args,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskTier>,
}
