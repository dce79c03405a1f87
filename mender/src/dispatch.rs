//! Tool dispatcher: validation, rendering, gated execution and result
//! normalization.
//!
//! Every per-step failure becomes a tagged result string rather than an
//! error, so the reasoning backend can see it and adapt in the next cycle.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use jsonschema::{Validator, validator_for};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::catalog::ToolCatalog;
use crate::core::platform::Platform;
use crate::core::render::render_command;
use crate::core::safety::{SafetyGate, Verdict};
use crate::core::truncate::truncate_result;
use crate::core::types::{ActionRequest, MissionMode};
use crate::io::transport::{Transport, TransportError};

pub const UNKNOWN_TOOL_TAG: &str = "[UNKNOWN TOOL]";
pub const ARGUMENT_ERROR_TAG: &str = "[ARGUMENT ERROR]";
pub const DENIED_TAG: &str = "[DENIED]";
pub const TIMEOUT_TAG: &str = "[TIMEOUT]";
pub const TRANSPORT_ERROR_TAG: &str = "[TRANSPORT ERROR]";

pub const NO_OUTPUT_TEXT: &str = "Command executed successfully (no output).";

/// A validated action rendered to its command string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub tool: String,
    pub command: String,
}

pub struct ToolDispatcher<'a> {
    catalog: &'a ToolCatalog,
    platform: Platform,
    transport: &'a dyn Transport,
    gate: SafetyGate,
    mode: MissionMode,
    timeout: Duration,
    result_limit: usize,
    validators: HashMap<&'static str, Validator>,
}

impl<'a> ToolDispatcher<'a> {
    pub fn new(
        catalog: &'a ToolCatalog,
        platform: Platform,
        transport: &'a dyn Transport,
        gate: SafetyGate,
        mode: MissionMode,
        timeout: Duration,
        result_limit: usize,
    ) -> Result<Self> {
        let mut validators = HashMap::new();
        for tool in catalog.iter() {
            let validator = validator_for(&tool.json_schema())
                .map_err(|err| anyhow!("invalid schema for tool {}: {}", tool.name, err))?;
            validators.insert(tool.name, validator);
        }
        Ok(Self {
            catalog,
            platform,
            transport,
            gate,
            mode,
            timeout,
            result_limit,
            validators,
        })
    }

    /// Look up, validate and render an action. `Err` carries the tagged
    /// result to record instead of executing.
    pub fn prepare(&self, action: &ActionRequest) -> Result<PreparedCommand, String> {
        let Some(descriptor) = self.catalog.get(&action.tool) else {
            return Err(format!(
                "{UNKNOWN_TOOL_TAG} '{}' is not in the tool catalog",
                action.tool
            ));
        };
        let Some(template) = self.platform.template(descriptor.name) else {
            return Err(format!(
                "{UNKNOWN_TOOL_TAG} '{}' cannot be executed on {}",
                action.tool, self.platform
            ));
        };

        if let Some(validator) = self.validators.get(descriptor.name) {
            let instance = Value::Object(action.args.clone());
            let messages: Vec<String> = validator
                .iter_errors(&instance)
                .map(|err| err.to_string())
                .collect();
            if !messages.is_empty() {
                return Err(format!(
                    "{ARGUMENT_ERROR_TAG} {}: {}",
                    action.tool,
                    messages.join("; ")
                ));
            }
        }

        let command = render_command(template, &action.args)
            .map_err(|err| format!("{ARGUMENT_ERROR_TAG} {}: {err}", action.tool))?;
        Ok(PreparedCommand {
            tool: descriptor.name.to_string(),
            command,
        })
    }

    pub fn evaluate(&self, prepared: &PreparedCommand) -> Verdict {
        self.gate.evaluate(&prepared.command, self.mode)
    }

    /// Run a prepared command that has already passed the gate.
    #[instrument(skip_all, fields(tool = %prepared.tool))]
    pub fn execute(&self, prepared: &PreparedCommand) -> String {
        debug!(command = %prepared.command, "dispatching");
        let raw = match self.transport.execute(&prepared.command, self.timeout) {
            Ok(output) => normalize_output(output.exit_code, &output.stdout, &output.stderr),
            Err(TransportError::TimedOut(limit)) => format!(
                "{TIMEOUT_TAG} command exceeded {}s: {}",
                limit.as_secs(),
                prepared.command
            ),
            Err(err) => format!("{TRANSPORT_ERROR_TAG} {err}"),
        };
        truncate_result(&raw, self.result_limit)
    }

    /// Prepare, gate and execute one action with no operator available:
    /// anything that would need approval is reported as denied.
    pub fn dispatch(&self, action: &ActionRequest) -> String {
        let prepared = match self.prepare(action) {
            Ok(prepared) => prepared,
            Err(result) => return result,
        };
        match self.evaluate(&prepared) {
            Verdict::Allow { note: None } => self.execute(&prepared),
            Verdict::Allow { note: Some(note) } => {
                format!("{}\n[{note}]", self.execute(&prepared))
            }
            Verdict::Deny { reason } => denial_text(&reason),
            Verdict::RequireApproval { reason } => {
                denial_text(&format!("{reason} requires operator approval"))
            }
        }
    }
}

pub fn denial_text(reason: &str) -> String {
    format!("{DENIED_TAG} {reason}")
}

/// Exit 0 keeps stdout verbatim (or a placeholder when empty); anything else
/// is tagged with the exit code and the most useful diagnostic stream.
fn normalize_output(exit_code: i32, stdout: &str, stderr: &str) -> String {
    if exit_code == 0 {
        if stdout.trim().is_empty() {
            return NO_OUTPUT_TEXT.to_string();
        }
        return stdout.to_string();
    }
    let detail = [stderr.trim(), stdout.trim()]
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or("(no output)");
    format!("[EXIT {exit_code}] {detail}")
}
