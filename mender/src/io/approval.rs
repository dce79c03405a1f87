//! Human-in-the-loop confirmation.

use anyhow::Result;
use dialoguer::Confirm;
use tracing::{info, warn};

use crate::core::types::RiskTier;

/// Why the operator is being asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalKind {
    /// The backend rated its plan HIGH risk; a denial aborts the mission.
    HighRisk { rationale: String },
    /// The command has side effects; a denial only skips it.
    Destructive { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub kind: ApprovalKind,
    pub tool: String,
    pub command: String,
}

impl ApprovalRequest {
    pub fn prompt(&self) -> String {
        match &self.kind {
            ApprovalKind::HighRisk { rationale } => format!(
                "{} risk: {rationale}\n  next action: {} -> `{}`\n  Approve? (denial aborts the mission)",
                RiskTier::High,
                self.tool,
                self.command
            ),
            ApprovalKind::Destructive { reason } => format!(
                "{reason}: {} -> `{}`\n  Approve?",
                self.tool, self.command
            ),
        }
    }
}

pub trait Approver {
    /// Ask the operator; `Ok(true)` means approved.
    fn confirm(&self, request: &ApprovalRequest) -> Result<bool>;
}

/// Interactive yes/no prompt on the controlling terminal. Defaults to "no";
/// a prompt that cannot be shown (no terminal) counts as a denial.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleApprover;

impl Approver for ConsoleApprover {
    fn confirm(&self, request: &ApprovalRequest) -> Result<bool> {
        let answer = Confirm::new()
            .with_prompt(request.prompt())
            .default(false)
            .interact();
        match answer {
            Ok(approved) => {
                info!(tool = %request.tool, approved, "operator decision");
                Ok(approved)
            }
            Err(err) => {
                warn!(err = %err, tool = %request.tool, "approval prompt unavailable, treating as denial");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_name_the_command_and_consequence() {
        let high = ApprovalRequest {
            kind: ApprovalKind::HighRisk {
                rationale: "killing the database".to_string(),
            },
            tool: "kill_process".to_string(),
            command: "kill -9 811".to_string(),
        };
        let text = high.prompt();
        assert!(text.starts_with("HIGH risk: killing the database"));
        assert!(text.contains("`kill -9 811`"));
        assert!(text.contains("aborts"));

        let destructive = ApprovalRequest {
            kind: ApprovalKind::Destructive {
                reason: "destructive verb 'restart'".to_string(),
            },
            tool: "restart_service".to_string(),
            command: "systemctl restart nginx".to_string(),
        };
        assert_eq!(
            destructive.prompt(),
            "destructive verb 'restart': restart_service -> `systemctl restart nginx`\n  Approve?"
        );
    }
}
