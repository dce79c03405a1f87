//! Safety gate: classifies rendered commands before any transport call.
//!
//! Rules, in order:
//! 1. A blacklisted pattern anywhere in the command denies it, in every mode.
//! 2. A destructive verb (terminate, delete, restart, stop, write) requires
//!    operator approval, or is auto-approved with an audit note in simulation.
//! 3. Everything else is allowed.
//!
//! HIGH-risk thoughts are handled separately by [`requires_risk_confirmation`]
//! because they gate the next action of a cycle rather than one command.

use crate::core::types::{MissionMode, RiskTier};

/// Substrings that are never executed.
pub const BLACKLIST: &[&str] = &[
    "mkfs",
    "dd if=",
    "reboot",
    "shutdown",
    "poweroff",
    "init 0",
    "init 6",
];

/// Fork-bomb signature, matched with all whitespace removed.
const FORK_BOMB: &str = ":(){:|:&};:";

/// Command words with side effects on the target.
pub const DESTRUCTIVE_VERBS: &[&str] = &[
    "kill", "pkill", "killall", "rm", "rmdir", "shred", "unlink", "truncate", "restart", "stop",
    "tee",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Execute. `note` records an auto-approval for the audit trail.
    Allow { note: Option<String> },
    /// Never execute.
    Deny { reason: String },
    /// Execute only after an operator confirms.
    RequireApproval { reason: String },
}

impl Verdict {
    pub fn is_deny(&self) -> bool {
        matches!(self, Verdict::Deny { .. })
    }
}

#[derive(Debug, Clone)]
pub struct SafetyGate {
    blacklist: Vec<String>,
    destructive_verbs: Vec<String>,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self {
            blacklist: BLACKLIST.iter().map(|s| s.to_string()).collect(),
            destructive_verbs: DESTRUCTIVE_VERBS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SafetyGate {
    /// Gate with additional blacklist patterns on top of the built-in set.
    pub fn with_extra_blacklist<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut gate = Self::default();
        gate.blacklist.extend(
            patterns
                .into_iter()
                .map(|p| p.into().to_ascii_lowercase())
                .filter(|p| !p.trim().is_empty()),
        );
        gate
    }

    pub fn evaluate(&self, command: &str, mode: MissionMode) -> Verdict {
        let lowered = command.to_ascii_lowercase();
        if let Some(pattern) = self.blacklist.iter().find(|p| lowered.contains(p.as_str())) {
            return Verdict::Deny {
                reason: format!("blacklisted pattern '{pattern}'"),
            };
        }
        let compact: String = lowered.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.contains(FORK_BOMB) {
            return Verdict::Deny {
                reason: "fork bomb signature".to_string(),
            };
        }

        let Some(effect) = self.destructive_effect(&lowered) else {
            return Verdict::Allow { note: None };
        };
        if mode.is_simulation() {
            Verdict::Allow {
                note: Some(format!("auto-approved in simulation ({effect})")),
            }
        } else {
            Verdict::RequireApproval { reason: effect }
        }
    }

    fn destructive_effect(&self, lowered: &str) -> Option<String> {
        let tokens = shell_words::split(lowered)
            .unwrap_or_else(|_| lowered.split_whitespace().map(str::to_string).collect());

        for token in &tokens {
            let word = token.rsplit('/').next().unwrap_or(token);
            if self.destructive_verbs.iter().any(|v| v == word) {
                return Some(format!("destructive verb '{word}'"));
            }
            if is_redirect(token) {
                return Some("writes to a file".to_string());
            }
        }
        None
    }
}

fn is_redirect(token: &str) -> bool {
    token
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == '&')
        .starts_with('>')
}

/// Whether a thought's risk tier requires operator confirmation before the
/// next action of its cycle.
pub fn requires_risk_confirmation(risk: Option<RiskTier>, mode: MissionMode) -> bool {
    risk == Some(RiskTier::High) && !mode.is_simulation()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVE: MissionMode = MissionMode::Live;
    const SIM: MissionMode = MissionMode::Simulation;

    #[test]
    fn blacklist_denies_in_every_mode() {
        let gate = SafetyGate::default();
        for command in [
            "mkfs.ext4 /dev/sda1",
            "dd if=/dev/zero of=/dev/sda",
            "sudo REBOOT",
            "shutdown -h now",
            "init 0",
        ] {
            assert!(gate.evaluate(command, LIVE).is_deny(), "{command}");
            assert!(gate.evaluate(command, SIM).is_deny(), "{command}");
        }
    }

    #[test]
    fn fork_bomb_is_denied_regardless_of_spacing() {
        let gate = SafetyGate::default();
        assert!(gate.evaluate(":(){ :|:& };:", SIM).is_deny());
        assert!(gate.evaluate(":(){:|:&};:", LIVE).is_deny());
    }

    #[test]
    fn destructive_verbs_need_approval_when_live() {
        let gate = SafetyGate::default();
        assert_eq!(
            gate.evaluate("kill -9 1234", LIVE),
            Verdict::RequireApproval {
                reason: "destructive verb 'kill'".to_string()
            }
        );
        assert!(matches!(
            gate.evaluate("systemctl restart nginx", LIVE),
            Verdict::RequireApproval { .. }
        ));
        assert!(matches!(
            gate.evaluate("/bin/rm -f /tmp/x", LIVE),
            Verdict::RequireApproval { .. }
        ));
        assert_eq!(
            gate.evaluate("printf '%s' 'report' > /tmp/report.txt", LIVE),
            Verdict::RequireApproval {
                reason: "writes to a file".to_string()
            }
        );
    }

    #[test]
    fn destructive_verbs_are_auto_approved_with_note_in_simulation() {
        let gate = SafetyGate::default();
        let verdict = gate.evaluate("kill -15 1234", SIM);
        assert_eq!(
            verdict,
            Verdict::Allow {
                note: Some("auto-approved in simulation (destructive verb 'kill')".to_string())
            }
        );
    }

    #[test]
    fn read_only_commands_are_allowed() {
        let gate = SafetyGate::default();
        for command in [
            "ps aux --sort=-%mem | head -n 10",
            "systemctl status nginx --no-pager",
            "tail -n 20 -- /var/log/syslog",
            "grep -nC 2 -e 'a > b' -- /var/log/syslog",
            "ss -tuln",
        ] {
            assert_eq!(gate.evaluate(command, LIVE), Verdict::Allow { note: None }, "{command}");
        }
    }

    #[test]
    fn extra_patterns_extend_the_blacklist() {
        let gate = SafetyGate::with_extra_blacklist(["iptables -F", " "]);
        assert!(gate.evaluate("IPTABLES -F", LIVE).is_deny());
        assert_eq!(gate.evaluate("ls -F -- /tmp", LIVE), Verdict::Allow { note: None });
    }

    #[test]
    fn high_risk_needs_confirmation_only_when_live() {
        assert!(requires_risk_confirmation(Some(RiskTier::High), LIVE));
        assert!(!requires_risk_confirmation(Some(RiskTier::High), SIM));
        assert!(!requires_risk_confirmation(Some(RiskTier::Medium), LIVE));
        assert!(!requires_risk_confirmation(None, LIVE));
    }
}
