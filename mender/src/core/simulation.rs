//! Deterministic simulation backend.
//!
//! An ordered table of context patterns to fixed intents. Patterns are
//! case-insensitive substrings of the cycle context; the first rule whose
//! patterns all hold wins. The same context always yields the same intents.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::json;

use crate::core::types::{Intent, RiskTier};

pub const NO_MATCH_TEXT: &str = "[SIMULATION] no scripted response matches the current context";

/// One row of the pattern table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationRule {
    /// Every pattern must occur in the context.
    #[serde(default)]
    pub all: Vec<String>,
    /// At least one pattern must occur, when non-empty.
    #[serde(default)]
    pub any: Vec<String>,
    /// No pattern may occur.
    #[serde(default)]
    pub none: Vec<String>,
    pub intents: Vec<Intent>,
}

impl SimulationRule {
    fn matches(&self, context: &str) -> bool {
        self.all.iter().all(|p| context.contains(p.as_str()))
            && (self.any.is_empty() || self.any.iter().any(|p| context.contains(p.as_str())))
            && !self.none.iter().any(|p| context.contains(p.as_str()))
    }

    fn normalized(mut self) -> Self {
        for patterns in [&mut self.all, &mut self.any, &mut self.none] {
            for pattern in patterns.iter_mut() {
                *pattern = pattern.to_lowercase();
            }
        }
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SimulationScript {
    rules: Vec<SimulationRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationBackend {
    rules: Vec<SimulationRule>,
}

impl Default for SimulationBackend {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl SimulationBackend {
    pub fn new(rules: Vec<SimulationRule>) -> Self {
        Self {
            rules: rules.into_iter().map(SimulationRule::normalized).collect(),
        }
    }

    /// Parse a TOML pattern table (`[[rules]]` with `all`/`any`/`none` and
    /// `[[rules.intents]]`).
    pub fn from_toml(raw: &str) -> Result<Self> {
        let script: SimulationScript = toml::from_str(raw).context("parse simulation script")?;
        if script.rules.is_empty() {
            bail!("simulation script has no rules");
        }
        for (index, rule) in script.rules.iter().enumerate() {
            if rule.intents.is_empty() {
                bail!("simulation rule {} has no intents", index + 1);
            }
        }
        Ok(Self::new(script.rules))
    }

    pub fn rules(&self) -> &[SimulationRule] {
        &self.rules
    }

    /// Intents scripted for `context`, or a single fallback thought.
    pub fn respond(&self, context: &str) -> Vec<Intent> {
        let lowered = context.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.intents.clone())
            .unwrap_or_else(|| vec![Intent::thought(NO_MATCH_TEXT)])
    }
}

fn rule(all: &[&str], any: &[&str], intents: Vec<Intent>) -> SimulationRule {
    SimulationRule {
        all: all.iter().map(|s| s.to_string()).collect(),
        any: any.iter().map(|s| s.to_string()).collect(),
        none: Vec::new(),
        intents,
    }
}

/// Built-in scenarios matching the canned outputs of the simulated transport.
fn default_rules() -> Vec<SimulationRule> {
    const KILL_WORDS: &[&str] = &["kill", "terminate", "free up", "stop the"];
    const FRESH: &[&str] = &["no actions yet"];

    vec![
        // Follow-ups, keyed on what the history already contains.
        rule(
            &["action=kill_process"],
            &[],
            vec![Intent::completion(
                "Terminated stress-ng-vm (PID 4242) to relieve memory pressure.\nIt held 38.5% of memory; no other process exceeded 5%.",
            )],
        ),
        rule(
            &["action=list_processes", "%mem"],
            KILL_WORDS,
            vec![
                Intent::Thought {
                    text: "stress-ng-vm (PID 4242) holds 38.5% of memory; terminating it drops its work."
                        .to_string(),
                    risk: Some(RiskTier::High),
                },
                Intent::action("kill_process", json!({"pid": 4242, "force": false})),
            ],
        ),
        rule(
            &["action=list_processes", "%mem"],
            &[],
            vec![Intent::completion(
                "Top memory consumer is stress-ng-vm (PID 4242) at 38.5% MEM.\nFound via list_processes; postgres is second at 4.1%.",
            )],
        ),
        rule(
            &["action=restart_service"],
            &[],
            vec![Intent::completion(
                "Restarted nginx; the service is active again.\nStatus showed it inactive (dead) before the restart.",
            )],
        ),
        rule(
            &["action=check_service", "inactive"],
            &[],
            vec![
                Intent::Thought {
                    text: "nginx is inactive; a restart briefly refuses connections.".to_string(),
                    risk: Some(RiskTier::Medium),
                },
                Intent::action("restart_service", json!({"service": "nginx"})),
            ],
        ),
        rule(
            &["action=get_net_stats"],
            &[],
            vec![Intent::completion(
                "Listening ports: 22/tcp (ssh), 80/tcp (nginx), 5432/tcp (postgres).\nNo unexpected listeners found.",
            )],
        ),
        rule(
            &["action=read_log"],
            &[],
            vec![Intent::completion(
                "Syslog shows repeated OOM-killer events triggered by stress-ng-vm.\nMemory pressure is the root cause of the errors.",
            )],
        ),
        // Openers for a fresh mission, keyed on the objective.
        rule(
            FRESH,
            &["memory", "ram", "process"],
            vec![Intent::action("list_processes", json!({}))],
        ),
        rule(
            FRESH,
            &["nginx", "service", "web server"],
            vec![Intent::action("check_service", json!({"service": "nginx"}))],
        ),
        rule(
            FRESH,
            &["port", "network", "listening"],
            vec![Intent::action("get_net_stats", json!({}))],
        ),
        rule(
            FRESH,
            &["log", "error"],
            vec![Intent::action(
                "read_log",
                json!({"path": "/var/log/syslog", "lines": 50}),
            )],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        let backend = SimulationBackend::new(vec![
            rule(&["disk"], &[], vec![Intent::thought("first")]),
            rule(&["disk"], &[], vec![Intent::thought("second")]),
        ]);
        assert_eq!(backend.respond("DISK is full"), vec![Intent::thought("first")]);
    }

    #[test]
    fn responses_are_reproducible_and_fall_back_to_a_thought() {
        let backend = SimulationBackend::default();
        let context = "Objective: find the process using the most memory\nNo actions yet.";
        assert_eq!(backend.respond(context), backend.respond(context));
        assert_eq!(
            backend.respond(context),
            vec![Intent::action("list_processes", json!({}))]
        );
        assert_eq!(
            backend.respond("Objective: water the plants\nNo actions yet."),
            vec![Intent::thought(NO_MATCH_TEXT)]
        );
    }

    #[test]
    fn process_table_leads_to_completion_naming_top_consumer() {
        let backend = SimulationBackend::default();
        let context = "Objective: find the process using the most memory\n\
                       Step 1: Action=list_processes({}) Result=USER PID %CPU %MEM COMMAND\nroot 4242 99.0 38.5 stress-ng-vm";
        let intents = backend.respond(context);
        assert!(matches!(
            &intents[..],
            [Intent::Completion { summary }] if summary.contains("stress-ng-vm")
        ));
    }

    #[test]
    fn none_patterns_exclude_a_rule() {
        let mut excluded = rule(&["cpu"], &[], vec![Intent::thought("cpu")]);
        excluded.none = vec!["Idle".to_string()];
        let backend = SimulationBackend::new(vec![
            excluded,
            rule(&[], &[], vec![Intent::thought("catch-all")]),
        ]);
        assert_eq!(backend.respond("cpu idle"), vec![Intent::thought("catch-all")]);
        assert_eq!(backend.respond("cpu busy"), vec![Intent::thought("cpu")]);
    }

    #[test]
    fn loads_pattern_table_from_toml() {
        let raw = r#"
[[rules]]
all = ["No actions yet"]
any = ["disk"]

[[rules.intents]]
kind = "thought"
text = "checking disk usage"
risk = "LOW"

[[rules.intents]]
kind = "action"
tool = "list_directory"
args = { path = "/var/log" }

[[rules]]
all = ["action=list_directory"]

[[rules.intents]]
kind = "completion"
summary = "Disk usage is fine"
"#;
        let backend = SimulationBackend::from_toml(raw).expect("parse script");
        assert_eq!(backend.rules().len(), 2);
        assert_eq!(
            backend.respond("fix the disk\nNo actions yet."),
            vec![
                Intent::Thought {
                    text: "checking disk usage".to_string(),
                    risk: Some(RiskTier::Low)
                },
                Intent::action("list_directory", json!({"path": "/var/log"})),
            ]
        );
    }

    #[test]
    fn rejects_rules_without_intents() {
        let raw = "[[rules]]\nall = [\"x\"]\nintents = []\n";
        let err = SimulationBackend::from_toml(raw).unwrap_err();
        assert!(err.to_string().contains("rule 1 has no intents"));
    }
}
