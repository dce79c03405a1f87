//! Action parser: raw backend output to typed intents.
//!
//! Accepted payloads, embedded anywhere in the response (prose, code fences
//! and stray delimiters around them are ignored, the first well-formed payload
//! wins):
//!
//! - `{"risk"?, "thought"?, "tool"?, "args"?, "actions"?: [{"tool", "args"}]}`
//! - `[{"tool", "args"}, ...]`
//!
//! Backends may also annotate their reasoning with the line protocol
//! `RISK_ANALYSIS: <tier> ...` / `THOUGHT: ...`, alone or next to a payload.
//!
//! Parsing never fails: an empty or unparseable response yields a single
//! diagnostic thought and sets [`Parsed::unparseable`].

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::core::types::{ActionRequest, Args, COMPLETE_TOOL, Intent, RiskTier, THOUGHT_TOOL};

pub const PARSE_ERROR_TAG: &str = "[PARSE ERROR]";

const PREVIEW_CHARS: usize = 120;

static RISK_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(high|medium|low)\b").unwrap());
static MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]+)\s*:(.*)$").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub intents: Vec<Intent>,
    /// True when nothing structured could be extracted.
    pub unparseable: bool,
}

pub fn parse_response(raw: &str) -> Parsed {
    let annotation = parse_text_protocol(raw);

    if let Some(mut intents) = first_payload(raw) {
        let has_thought = intents.iter().any(|i| matches!(i, Intent::Thought { .. }));
        if let (false, Some(thought)) = (has_thought, annotation) {
            intents.insert(0, thought);
        }
        return Parsed {
            intents,
            unparseable: false,
        };
    }

    if let Some(thought) = annotation {
        return Parsed {
            intents: vec![thought],
            unparseable: false,
        };
    }

    Parsed {
        intents: vec![Intent::thought(diagnostic(raw))],
        unparseable: true,
    }
}

fn diagnostic(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return format!("{PARSE_ERROR_TAG} empty response from reasoning backend");
    }
    let mut preview: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    if trimmed.chars().count() > PREVIEW_CHARS {
        preview.push_str("...");
    }
    format!("{PARSE_ERROR_TAG} no action payload found in response: {preview}")
}

/// Scan for the first JSON value that is a recognizable payload.
fn first_payload(raw: &str) -> Option<Vec<Intent>> {
    for (offset, ch) in raw.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&raw[offset..]).into_iter::<Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        let intents = match value {
            Value::Object(map) => intents_from_object(map),
            Value::Array(items) => intents_from_actions(items),
            _ => Vec::new(),
        };
        if !intents.is_empty() {
            return Some(intents);
        }
    }
    None
}

fn intents_from_object(mut map: Map<String, Value>) -> Vec<Intent> {
    let mut intents = Vec::new();

    let risk = map
        .get("risk")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<RiskTier>().ok());
    let thought = map
        .get("thought")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if thought.is_some() || risk.is_some() {
        intents.push(Intent::Thought {
            text: thought.unwrap_or_else(|| "risk assessed".to_string()),
            risk,
        });
    }

    if let Some(intent) = intent_from_call(&mut map) {
        intents.push(intent);
    }
    if let Some(Value::Array(actions)) = map.remove("actions") {
        intents.extend(intents_from_actions(actions));
    }
    intents
}

fn intents_from_actions(items: Vec<Value>) -> Vec<Intent> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(mut map) => intent_from_call(&mut map),
            _ => None,
        })
        .collect()
}

/// `{"tool": ..., "args": {...}}` to an intent; `None` when `tool` is absent.
fn intent_from_call(map: &mut Map<String, Value>) -> Option<Intent> {
    let tool = map
        .get("tool")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();
    let args = match map.remove("args") {
        Some(Value::Object(args)) => args,
        _ => Args::new(),
    };

    let intent = match tool.as_str() {
        COMPLETE_TOOL => Intent::Completion {
            summary: string_arg(&args, &["summary", "text"]).unwrap_or_default(),
        },
        THOUGHT_TOOL => Intent::Thought {
            text: string_arg(&args, &["text", "thought", "content"]).unwrap_or_default(),
            risk: args
                .get("risk")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        },
        _ => Intent::Action(ActionRequest::new(tool, args)),
    };
    Some(intent)
}

fn string_arg(args: &Args, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| args.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// `RISK_ANALYSIS:` / `THOUGHT:` line protocol. A `THOUGHT:` section runs until
/// the next `MARKER:` line or the start of a JSON payload.
fn parse_text_protocol(raw: &str) -> Option<Intent> {
    let mut risk_text: Option<String> = None;
    let mut thought: Option<Vec<String>> = None;
    let mut in_thought = false;

    for line in raw.lines() {
        if let Some(caps) = MARKER_RE.captures(line) {
            let marker = caps[1].to_ascii_uppercase();
            let rest = caps[2].trim().to_string();
            match marker.as_str() {
                "RISK_ANALYSIS" | "RISK" => {
                    risk_text = Some(rest);
                    in_thought = false;
                    continue;
                }
                "THOUGHT" => {
                    thought = Some(vec![rest]);
                    in_thought = true;
                    continue;
                }
                _ => in_thought = false,
            }
        }
        let starts_payload = matches!(line.trim_start().chars().next(), Some('{' | '[' | '`'));
        if starts_payload {
            in_thought = false;
        }
        if in_thought && let Some(lines) = thought.as_mut() {
            lines.push(line.trim().to_string());
        }
    }

    if risk_text.is_none() && thought.is_none() {
        return None;
    }
    let risk = risk_text.as_deref().and_then(|text| {
        RISK_WORD_RE
            .captures(text)
            .and_then(|caps| caps[1].parse::<RiskTier>().ok())
    });
    let text = thought
        .map(|lines| lines.join("\n").trim().to_string())
        .filter(|s| !s.is_empty())
        .or(risk_text)
        .unwrap_or_default();
    Some(Intent::Thought { text, risk })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_action_from_fenced_json_with_noise() {
        let raw = "Sure! Here is my plan:\n```json\n{\"tool\": \"read_log\", \"args\": {\"path\": \"/var/log/syslog\", \"lines\": 50}}\n```\nLet me know.";
        let parsed = parse_response(raw);
        assert!(!parsed.unparseable);
        assert_eq!(
            parsed.intents,
            vec![Intent::action(
                "read_log",
                json!({"path": "/var/log/syslog", "lines": 50})
            )]
        );
    }

    #[test]
    fn skips_stray_delimiters_before_the_payload() {
        let raw = "[INFO] thinking {not json} ... [{\"tool\": \"list_processes\"}, {\"tool\": \"get_net_stats\", \"args\": {}}]";
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.intents,
            vec![
                Intent::action("list_processes", json!({})),
                Intent::action("get_net_stats", json!({})),
            ]
        );
    }

    #[test]
    fn first_well_formed_payload_wins() {
        let raw = r#"{"tool": "check_service", "args": {"service": "nginx"}} {"tool": "restart_service", "args": {"service": "nginx"}}"#;
        let parsed = parse_response(raw);
        assert_eq!(parsed.intents.len(), 1);
        assert_eq!(
            parsed.intents[0],
            Intent::action("check_service", json!({"service": "nginx"}))
        );
    }

    #[test]
    fn object_with_thought_risk_and_actions_keeps_order() {
        let raw = r#"{"risk": "high", "thought": "nginx is wedged", "actions": [
            {"tool": "check_service", "args": {"service": "nginx"}},
            {"tool": "restart_service", "args": {"service": "nginx"}}
        ]}"#;
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.intents,
            vec![
                Intent::Thought {
                    text: "nginx is wedged".to_string(),
                    risk: Some(RiskTier::High)
                },
                Intent::action("check_service", json!({"service": "nginx"})),
                Intent::action("restart_service", json!({"service": "nginx"})),
            ]
        );
    }

    #[test]
    fn mission_complete_becomes_completion() {
        let raw = r#"{"tool": "mission_complete", "args": {"summary": "Killed stress-ng-vm\nDetails follow"}}"#;
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.intents,
            vec![Intent::completion("Killed stress-ng-vm\nDetails follow")]
        );
    }

    #[test]
    fn text_protocol_yields_risk_annotated_thought() {
        let raw = "RISK_ANALYSIS: HIGH - killing a database process\nTHOUGHT: The DB is leaking memory.\nIt must be restarted.";
        let parsed = parse_response(raw);
        assert!(!parsed.unparseable);
        assert_eq!(
            parsed.intents,
            vec![Intent::Thought {
                text: "The DB is leaking memory.\nIt must be restarted.".to_string(),
                risk: Some(RiskTier::High)
            }]
        );
    }

    #[test]
    fn text_protocol_annotates_a_following_payload() {
        let raw = "RISK_ANALYSIS: medium\nTHOUGHT: check first\n{\"tool\": \"check_service\", \"args\": {\"service\": \"ssh\"}}";
        let parsed = parse_response(raw);
        assert_eq!(
            parsed.intents,
            vec![
                Intent::Thought {
                    text: "check first".to_string(),
                    risk: Some(RiskTier::Medium)
                },
                Intent::action("check_service", json!({"service": "ssh"})),
            ]
        );
    }

    #[test]
    fn empty_and_prose_responses_become_diagnostic_thoughts() {
        let parsed = parse_response("   ");
        assert!(parsed.unparseable);
        assert!(matches!(
            &parsed.intents[..],
            [Intent::Thought { text, risk: None }] if text.starts_with(PARSE_ERROR_TAG) && text.contains("empty")
        ));

        let parsed = parse_response("I think we should look at the logs.");
        assert!(parsed.unparseable);
        assert!(matches!(
            &parsed.intents[..],
            [Intent::Thought { text, .. }] if text.contains("look at the logs")
        ));
    }

    #[test]
    fn payloads_without_a_tool_are_ignored() {
        let parsed = parse_response(r#"{"status": "ok"} [1, 2, 3]"#);
        assert!(parsed.unparseable);
    }
}
