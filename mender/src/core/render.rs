//! Command template rendering with per-value shell escaping.
//!
//! Templates are owned by the platform strategy and trusted; argument values
//! are not. Placeholders:
//!
//! - `{name}`: required argument, shell-quoted.
//! - `{name=default}`: optional argument, shell-quoted, `default` when absent.
//! - `{name?then|else}`: boolean switch between two template-owned literals.
//!
//! Every interpolated value is quoted on its own with `shell_words::quote`, so
//! distinct argument mappings can never render to the same command and no
//! value can escape its word.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::types::Args;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\w+)(?:=([^{}?|]*)|\?([^{}|]*)\|([^{}]*))?\}").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing required argument '{0}'")]
    Missing(String),
    #[error("argument '{name}' must be a boolean")]
    NotBoolean { name: String },
    #[error("argument '{name}' has unsupported type {kind}")]
    Unsupported { name: String, kind: &'static str },
}

/// Render `template` with `args`, quoting each interpolated value independently.
pub fn render_command(template: &str, args: &Args) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let whole = caps.get(0).expect("capture group 0 always exists");
        out.push_str(&template[last..whole.start()]);
        last = whole.end();

        let name = &caps[1];
        if let (Some(then), Some(otherwise)) = (caps.get(3), caps.get(4)) {
            let flag = match args.get(name) {
                None | Some(Value::Null) => false,
                Some(Value::Bool(flag)) => *flag,
                Some(_) => {
                    return Err(RenderError::NotBoolean {
                        name: name.to_string(),
                    });
                }
            };
            out.push_str(if flag {
                then.as_str()
            } else {
                otherwise.as_str()
            });
            continue;
        }

        let raw = match (args.get(name), caps.get(2)) {
            (Some(value), _) if !value.is_null() => scalar_text(name, value)?,
            (_, Some(default)) => default.as_str().to_string(),
            _ => return Err(RenderError::Missing(name.to_string())),
        };
        out.push_str(&shell_words::quote(&raw));
    }

    out.push_str(&template[last..]);
    Ok(out)
}

fn scalar_text(name: &str, value: &Value) -> Result<String, RenderError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) => Err(unsupported(name, "array")),
        Value::Object(_) => Err(unsupported(name, "object")),
        Value::Null => Err(RenderError::Missing(name.to_string())),
    }
}

fn unsupported(name: &str, kind: &'static str) -> RenderError {
    RenderError::Unsupported {
        name: name.to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Args {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn renders_required_optional_and_switch_placeholders() {
        let template = "kill {force?-9|-15} {pid}";
        let cmd = render_command(template, &args(json!({"pid": 1234, "force": true}))).unwrap();
        assert_eq!(cmd, "kill -9 1234");

        let cmd = render_command(template, &args(json!({"pid": 1234}))).unwrap();
        assert_eq!(cmd, "kill -15 1234");

        let cmd = render_command("tail -n {lines=20} -- {path}", &args(json!({"path": "/var/log/syslog"})))
            .unwrap();
        assert_eq!(cmd, "tail -n 20 -- /var/log/syslog");
    }

    #[test]
    fn hostile_values_stay_inside_one_word() {
        let cmd = render_command(
            "tail -n 20 -- {path}",
            &args(json!({"path": "file.txt; rm -rf /"})),
        )
        .unwrap();
        assert_eq!(cmd, "tail -n 20 -- 'file.txt; rm -rf /'");
        let words = shell_words::split(&cmd).unwrap();
        assert_eq!(words.last().map(String::as_str), Some("file.txt; rm -rf /"));

        let cmd = render_command(
            "grep -nC 2 -e {pattern} -- {path}",
            &args(json!({"pattern": "it's $(whoami)", "path": "/tmp/a b"})),
        )
        .unwrap();
        let words = shell_words::split(&cmd).unwrap();
        assert_eq!(words[4], "it's $(whoami)");
        assert_eq!(words[6], "/tmp/a b");
    }

    #[test]
    fn distinct_arguments_render_distinct_commands() {
        let a = render_command("ls -F -- {path}", &args(json!({"path": "a b"}))).unwrap();
        let b = render_command("ls -F -- {path}", &args(json!({"path": "'a b'"}))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn reports_missing_and_mistyped_arguments() {
        let err = render_command("systemctl restart {service}", &Args::new()).unwrap_err();
        assert_eq!(err, RenderError::Missing("service".to_string()));

        let err = render_command("kill {force?-9|-15} 1", &args(json!({"force": "yes"})))
            .unwrap_err();
        assert!(matches!(err, RenderError::NotBoolean { .. }));

        let err = render_command("ls {path}", &args(json!({"path": ["a"]}))).unwrap_err();
        assert!(err.to_string().contains("unsupported type array"));
    }
}
