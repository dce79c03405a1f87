//! Tool catalog offered to the reasoning backend.
//!
//! The catalog is the capability contract: renaming a tool or changing its
//! required fields breaks any backend already conditioned on it.

use std::collections::HashSet;

use anyhow::{Result, anyhow};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::types::COMPLETE_TOOL;

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    /// Parameter schema as a JSON Schema object, used to validate arguments.
    ///
    /// Integer parameters (PIDs, line counts) must be positive.
    pub fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            let property = match param.kind {
                ParamType::Integer => json!({ "type": "integer", "minimum": 1 }),
                kind => json!({ "type": kind.as_str() }),
            };
            properties.insert(param.name.to_string(), property);
        }
        let required: Vec<&str> = self.required_params().map(|p| p.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// External descriptor format: `{name, description, parameters: {field: {type, required}}}`.
    pub fn to_wire(&self) -> Value {
        let mut parameters = Map::new();
        for param in &self.params {
            parameters.insert(
                param.name.to_string(),
                json!({
                    "type": param.kind.as_str(),
                    "required": param.required,
                    "description": param.description,
                }),
            );
        }
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": parameters,
        })
    }
}

/// Immutable, ordered set of tool descriptors keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name) {
                return Err(anyhow!("duplicate tool name '{}'", tool.name));
            }
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn to_wire(&self) -> Value {
        Value::Array(self.tools.iter().map(ToolDescriptor::to_wire).collect())
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self {
            tools: default_tools(),
        }
    }
}

fn default_tools() -> Vec<ToolDescriptor> {
    use ParamType::{Boolean, Integer, String as Text};

    vec![
        ToolDescriptor {
            name: "list_processes",
            description: "List the top resource-consuming processes, sorted by memory.",
            params: Vec::new(),
        },
        ToolDescriptor {
            name: "kill_process",
            description: "Terminate a process by its PID.",
            params: vec![
                ParamSpec::required("pid", Integer, "The PID to terminate."),
                ParamSpec::optional("force", Boolean, "Send SIGKILL instead of SIGTERM."),
            ],
        },
        ToolDescriptor {
            name: "list_directory",
            description: "List the contents of a directory.",
            params: vec![ParamSpec::required("path", Text, "Directory path.")],
        },
        ToolDescriptor {
            name: "read_log",
            description: "Show the last lines of a log file.",
            params: vec![
                ParamSpec::required("path", Text, "Log file path."),
                ParamSpec::optional("lines", Integer, "Number of trailing lines (default 20)."),
            ],
        },
        ToolDescriptor {
            name: "grep_file",
            description: "Search a file for a pattern with two lines of context.",
            params: vec![
                ParamSpec::required("pattern", Text, "Text or regex to find."),
                ParamSpec::required("path", Text, "File path."),
            ],
        },
        ToolDescriptor {
            name: "write_file",
            description: "Write content to a file (used for incident reports).",
            params: vec![
                ParamSpec::required("path", Text, "Destination path."),
                ParamSpec::required("content", Text, "File content."),
            ],
        },
        ToolDescriptor {
            name: "check_service",
            description: "Show the status of a system service.",
            params: vec![ParamSpec::required("service", Text, "Service name.")],
        },
        ToolDescriptor {
            name: "restart_service",
            description: "Restart a system service.",
            params: vec![ParamSpec::required("service", Text, "Service name.")],
        },
        ToolDescriptor {
            name: "get_net_stats",
            description: "List listening TCP/UDP ports.",
            params: Vec::new(),
        },
        ToolDescriptor {
            name: COMPLETE_TOOL,
            description: "Finish the mission with a technical summary. The first line becomes a lesson.",
            params: vec![ParamSpec::required("summary", Text, "Technical summary.")],
        },
    ]
}
