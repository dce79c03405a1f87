//! Prompt and report rendering with minijinja templates.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::catalog::ToolCatalog;
use crate::core::context::MissionContext;
use crate::core::platform::Platform;
use crate::core::types::{MissionMode, StepRecord};

const MISSION_TEMPLATE: &str = include_str!("prompts/mission.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");

const PREVIEW_CHARS: usize = 160;

fn environment() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template("mission", MISSION_TEMPLATE)
        .context("load mission template")?;
    env.add_template("report", REPORT_TEMPLATE)
        .context("load report template")?;
    Ok(env)
}

/// Full prompt for a live backend: situation, tool catalog and response protocol.
pub fn render_mission_prompt(
    ctx: &MissionContext,
    catalog: &ToolCatalog,
    platform: Platform,
    mode: MissionMode,
) -> Result<String> {
    let tools =
        serde_json::to_string_pretty(&catalog.to_wire()).context("serialize tool catalog")?;
    let env = environment()?;
    let rendered = env
        .get_template("mission")?
        .render(context! {
            platform => platform.as_str(),
            simulation => mode.is_simulation(),
            situation => ctx.situation(),
            tools => tools,
        })
        .context("render mission prompt")?;
    Ok(rendered)
}

/// Data rendered into the post-mortem report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportInput<'a> {
    pub objective: &'a str,
    pub status: &'a str,
    pub mode: &'a str,
    pub failed_over: bool,
    pub timestamp: &'a str,
    pub cycles: u32,
    pub audit_file: &'a str,
    pub hash: &'a str,
    pub summary: Option<&'a str>,
    pub steps: &'a [StepRecord],
}

#[derive(Debug, Serialize)]
struct ReportStep {
    step: u32,
    cycle: u32,
    tool: String,
    args: String,
    risk: Option<String>,
    preview: String,
}

impl ReportStep {
    fn from_record(record: &StepRecord) -> Self {
        let args = if record.args.is_empty() {
            String::new()
        } else {
            serde_json::to_string(&record.args).unwrap_or_default()
        };
        Self {
            step: record.step,
            cycle: record.cycle,
            tool: record.tool.clone(),
            args,
            risk: record.risk.map(|r| r.as_str().to_string()),
            preview: preview(&record.result),
        }
    }
}

fn preview(result: &str) -> String {
    let first = result.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut out: String = first.trim().chars().take(PREVIEW_CHARS).collect();
    if first.trim().chars().count() > PREVIEW_CHARS || result.trim().lines().count() > 1 {
        out.push_str(" ...");
    }
    out
}

pub fn render_report(input: &ReportInput<'_>) -> Result<String> {
    let steps: Vec<ReportStep> = input.steps.iter().map(ReportStep::from_record).collect();
    let env = environment()?;
    let mut rendered = env
        .get_template("report")?
        .render(context! {
            objective => input.objective,
            status => input.status,
            mode => input.mode,
            failed_over => input.failed_over,
            timestamp => input.timestamp,
            cycles => input.cycles,
            audit_file => input.audit_file,
            hash => input.hash,
            summary => input.summary.map(str::trim).filter(|s| !s.is_empty()),
            steps => steps,
        })
        .context("render post-mortem report")?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}
