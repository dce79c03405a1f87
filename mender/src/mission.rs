//! Mission control loop.
//!
//! Each cycle assembles the context (OBSERVE/ORIENT), asks the reasoning
//! adapter for intents (DECIDE) and processes them in order (ACT): thoughts
//! are recorded, actions pass the safety gate and the dispatcher, a
//! completion resolves the mission. The loop ends with exactly one recorded
//! outcome: Resolved, Halted (cycle budget or a failure tolerance exhausted)
//! or Aborted (operator denied a HIGH-risk action).

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::adapter::{PromptSetup, ReasoningAdapter, Sleeper};
use crate::core::catalog::ToolCatalog;
use crate::core::context::MissionContext;
use crate::core::history::History;
use crate::core::safety::{SafetyGate, Verdict, requires_risk_confirmation};
use crate::core::simulation::SimulationBackend;
use crate::core::types::{
    ActionRequest, Args, COMPLETE_TOOL, CYCLE_ERROR_TOOL, Intent, MissionMode, MissionStatus,
    RiskTier, StepRecord, THOUGHT_TOOL,
};
use crate::dispatch::{DENIED_TAG, ToolDispatcher, denial_text};
use crate::io::approval::{ApprovalKind, ApprovalRequest, Approver};
use crate::io::audit::{AuditRecord, ReportMeta, write_audit};
use crate::io::backend::ReasoningBackend;
use crate::io::config::MissionConfig;
use crate::io::knowledge::{KnowledgeStore, Lesson};
use crate::io::transport::{Transport, detect_platform};

pub const CYCLE_ERROR_TAG: &str = "[CYCLE ERROR]";

/// Collaborators of one mission.
pub struct MissionDeps<'a> {
    /// Live reasoning backend; ignored in simulation mode.
    pub live: Option<Box<dyn ReasoningBackend + 'a>>,
    pub simulation: SimulationBackend,
    pub transport: &'a dyn Transport,
    pub approver: &'a dyn Approver,
    pub sleeper: &'a dyn Sleeper,
}

/// Progress notifications for the operator.
#[derive(Debug)]
pub enum MissionEvent<'e> {
    CycleStarted { cycle: u32, max_cycles: u32 },
    FailedOver { reason: &'e str },
    Step(&'e StepRecord),
}

/// Why the mission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissionStop {
    /// The backend declared the objective met.
    Completed,
    /// `max_cycles` cycles ran without a completion.
    BudgetExhausted { max_cycles: u32 },
    /// Too many consecutive unparseable responses.
    ParseFailures { consecutive: u32 },
    /// Too many consecutive cycles failed outright.
    CycleErrors { consecutive: u32 },
    /// The operator denied a HIGH-risk action.
    OperatorDenied { tool: String },
}

impl MissionStop {
    pub fn status(&self) -> MissionStatus {
        match self {
            MissionStop::Completed => MissionStatus::Resolved,
            MissionStop::OperatorDenied { .. } => MissionStatus::Aborted,
            MissionStop::BudgetExhausted { .. }
            | MissionStop::ParseFailures { .. }
            | MissionStop::CycleErrors { .. } => MissionStatus::Halted,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            MissionStop::Completed => "objective met".to_string(),
            MissionStop::BudgetExhausted { max_cycles } => {
                format!("cycle budget of {max_cycles} exhausted without completion")
            }
            MissionStop::ParseFailures { consecutive } => {
                format!("{consecutive} consecutive unparseable backend responses")
            }
            MissionStop::CycleErrors { consecutive } => {
                format!("{consecutive} consecutive failed cycles")
            }
            MissionStop::OperatorDenied { tool } => {
                format!("operator denied HIGH-risk action {tool}")
            }
        }
    }
}

/// The single outcome of a mission.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionOutcome {
    pub status: MissionStatus,
    pub stop: MissionStop,
    pub summary: Option<String>,
    pub history: Vec<StepRecord>,
    pub cycles: u32,
    pub mode: MissionMode,
    pub failed_over: bool,
    /// Hex SHA-256 of the audit file.
    pub hash: String,
    pub audit_path: PathBuf,
    pub report_path: PathBuf,
    /// Lesson stored for future missions (resolved outcomes only).
    pub lesson: Option<Lesson>,
}

/// How one cycle's intents ended.
enum CycleEnd {
    Continue,
    Resolved(String),
    Aborted(String),
}

/// Run one mission to completion and record its outcome.
#[instrument(skip_all, fields(objective = %objective, simulation = cfg.simulation))]
pub fn run_mission<F>(
    objective: &str,
    cfg: &MissionConfig,
    deps: MissionDeps<'_>,
    mut on_event: F,
) -> Result<MissionOutcome>
where
    F: FnMut(MissionEvent<'_>),
{
    cfg.validate()?;
    if objective.trim().is_empty() {
        return Err(anyhow!("objective must not be empty"));
    }

    let mode = MissionMode::from_flag(cfg.simulation);
    let platform = detect_platform(deps.transport, cfg.command_timeout());
    info!(mode = mode.as_str(), platform = %platform, "mission starting");

    let catalog = ToolCatalog::default();
    let dispatcher = ToolDispatcher::new(
        &catalog,
        platform,
        deps.transport,
        SafetyGate::with_extra_blacklist(cfg.safety.extra_blacklist.iter().cloned()),
        mode,
        cfg.command_timeout(),
        cfg.result_limit_chars,
    )?;
    let mut knowledge = KnowledgeStore::load(&cfg.knowledge_path(), cfg.knowledge.max_lessons)
        .context("load knowledge store")?;
    let mut adapter = ReasoningAdapter::new(
        deps.live,
        deps.simulation,
        cfg.retry.policy(),
        deps.sleeper,
        PromptSetup {
            catalog: catalog.clone(),
            platform,
            mode,
        },
    );

    let mut cycle_loop = CycleLoop {
        mode,
        dispatcher: &dispatcher,
        approver: deps.approver,
        history: History::new(),
        on_event: &mut on_event,
    };

    let mut parse_failures = 0u32;
    let mut cycle_errors = 0u32;
    let mut cycles = 0u32;
    let mut stop = MissionStop::BudgetExhausted {
        max_cycles: cfg.max_cycles,
    };
    let mut summary: Option<String> = None;

    for cycle in 1..=cfg.max_cycles {
        cycles = cycle;
        (cycle_loop.on_event)(MissionEvent::CycleStarted {
            cycle,
            max_cycles: cfg.max_cycles,
        });

        let ctx = MissionContext::new(
            objective,
            cycle,
            knowledge.context_lines(),
            cycle_loop.history.recent(cfg.history_window),
        );
        let was_failed_over = adapter.failed_over();
        let decided = adapter.decide(&ctx);
        if !was_failed_over && let Some(reason) = adapter.failover_reason() {
            (cycle_loop.on_event)(MissionEvent::FailedOver { reason });
        }

        let result = decided.and_then(|decision| {
            if decision.unparseable {
                parse_failures += 1;
            } else {
                parse_failures = 0;
            }
            cycle_loop.act(cycle, decision.intents)
        });

        match result {
            Ok(CycleEnd::Resolved(text)) => {
                stop = MissionStop::Completed;
                summary = Some(text);
                break;
            }
            Ok(CycleEnd::Aborted(tool)) => {
                stop = MissionStop::OperatorDenied { tool };
                break;
            }
            Ok(CycleEnd::Continue) => {
                cycle_errors = 0;
                if parse_failures >= cfg.parse_failure_tolerance {
                    warn!(parse_failures, "parse failure tolerance exhausted");
                    stop = MissionStop::ParseFailures {
                        consecutive: parse_failures,
                    };
                    break;
                }
            }
            Err(err) => {
                cycle_errors += 1;
                warn!(cycle, err = %format!("{err:#}"), cycle_errors, "cycle failed");
                cycle_loop.record(
                    cycle,
                    CYCLE_ERROR_TOOL,
                    Args::new(),
                    format!("{CYCLE_ERROR_TAG} {err:#}"),
                    None,
                );
                if cycle_errors >= cfg.error_tolerance {
                    stop = MissionStop::CycleErrors {
                        consecutive: cycle_errors,
                    };
                    break;
                }
            }
        }
    }

    let status = stop.status();
    let summary = summary.or_else(|| Some(format!("{}: {}", status.as_str(), stop.describe())));
    let failed_over = adapter.failed_over();
    let history = cycle_loop.history.snapshot();
    info!(status = status.as_str(), cycles, steps = history.len(), "mission finished");

    let at = Utc::now();
    let record = AuditRecord::new(objective, status, summary.clone(), history, at);
    let artifacts = write_audit(
        &cfg.audit_dir(),
        &record,
        &ReportMeta {
            mode: mode.as_str().to_string(),
            failed_over,
            cycles,
        },
        at,
    )
    .context("write mission audit")?;

    let lesson = match (status, summary.as_deref()) {
        (MissionStatus::Resolved, Some(text)) => {
            knowledge.record(text, at).context("record lesson")?
        }
        _ => None,
    };

    Ok(MissionOutcome {
        status,
        stop,
        summary,
        history: record.history,
        cycles,
        mode,
        failed_over,
        hash: artifacts.hash,
        audit_path: artifacts.audit_path,
        report_path: artifacts.report_path,
        lesson,
    })
}

/// Per-mission state used while acting on intents.
struct CycleLoop<'m, 'a, F> {
    mode: MissionMode,
    dispatcher: &'m ToolDispatcher<'a>,
    approver: &'a dyn Approver,
    history: History,
    on_event: &'m mut F,
}

impl<F> CycleLoop<'_, '_, F>
where
    F: FnMut(MissionEvent<'_>),
{
    fn record(
        &mut self,
        cycle: u32,
        tool: &str,
        args: Args,
        result: String,
        risk: Option<RiskTier>,
    ) {
        let step = self.history.append(cycle, tool, args, result, risk);
        (self.on_event)(MissionEvent::Step(step));
    }

    /// Process one cycle's intents strictly in order.
    fn act(&mut self, cycle: u32, intents: Vec<Intent>) -> Result<CycleEnd> {
        let mut pending_high_risk: Option<String> = None;

        for intent in intents {
            match intent {
                Intent::Thought { text, risk } => {
                    if requires_risk_confirmation(risk, self.mode) {
                        pending_high_risk = Some(text.clone());
                    }
                    self.record(cycle, THOUGHT_TOOL, Args::new(), text, risk);
                }
                Intent::Completion { summary } => {
                    let mut args = Args::new();
                    args.insert("summary".to_string(), Value::String(summary.clone()));
                    self.record(cycle, COMPLETE_TOOL, args, summary.clone(), None);
                    return Ok(CycleEnd::Resolved(summary));
                }
                Intent::Action(action) => {
                    if let Some(end) = self.act_on(cycle, action, &mut pending_high_risk)? {
                        return Ok(end);
                    }
                }
            }
        }
        Ok(CycleEnd::Continue)
    }

    /// Vet and run one action. Returns `Some` when the mission must end.
    fn act_on(
        &mut self,
        cycle: u32,
        action: ActionRequest,
        pending_high_risk: &mut Option<String>,
    ) -> Result<Option<CycleEnd>> {
        let ActionRequest { tool, args } = action;
        let request = ActionRequest::new(tool.clone(), args.clone());
        let prepared = match self.dispatcher.prepare(&request) {
            Ok(prepared) => prepared,
            Err(result) => {
                self.record(cycle, &tool, args, result, None);
                return Ok(None);
            }
        };

        let verdict = self.dispatcher.evaluate(&prepared);
        if let Verdict::Deny { reason } = &verdict {
            warn!(tool = %tool, reason = %reason, "command denied by safety gate");
            self.record(cycle, &tool, args, denial_text(reason), None);
            return Ok(None);
        }

        let mut operator_approved = false;
        if let Some(rationale) = pending_high_risk.take() {
            let request = ApprovalRequest {
                kind: ApprovalKind::HighRisk { rationale },
                tool: tool.clone(),
                command: prepared.command.clone(),
            };
            if !self.approver.confirm(&request).context("ask operator")? {
                warn!(tool = %tool, "operator denied HIGH-risk action");
                self.record(
                    cycle,
                    &tool,
                    args,
                    format!("{DENIED_TAG} operator denied HIGH-risk action; mission aborted"),
                    Some(RiskTier::High),
                );
                return Ok(Some(CycleEnd::Aborted(tool)));
            }
            operator_approved = true;
        }

        let note = match verdict {
            Verdict::Allow { note } => note,
            Verdict::RequireApproval { reason } => {
                if !operator_approved {
                    let request = ApprovalRequest {
                        kind: ApprovalKind::Destructive {
                            reason: reason.clone(),
                        },
                        tool: tool.clone(),
                        command: prepared.command.clone(),
                    };
                    if !self.approver.confirm(&request).context("ask operator")? {
                        self.record(
                            cycle,
                            &tool,
                            args,
                            denial_text(&format!("operator declined: {reason}")),
                            None,
                        );
                        return Ok(None);
                    }
                }
                None
            }
            Verdict::Deny { .. } => return Ok(None),
        };

        let mut result = self.dispatcher.execute(&prepared);
        if let Some(note) = note {
            result.push_str(&format!("\n[{note}]"));
        }
        // The HIGH tier that gated this action stays on its record.
        let risk = operator_approved.then_some(RiskTier::High);
        self.record(cycle, &tool, args, result, risk);
        Ok(None)
    }
}
