//! Autonomous remediation agent.
//!
//! Runs missions against a target host (`mender run`), and inspects the
//! records they leave behind in the state directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;

use mender::adapter::ThreadSleeper;
use mender::core::catalog::ToolCatalog;
use mender::core::simulation::SimulationBackend;
use mender::core::types::MissionStatus;
use mender::exit_codes;
use mender::io::approval::ConsoleApprover;
use mender::io::audit::verify_audit;
use mender::io::backend::backend_from_config;
use mender::io::config::{DEFAULT_CONFIG_PATH, MissionConfig, load_config, write_config};
use mender::io::knowledge::KnowledgeStore;
use mender::io::transport::{ShellTransport, SimulatedTransport, Transport};
use mender::logging;
use mender::mission::{MissionDeps, MissionEvent, MissionOutcome, run_mission};

#[derive(Parser)]
#[command(
    name = "mender",
    version,
    about = "Autonomous remediation agent with a safety-gated decision loop"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one mission toward a natural-language objective.
    Run {
        objective: String,
        /// Use scripted fixtures instead of a live backend and target.
        #[arg(long)]
        simulate: bool,
        /// Override the configured cycle budget.
        #[arg(long)]
        max_cycles: Option<u32>,
        /// Override the configured transport target.
        #[arg(long)]
        target: Option<String>,
    },
    /// Print the tool catalog as JSON.
    Tools,
    /// Print lessons recorded by previous missions.
    Lessons,
    /// Check an audit file's hash and history.
    Verify {
        audit: PathBuf,
        /// Expected SHA-256 hex digest.
        #[arg(long)]
        expect: Option<String>,
    },
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            objective,
            simulate,
            max_cycles,
            target,
        } => {
            let mut cfg = load_config(&cli.config)?;
            cfg.simulation |= simulate;
            if let Some(max_cycles) = max_cycles {
                cfg.max_cycles = max_cycles;
            }
            if let Some(target) = target {
                cfg.target = target;
            }
            cfg.validate()?;
            cmd_run(&objective, &cfg)
        }
        Command::Tools => cmd_tools(),
        Command::Lessons => cmd_lessons(&load_config(&cli.config)?),
        Command::Verify { audit, expect } => cmd_verify(&audit, expect.as_deref()),
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_run(objective: &str, cfg: &MissionConfig) -> Result<i32> {
    let transport: Box<dyn Transport> = if cfg.simulation {
        Box::new(SimulatedTransport)
    } else {
        Box::new(ShellTransport::new(cfg.transport.kind, cfg.target.clone()))
    };
    let live = if cfg.simulation {
        None
    } else {
        // A backend that cannot be built counts as no live backend; the
        // adapter then fails over to simulation on the first decision.
        backend_from_config(&cfg.backend).unwrap_or_else(|err| {
            warn!(error = %format!("{err:#}"), "live backend unavailable");
            None
        })
    };
    let simulation = match &cfg.simulation_script.path {
        Some(path) => load_simulation_script(path)?,
        None => SimulationBackend::default(),
    };

    let approver = ConsoleApprover;
    let sleeper = ThreadSleeper;
    let deps = MissionDeps {
        live,
        simulation,
        transport: transport.as_ref(),
        approver: &approver,
        sleeper: &sleeper,
    };

    let outcome = run_mission(objective, cfg, deps, print_event)?;
    print_outcome(&outcome);
    Ok(exit_code(outcome.status))
}

fn load_simulation_script(path: &Path) -> Result<SimulationBackend> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    SimulationBackend::from_toml(&raw).with_context(|| format!("load {}", path.display()))
}

fn print_event(event: MissionEvent<'_>) {
    match event {
        MissionEvent::CycleStarted { cycle, max_cycles } => {
            println!("== cycle {cycle}/{max_cycles} ==");
        }
        MissionEvent::FailedOver { reason } => {
            println!("! live backend unavailable ({reason}); continuing in simulation");
        }
        MissionEvent::Step(step) => {
            let first = step.result.lines().next().unwrap_or_default();
            match step.risk {
                Some(risk) => println!("  {}. {} [{risk}] {first}", step.step, step.tool),
                None => println!("  {}. {} {first}", step.step, step.tool),
            }
        }
    }
}

fn print_outcome(outcome: &MissionOutcome) {
    println!("status: {}", outcome.status.as_str());
    if let Some(summary) = &outcome.summary {
        println!("summary: {summary}");
    }
    println!("audit: {}", outcome.audit_path.display());
    println!("report: {}", outcome.report_path.display());
    println!("sha256: {}", outcome.hash);
    if let Some(lesson) = &outcome.lesson {
        println!("lesson: {}", lesson.lesson);
    }
}

fn exit_code(status: MissionStatus) -> i32 {
    match status {
        MissionStatus::Resolved => exit_codes::OK,
        MissionStatus::Halted => exit_codes::HALTED,
        MissionStatus::Aborted => exit_codes::ABORTED,
    }
}

fn cmd_tools() -> Result<i32> {
    let wire = ToolCatalog::default().to_wire();
    println!(
        "{}",
        serde_json::to_string_pretty(&wire).context("serialize tool catalog")?
    );
    Ok(exit_codes::OK)
}

fn cmd_lessons(cfg: &MissionConfig) -> Result<i32> {
    let store = KnowledgeStore::load(&cfg.knowledge_path(), cfg.knowledge.max_lessons)?;
    if store.lessons().is_empty() {
        println!("No lessons recorded.");
    }
    for line in store.context_lines() {
        println!("{line}");
    }
    Ok(exit_codes::OK)
}

fn cmd_verify(audit: &Path, expect: Option<&str>) -> Result<i32> {
    let verification = verify_audit(audit, expect)?;
    println!(
        "ok: {} ({} steps, {})",
        verification.record.status.as_str(),
        verification.record.history.len(),
        verification.hash
    );
    Ok(exit_codes::OK)
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &MissionConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["mender", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "mender",
            "run",
            "--simulate",
            "--max-cycles",
            "4",
            "--config",
            "ops.toml",
            "restart nginx",
        ]);
        assert_eq!(cli.config, PathBuf::from("ops.toml"));
        match cli.command {
            Command::Run {
                objective,
                simulate,
                max_cycles,
                target,
            } => {
                assert_eq!(objective, "restart nginx");
                assert!(simulate);
                assert_eq!(max_cycles, Some(4));
                assert_eq!(target, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn exit_codes_follow_status() {
        assert_eq!(exit_code(MissionStatus::Resolved), exit_codes::OK);
        assert_eq!(exit_code(MissionStatus::Halted), exit_codes::HALTED);
        assert_eq!(exit_code(MissionStatus::Aborted), exit_codes::ABORTED);
    }
}
