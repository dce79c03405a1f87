//! Reasoning backend adapter.
//!
//! Wraps an optional live backend and the deterministic simulation backend
//! behind one `decide` call. Retryable live failures are retried under the
//! injected [`RetryPolicy`]; once retries are exhausted (or no live backend is
//! configured) the adapter fails over to simulation for the rest of the
//! mission. Failover is one-way: the live backend is dropped and never
//! consulted again.

use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::catalog::ToolCatalog;
use crate::core::context::MissionContext;
use crate::core::parser::parse_response;
use crate::core::platform::Platform;
use crate::core::retry::RetryPolicy;
use crate::core::simulation::SimulationBackend;
use crate::core::types::{Intent, MissionMode};
use crate::io::backend::{BackendError, ReasoningBackend};
use crate::io::prompt::render_mission_prompt;

/// Blocking wait between retries; injected so tests never sleep.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Live,
    Simulation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub intents: Vec<Intent>,
    /// The live response contained nothing structured.
    pub unparseable: bool,
    pub source: DecisionSource,
}

/// What the live prompt is rendered from, fixed for the mission.
#[derive(Debug, Clone)]
pub struct PromptSetup {
    pub catalog: ToolCatalog,
    pub platform: Platform,
    pub mode: MissionMode,
}

impl Default for PromptSetup {
    fn default() -> Self {
        Self {
            catalog: ToolCatalog::default(),
            platform: Platform::default(),
            mode: MissionMode::Live,
        }
    }
}

pub struct ReasoningAdapter<'a> {
    live: Option<Box<dyn ReasoningBackend + 'a>>,
    simulation: SimulationBackend,
    retry: RetryPolicy,
    sleeper: &'a dyn Sleeper,
    setup: PromptSetup,
    failover_reason: Option<String>,
}

impl<'a> ReasoningAdapter<'a> {
    /// In simulation mode the live backend is discarded up front, so no call
    /// can ever reach it.
    pub fn new(
        live: Option<Box<dyn ReasoningBackend + 'a>>,
        simulation: SimulationBackend,
        retry: RetryPolicy,
        sleeper: &'a dyn Sleeper,
        setup: PromptSetup,
    ) -> Self {
        let live = if setup.mode.is_simulation() { None } else { live };
        Self {
            live,
            simulation,
            retry,
            sleeper,
            setup,
            failover_reason: None,
        }
    }

    /// True once the adapter has permanently switched to simulation.
    pub fn failed_over(&self) -> bool {
        self.failover_reason.is_some()
    }

    pub fn failover_reason(&self) -> Option<&str> {
        self.failover_reason.as_deref()
    }

    #[instrument(skip_all, fields(cycle = ctx.cycle))]
    pub fn decide(&mut self, ctx: &MissionContext) -> Result<Decision> {
        if let Some(live) = self.live.as_deref() {
            let prompt =
                render_mission_prompt(ctx, &self.setup.catalog, self.setup.platform, self.setup.mode)?;
            match call_with_retry(live, &prompt, &self.retry, self.sleeper) {
                Ok(raw) => {
                    let parsed = parse_response(&raw);
                    debug!(intents = parsed.intents.len(), unparseable = parsed.unparseable, "live decision");
                    return Ok(Decision {
                        intents: parsed.intents,
                        unparseable: parsed.unparseable,
                        source: DecisionSource::Live,
                    });
                }
                Err(err) if err.is_retryable() => {
                    self.fail_over(format!("retries exhausted: {err}"));
                }
                Err(err) => return Err(anyhow!(err).context("reasoning backend failed")),
            }
        } else if !self.setup.mode.is_simulation() && !self.failed_over() {
            self.fail_over("no live backend configured".to_string());
        }

        let intents = self.simulation.respond(&ctx.observation());
        debug!(intents = intents.len(), "simulation decision");
        Ok(Decision {
            intents,
            unparseable: false,
            source: DecisionSource::Simulation,
        })
    }

    fn fail_over(&mut self, reason: String) {
        warn!(reason = %reason, "failing over to simulation backend for the rest of the mission");
        self.live = None;
        self.failover_reason = Some(reason);
    }
}

/// Call `backend`, retrying retryable failures with the policy's backoff.
fn call_with_retry(
    backend: &dyn ReasoningBackend,
    prompt: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
) -> Result<String, BackendError> {
    let mut attempt = 0;
    loop {
        match backend.complete(prompt) {
            Ok(raw) => {
                if attempt > 0 {
                    info!(attempt, backend = backend.name(), "backend recovered after retries");
                }
                return Ok(raw);
            }
            Err(err) if err.is_retryable() && policy.should_retry(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    err = %err,
                    "backend call failed, backing off"
                );
                sleeper.sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingSleeper, ScriptedBackend};
    use serde_json::json;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn ctx() -> MissionContext {
        MissionContext::new("find the process using the most memory", 1, Vec::new(), &[])
    }

    fn rate_limited() -> Result<String, BackendError> {
        Err(BackendError::RateLimited("429".to_string()))
    }

    #[test]
    fn backs_off_and_recovers_without_failing_over() {
        let backend = ScriptedBackend::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok(r#"{"tool": "list_processes", "args": {}}"#.to_string()),
        ]);
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            Some(Box::new(backend.clone())),
            SimulationBackend::default(),
            RetryPolicy::new(10, ms(100), ms(10_000)),
            &sleeper,
            PromptSetup::default(),
        );

        let decision = adapter.decide(&ctx()).expect("decide");
        assert_eq!(decision.source, DecisionSource::Live);
        assert_eq!(decision.intents, vec![Intent::action("list_processes", json!({}))]);
        assert_eq!(sleeper.delays(), vec![ms(100), ms(200), ms(400)]);
        assert_eq!(backend.calls(), 4);
        assert!(!adapter.failed_over());
    }

    #[test]
    fn exhausted_retries_fail_over_permanently() {
        let backend = ScriptedBackend::new(vec![
            rate_limited(),
            rate_limited(),
            rate_limited(),
            Ok(r#"{"tool": "get_net_stats"}"#.to_string()),
        ]);
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            Some(Box::new(backend.clone())),
            SimulationBackend::default(),
            RetryPolicy::new(3, ms(100), ms(10_000)),
            &sleeper,
            PromptSetup::default(),
        );

        let first = adapter.decide(&ctx()).expect("decide");
        assert_eq!(first.source, DecisionSource::Simulation);
        assert!(adapter.failed_over());
        assert!(adapter.failover_reason().unwrap_or_default().contains("retries exhausted"));
        assert_eq!(backend.calls(), 3);
        assert_eq!(sleeper.delays(), vec![ms(100), ms(200)]);

        let second = adapter.decide(&ctx()).expect("decide");
        assert_eq!(second.source, DecisionSource::Simulation);
        assert_eq!(backend.calls(), 3, "live backend must not be consulted after failover");
    }

    #[test]
    fn non_retryable_errors_surface_without_failover() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Other("bad key".to_string()))]);
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            Some(Box::new(backend.clone())),
            SimulationBackend::default(),
            RetryPolicy::default(),
            &sleeper,
            PromptSetup::default(),
        );
        let err = adapter.decide(&ctx()).unwrap_err();
        assert!(format!("{err:#}").contains("bad key"));
        assert!(!adapter.failed_over());
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn simulation_mode_never_calls_the_live_backend() {
        let backend = ScriptedBackend::new(vec![Ok("{}".to_string())]);
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            Some(Box::new(backend.clone())),
            SimulationBackend::default(),
            RetryPolicy::default(),
            &sleeper,
            PromptSetup {
                mode: MissionMode::Simulation,
                ..PromptSetup::default()
            },
        );
        let decision = adapter.decide(&ctx()).expect("decide");
        assert_eq!(decision.source, DecisionSource::Simulation);
        assert_eq!(decision.intents, vec![Intent::action("list_processes", json!({}))]);
        assert_eq!(backend.calls(), 0);
        assert!(!adapter.failed_over());
    }

    #[test]
    fn missing_live_backend_fails_over_in_live_mode() {
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            None,
            SimulationBackend::default(),
            RetryPolicy::default(),
            &sleeper,
            PromptSetup::default(),
        );
        let decision = adapter.decide(&ctx()).expect("decide");
        assert_eq!(decision.source, DecisionSource::Simulation);
        assert_eq!(adapter.failover_reason(), Some("no live backend configured"));
    }

    #[test]
    fn unparseable_live_output_is_flagged() {
        let backend = ScriptedBackend::new(vec![Ok("I am not sure what to do.".to_string())]);
        let sleeper = RecordingSleeper::default();
        let mut adapter = ReasoningAdapter::new(
            Some(Box::new(backend)),
            SimulationBackend::default(),
            RetryPolicy::default(),
            &sleeper,
            PromptSetup::default(),
        );
        let decision = adapter.decide(&ctx()).expect("decide");
        assert!(decision.unparseable);
        assert_eq!(decision.source, DecisionSource::Live);
    }
}
