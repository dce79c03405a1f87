//! Deterministic test doubles for the mission's collaborators.
//!
//! Each double is scripted up front and records what it was asked, so tests
//! can assert both outcomes and the calls that led to them.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;

use crate::adapter::Sleeper;
use crate::io::approval::{ApprovalRequest, Approver};
use crate::io::backend::{BackendError, ReasoningBackend};
use crate::io::config::MissionConfig;
use crate::io::transport::{Transport, TransportError, TransportOutput};

/// Backend answering from a fixed list of responses. Clones share state, so
/// a test can keep a handle after boxing one into the adapter.
#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    responses: Rc<RefCell<VecDeque<Result<String, BackendError>>>>,
    prompts: Rc<RefCell<Vec<String>>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<String, BackendError>>) -> Self {
        Self {
            responses: Rc::new(RefCell::new(responses.into())),
            prompts: Rc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ReasoningBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn complete(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Other("script exhausted".to_string())))
    }
}

/// Transport that records every command. Scripted outputs are returned in
/// order; once they run out every command succeeds with empty output.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    outputs: RefCell<VecDeque<Result<TransportOutput, TransportError>>>,
    commands: RefCell<Vec<String>>,
}

impl RecordingTransport {
    pub fn new(outputs: Vec<Result<TransportOutput, TransportError>>) -> Self {
        Self {
            outputs: RefCell::new(outputs.into()),
            commands: RefCell::default(),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl Transport for RecordingTransport {
    fn execute(&self, command: &str, _timeout: Duration) -> Result<TransportOutput, TransportError> {
        self.commands.borrow_mut().push(command.to_string());
        self.outputs
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportOutput::success("")))
    }
}

/// Approver answering from a fixed list of decisions, denying once the list
/// is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedApprover {
    answers: RefCell<VecDeque<bool>>,
    requests: RefCell<Vec<ApprovalRequest>>,
}

impl ScriptedApprover {
    pub fn new(answers: Vec<bool>) -> Self {
        Self {
            answers: RefCell::new(answers.into()),
            requests: RefCell::default(),
        }
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.borrow().clone()
    }
}

impl Approver for ScriptedApprover {
    fn confirm(&self, request: &ApprovalRequest) -> Result<bool> {
        self.requests.borrow_mut().push(request.clone());
        Ok(self.answers.borrow_mut().pop_front().unwrap_or(false))
    }
}

/// Sleeper that records requested delays instead of blocking.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Simulation-mode config rooted in a fresh temp directory.
///
/// Keep the returned guard alive for as long as the state directory is used.
pub fn simulation_config() -> (tempfile::TempDir, MissionConfig) {
    let temp = tempfile::tempdir().expect("tempdir");
    let cfg = MissionConfig {
        simulation: true,
        state_dir: temp.path().join(".mender"),
        ..MissionConfig::default()
    };
    (temp, cfg)
}
