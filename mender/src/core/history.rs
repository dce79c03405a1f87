//! Append-only mission history.

use crate::core::types::{Args, RiskTier, StepRecord};

/// Ordered, append-only sequence of step records.
///
/// Step indices are assigned here and nowhere else, so they always start at 1
/// and increase by one per append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    steps: Vec<StepRecord>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step and return the stored record.
    pub fn append(
        &mut self,
        cycle: u32,
        tool: impl Into<String>,
        args: Args,
        result: impl Into<String>,
        risk: Option<RiskTier>,
    ) -> &StepRecord {
        let step = self.steps.len() as u32 + 1;
        self.steps.push(StepRecord {
            step,
            cycle,
            tool: tool.into(),
            args,
            result: result.into(),
            risk,
        });
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The last `window` steps, used to bound the backend context.
    pub fn recent(&self, window: usize) -> &[StepRecord] {
        let start = self.steps.len().saturating_sub(window);
        &self.steps[start..]
    }

    /// Snapshot of the full sequence for audit.
    pub fn snapshot(&self) -> Vec<StepRecord> {
        self.steps.clone()
    }
}
