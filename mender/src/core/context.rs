//! Cycle context assembled during OBSERVE/ORIENT.

use crate::core::types::StepRecord;

pub const NO_ACTIONS_TEXT: &str = "No actions yet.";

/// Objective, lessons and the bounded history suffix for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionContext {
    pub objective: String,
    pub cycle: u32,
    pub lessons: Vec<String>,
    pub recent: Vec<StepRecord>,
}

impl MissionContext {
    pub fn new(
        objective: impl Into<String>,
        cycle: u32,
        lessons: Vec<String>,
        recent: &[StepRecord],
    ) -> Self {
        Self {
            objective: objective.into(),
            cycle,
            lessons,
            recent: recent.to_vec(),
        }
    }

    /// One line per recent step, or [`NO_ACTIONS_TEXT`].
    pub fn history_text(&self) -> String {
        if self.recent.is_empty() {
            return NO_ACTIONS_TEXT.to_string();
        }
        self.recent
            .iter()
            .map(format_step)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Objective and recent history. Lessons are left out so that scripted
    /// scenarios are not steered by earlier missions.
    pub fn observation(&self) -> String {
        format!("Objective: {}\n{}", self.objective, self.history_text())
    }

    /// Full situation handed to live backends.
    pub fn situation(&self) -> String {
        let mut out = format!("Objective: {}\n", self.objective);
        if !self.lessons.is_empty() {
            out.push_str("Lessons from previous missions:\n");
            for lesson in &self.lessons {
                out.push_str("- ");
                out.push_str(lesson);
                out.push('\n');
            }
        }
        out.push_str(&format!("Cycle: {}\nRecent history:\n", self.cycle));
        out.push_str(&self.history_text());
        out
    }
}

fn format_step(step: &StepRecord) -> String {
    let args = serde_json::to_string(&step.args).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Step {}: Action={}({}) Result={}",
        step.step, step.tool, args, step.result
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::history::History;
    use serde_json::json;

    #[test]
    fn empty_history_reads_no_actions_yet() {
        let ctx = MissionContext::new("find memory hog", 1, Vec::new(), &[]);
        assert_eq!(ctx.observation(), "Objective: find memory hog\nNo actions yet.");
        assert!(!ctx.situation().contains("Lessons"));
    }

    #[test]
    fn steps_render_with_action_and_result() {
        let mut history = History::new();
        let args = json!({"pid": 7}).as_object().cloned().unwrap_or_default();
        history.append(1, "kill_process", args, "ok", None);
        let ctx = MissionContext::new(
            "stop it",
            2,
            vec!["2026-01-01: nginx needed a restart".to_string()],
            history.recent(5),
        );
        assert_eq!(ctx.history_text(), "Step 1: Action=kill_process({\"pid\":7}) Result=ok");
        assert!(ctx.situation().contains("- 2026-01-01: nginx needed a restart"));
        assert!(!ctx.observation().contains("nginx"));
    }
}
