//! History invariants checked when replaying audit artifacts.

use crate::core::types::StepRecord;

/// Check invariants of a recorded history:
/// - step indices start at 1 and increase by exactly one
/// - cycle numbers never decrease
/// - tool names are non-empty
pub fn validate_history(steps: &[StepRecord]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut last_cycle = 0u32;

    for (pos, record) in steps.iter().enumerate() {
        let expected = pos as u32 + 1;
        if record.step != expected {
            errors.push(format!(
                "step {}: expected index {expected} at position {pos}",
                record.step
            ));
        }
        if record.cycle < last_cycle {
            errors.push(format!(
                "step {}: cycle {} precedes previous cycle {last_cycle}",
                record.step, record.cycle
            ));
        }
        last_cycle = last_cycle.max(record.cycle);
        if record.tool.trim().is_empty() {
            errors.push(format!("step {}: empty tool name", record.step));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Args;

    fn record(step: u32, cycle: u32, tool: &str) -> StepRecord {
        StepRecord {
            step,
            cycle,
            tool: tool.to_string(),
            args: Args::new(),
            result: String::new(),
            risk: None,
        }
    }

    #[test]
    fn accepts_well_formed_history() {
        let steps = vec![
            record(1, 1, "list_processes"),
            record(2, 1, "kill_process"),
            record(3, 2, "mission_complete"),
        ];
        assert!(validate_history(&steps).is_empty());
    }

    #[test]
    fn reports_gaps_regressions_and_empty_tools() {
        let steps = vec![record(1, 2, "a"), record(3, 1, " ")];
        let errors = validate_history(&steps);
        assert!(errors.iter().any(|e| e.contains("expected index 2")));
        assert!(errors.iter().any(|e| e.contains("precedes previous cycle")));
        assert!(errors.iter().any(|e| e.contains("empty tool name")));
    }
}
