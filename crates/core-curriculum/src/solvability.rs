//! Checks that every lesson's bundled solution actually satisfies its own
//! validator — the Rust counterpart of `tools/validate_curriculum.py` /
//! `tools/test_curriculum_solvability.py` (§9 supplemented tooling).
//!
//! Runs in-process rather than through the Executor's spawn-and-sandbox
//! path: this is trusted maintainer tooling over bundled reference
//! solutions, not untrusted learner submissions, so there is nothing here
//! for the Resource Guardian to police.

use core_executor::run_validator;
use core_guardian::{ExecutionHooks, GuardianError};
use core_interp::{Interpreter, RestrictedEnvironment};
use core_lang::compile;
use uuid::Uuid;

use crate::LessonOrdering;

#[derive(Debug, Clone)]
pub struct SolvabilityReport {
    pub uuid: Uuid,
    pub title: String,
    pub solvable: bool,
    pub detail: String,
}

struct NullHooks;
impl ExecutionHooks for NullHooks {
    fn on_operation(&mut self) -> Result<(), GuardianError> {
        Ok(())
    }
    fn on_call_depth(&mut self, _depth: u32) -> Result<(), GuardianError> {
        Ok(())
    }
}

pub fn check_all(ordering: &LessonOrdering) -> Vec<SolvabilityReport> {
    ordering.all().iter().map(check_one).collect()
}

fn check_one(lesson: &crate::Lesson) -> SolvabilityReport {
    let report = |solvable: bool, detail: String| SolvabilityReport {
        uuid: lesson.uuid,
        title: lesson.title.clone(),
        solvable,
        detail,
    };

    let Some(solution) = &lesson.solution else {
        return report(false, "lesson has no bundled solution.lang".to_string());
    };

    let program = match compile(solution) {
        Ok(p) => p,
        Err(e) => return report(false, format!("solution failed to parse: {e}")),
    };

    let validator_source = match std::fs::read_to_string(&lesson.validator.path) {
        Ok(s) => s,
        Err(e) => return report(false, format!("validator script missing: {e}")),
    };

    let scope = RestrictedEnvironment::bindings(None);
    let mut hooks = NullHooks;
    let stdout = match Interpreter::exec(&program, &scope, &mut hooks, None) {
        Ok(stdout) => stdout,
        Err(e) => return report(false, format!("solution raised: {e}")),
    };

    match run_validator(&validator_source, &scope, &stdout) {
        Ok(verdict) if verdict.passed => report(true, "solution passes its own validator".to_string()),
        Ok(verdict) => report(false, verdict.message.unwrap_or_else(|| "validator rejected the solution".to_string())),
        Err(e) => report(false, format!("validator error: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CurriculumProvider};
    use std::fs;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn a_correct_solution_is_reported_solvable() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("manifest.json"), r#"{"chapters": ["01"]}"#);
        write(
            &dir.path().join("01/010/task.json"),
            r#"{"uuid": "33333333-3333-3333-3333-333333333333", "title": "Add"}"#,
        );
        write(&dir.path().join("01/010/validation.lang"), "passed = result == 4\n");
        write(&dir.path().join("01/010/solution.lang"), "result = 2 + 2\n");

        let ordering = CurriculumProvider::load(dir.path()).unwrap();
        let reports = check_all(&ordering);
        assert_eq!(reports.len(), 1);
        assert!(reports[0].solvable);
    }

    #[test]
    fn a_broken_solution_is_reported_unsolvable() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("manifest.json"), r#"{"chapters": ["01"]}"#);
        write(
            &dir.path().join("01/010/task.json"),
            r#"{"uuid": "44444444-4444-4444-4444-444444444444", "title": "Add"}"#,
        );
        write(&dir.path().join("01/010/validation.lang"), "passed = result == 4\n");
        write(&dir.path().join("01/010/solution.lang"), "result = 5\n");

        let ordering = CurriculumProvider::load(dir.path()).unwrap();
        let reports = check_all(&ordering);
        assert!(!reports[0].solvable);
    }
}
