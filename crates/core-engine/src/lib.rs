//! Simulation Engine (§4.7): the deterministic state machine translating UI
//! inputs into UI actions. Grounded in `engine.py::LearningEngine`'s
//! `get_next_action`/`process_user_input` pair, restructured the way
//! `core-actions`' dispatcher separates "what changed" (`Input`) from "what
//! to render" (`Action`) — this crate performs no terminal I/O of its own,
//! matching `core-actions`' separation from `core-terminal`.

use uuid::Uuid;

use core_curriculum::{Lesson, LessonOrdering};
use core_executor::{Executor, Outcome};
use core_guardian::ResourceBudget;
use core_progress::{Progress, ProgressStore};

/// Status of the lesson currently shown to the learner (§4.7 `RenderEditor`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Skipped,
}

/// The kind of message being shown, carried alongside `ShowMessage` so the
/// UI can style it (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Success,
    Error,
    Info,
    Solution,
    Reset,
}

/// Everything the engine asks the UI to render. Implementation-agnostic by
/// design (§4.7) — the UI collaborator owns every pixel/character; the
/// engine only describes intent.
#[derive(Debug, Clone)]
pub enum Action {
    RenderEditor {
        uuid: Uuid,
        title: String,
        description: String,
        hint: String,
        initial_code: String,
        status: TaskStatus,
        completed_count: usize,
        skipped_count: usize,
    },
    RenderCelebration {
        completed_count: usize,
        skipped_count: usize,
        has_skipped: bool,
    },
    ShowMessage {
        title: String,
        body: String,
        kind: MessageKind,
        wait_for_ack: bool,
    },
    CustomView(String),
    Exit(i32),
}

/// Commands the UI feeds back in (§4.7 "Input commands"). `Skip` is the
/// empty/null input; `Code` is anything else, treated as source for the
/// current lesson.
#[derive(Debug, Clone)]
pub enum Input {
    ResetAll,
    DevMessage,
    PrevTask,
    NextTask,
    GotoFirstSkipped,
    ShowSolution,
    Skip,
    Code(String),
}

/// Whether the learner is looking at a lesson or has run off the end of the
/// ordering (§4.7 `next_action`: "if none, emit Celebration").
enum Cursor<'a> {
    Lesson(&'a Lesson),
    Overflow,
}

pub struct SimulationEngine {
    ordering: LessonOrdering,
    progress: Progress,
    store: ProgressStore,
    executor: Executor,
    budget: ResourceBudget,
    on_celebration: bool,
}

impl SimulationEngine {
    /// Loads progress, sanitizes it against `ordering` (§4.6 invariant: an
    /// unknown `current_uuid` resets to the first lesson), and is ready to
    /// drive a UI loop.
    pub fn new(ordering: LessonOrdering, store: ProgressStore, executor: Executor) -> Self {
        let mut progress = store.load();
        progress.sanitize(&ordering);
        Self {
            ordering,
            progress,
            store,
            executor,
            budget: ResourceBudget::default(),
            on_celebration: false,
        }
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = budget;
        self
    }

    fn cursor(&self) -> Cursor<'_> {
        if self.on_celebration {
            return Cursor::Overflow;
        }
        match self.progress.current_uuid {
            Some(uuid) => match self.ordering.by_uuid(uuid) {
                Some(lesson) => Cursor::Lesson(lesson),
                None => match self.ordering.first() {
                    Some(lesson) => Cursor::Lesson(lesson),
                    None => Cursor::Overflow,
                },
            },
            None => match self.ordering.first() {
                Some(lesson) => Cursor::Lesson(lesson),
                None => Cursor::Overflow,
            },
        }
    }

    fn status_of(&self, lesson: &Lesson) -> TaskStatus {
        if self.progress.completed_tasks.contains(&lesson.uuid) {
            TaskStatus::Completed
        } else if self.progress.skipped_tasks.contains(&lesson.uuid) {
            TaskStatus::Skipped
        } else {
            TaskStatus::Pending
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.progress) {
            tracing::warn!(target: "engine", error = %e, "failed to persist progress");
        }
    }

    /// What to show right now, with no side effects (§4.7).
    pub fn next_action(&self) -> Action {
        match self.cursor() {
            Cursor::Overflow => Action::RenderCelebration {
                completed_count: self.progress.completed_tasks.len(),
                skipped_count: self.progress.skipped_tasks.len(),
                has_skipped: !self.progress.skipped_tasks.is_empty(),
            },
            Cursor::Lesson(lesson) => Action::RenderEditor {
                uuid: lesson.uuid,
                title: lesson.title.clone(),
                description: lesson.description.clone(),
                hint: lesson.hint.clone(),
                initial_code: self
                    .progress
                    .user_code
                    .get(&lesson.uuid)
                    .cloned()
                    .unwrap_or_default(),
                status: self.status_of(lesson),
                completed_count: self.progress.completed_tasks.len(),
                skipped_count: self.progress.skipped_tasks.len(),
            },
        }
    }

    /// Applies one input, mutating `Progress` and persisting synchronously
    /// on every mutating transition, then returns the action to show next
    /// (§4.7 transition table).
    pub fn process_input(&mut self, input: Input) -> Action {
        match input {
            Input::ResetAll => {
                self.progress = Progress::default();
                self.on_celebration = false;
                self.persist();
                Action::ShowMessage {
                    title: "Progress reset".to_string(),
                    body: "All progress has been cleared.".to_string(),
                    kind: MessageKind::Reset,
                    wait_for_ack: false,
                }
            }
            Input::DevMessage => Action::CustomView("dev_message".to_string()),
            Input::PrevTask => {
                if let Cursor::Lesson(lesson) = self.cursor() {
                    if let Some(prev) = self.ordering.prev(lesson.uuid) {
                        self.progress.current_uuid = Some(prev.uuid);
                        self.persist();
                    }
                }
                self.next_action()
            }
            Input::NextTask => {
                if let Cursor::Lesson(lesson) = self.cursor() {
                    if let Some(next) = self.ordering.next(lesson.uuid) {
                        let current_done = self.progress.completed_tasks.contains(&lesson.uuid)
                            || self.progress.skipped_tasks.contains(&lesson.uuid);
                        let next_done = self.progress.completed_tasks.contains(&next.uuid)
                            || self.progress.skipped_tasks.contains(&next.uuid);
                        if current_done || next_done {
                            self.progress.current_uuid = Some(next.uuid);
                            self.persist();
                        }
                    }
                }
                self.next_action()
            }
            Input::GotoFirstSkipped => {
                if let Some(lesson) = self.ordering.first_skipped(&self.progress.skipped_tasks) {
                    self.progress.current_uuid = Some(lesson.uuid);
                    self.persist();
                }
                self.next_action()
            }
            Input::ShowSolution => match self.cursor() {
                Cursor::Lesson(lesson) => Action::ShowMessage {
                    title: "Solution".to_string(),
                    body: lesson
                        .solution
                        .clone()
                        .unwrap_or_else(|| "No bundled solution for this lesson.".to_string()),
                    kind: MessageKind::Solution,
                    wait_for_ack: true,
                },
                Cursor::Overflow => self.next_action(),
            },
            Input::Skip => self.process_skip(),
            Input::Code(source) => self.process_code(source),
        }
    }

    fn process_skip(&mut self) -> Action {
        match self.cursor() {
            Cursor::Overflow => {
                self.on_celebration = false;
                Action::Exit(0)
            }
            Cursor::Lesson(lesson) => {
                let uuid = lesson.uuid;
                let solution = lesson
                    .solution
                    .clone()
                    .unwrap_or_else(|| "No bundled solution for this lesson.".to_string());
                if !self.progress.completed_tasks.contains(&uuid) {
                    self.progress.mark_skipped(uuid);
                    if let Some(next) = self.ordering.next(uuid) {
                        self.progress.current_uuid = Some(next.uuid);
                    } else {
                        self.on_celebration = true;
                    }
                    self.persist();
                }
                Action::ShowMessage {
                    title: "Skipped".to_string(),
                    body: solution,
                    kind: MessageKind::Info,
                    wait_for_ack: true,
                }
            }
        }
    }

    fn process_code(&mut self, source: String) -> Action {
        let lesson = match self.cursor() {
            Cursor::Lesson(lesson) => lesson,
            Cursor::Overflow => return self.next_action(),
        };
        let uuid = lesson.uuid;
        let validator = lesson.validator.clone();

        self.progress.user_code.insert(uuid, source.clone());
        self.persist();

        let result = match self.executor.run(&source, &validator, self.budget, false) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(target: "engine", error = %e, "executor failed to produce a result");
                return Action::ShowMessage {
                    title: "Execution failed".to_string(),
                    body: format!("{e}"),
                    kind: MessageKind::Error,
                    wait_for_ack: true,
                };
            }
        };

        if result.outcome != Outcome::Success {
            return Action::ShowMessage {
                title: "Not quite".to_string(),
                body: result
                    .diagnostic
                    .unwrap_or_else(|| "Execution did not complete.".to_string()),
                kind: MessageKind::Error,
                wait_for_ack: true,
            };
        }

        if result.passed() {
            self.progress.mark_completed(uuid);
            if let Some(next) = self.ordering.next(uuid) {
                self.progress.current_uuid = Some(next.uuid);
            } else {
                self.on_celebration = true;
            }
            self.persist();
            Action::ShowMessage {
                title: "Correct".to_string(),
                body: result
                    .validator
                    .and_then(|v| v.message)
                    .unwrap_or_else(|| "Well done.".to_string()),
                kind: MessageKind::Success,
                wait_for_ack: false,
            }
        } else {
            Action::ShowMessage {
                title: "Not quite".to_string(),
                body: result
                    .validator
                    .and_then(|v| v.message)
                    .unwrap_or_else(|| "That didn't satisfy this lesson's check.".to_string()),
                kind: MessageKind::Error,
                wait_for_ack: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn build_curriculum(root: &Path) {
        write(&root.join("manifest.json"), r#"{"chapters": ["01"]}"#);
        write(
            &root.join("01/010/task.json"),
            r#"{"uuid": "11111111-1111-1111-1111-111111111111", "title": "Hello"}"#,
        );
        write(&root.join("01/010/validation.lang"), "passed = result == 4\n");
        write(&root.join("01/010/solution.lang"), "result = 2 + 2\n");
        write(
            &root.join("01/020/task.json"),
            r#"{"uuid": "22222222-2222-2222-2222-222222222222", "title": "Second"}"#,
        );
        write(&root.join("01/020/validation.lang"), "passed = True\n");
    }

    fn build_engine(curriculum_root: &Path, progress_path: &Path) -> SimulationEngine {
        let ordering = core_curriculum::CurriculumProvider::load(curriculum_root).unwrap();
        let store = ProgressStore::new(progress_path.to_path_buf());
        let executor = Executor::new(std::env::current_exe().unwrap());
        SimulationEngine::new(ordering, store, executor)
    }

    #[test]
    fn next_action_on_fresh_progress_shows_the_first_lesson() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let engine = build_engine(curriculum.path(), &progress_dir.path().join("progress.json"));

        match engine.next_action() {
            Action::RenderEditor { title, status, .. } => {
                assert_eq!(title, "Hello");
                assert_eq!(status, TaskStatus::Pending);
            }
            other => panic!("expected RenderEditor, got {other:?}"),
        }
    }

    #[test]
    fn skip_advances_to_the_next_lesson_and_persists() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let progress_path = progress_dir.path().join("progress.json");
        let mut engine = build_engine(curriculum.path(), &progress_path);

        engine.process_input(Input::Skip);
        match engine.next_action() {
            Action::RenderEditor { title, .. } => assert_eq!(title, "Second"),
            other => panic!("expected RenderEditor, got {other:?}"),
        }

        let reloaded = ProgressStore::new(progress_path).load();
        assert_eq!(
            reloaded.skipped_tasks.len(),
            1,
            "skip must persist synchronously"
        );
    }

    #[test]
    fn reset_all_clears_progress() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let mut engine = build_engine(curriculum.path(), &progress_dir.path().join("progress.json"));

        engine.process_input(Input::Skip);
        let action = engine.process_input(Input::ResetAll);
        assert!(matches!(
            action,
            Action::ShowMessage { kind: MessageKind::Reset, .. }
        ));
        assert!(engine.progress.skipped_tasks.is_empty());
    }

    #[test]
    fn goto_first_skipped_jumps_back() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let mut engine = build_engine(curriculum.path(), &progress_dir.path().join("progress.json"));

        engine.process_input(Input::Skip); // skip "Hello", land on "Second"
        engine.process_input(Input::GotoFirstSkipped);
        match engine.next_action() {
            Action::RenderEditor { title, status, .. } => {
                assert_eq!(title, "Hello");
                assert_eq!(status, TaskStatus::Skipped);
            }
            other => panic!("expected RenderEditor, got {other:?}"),
        }
    }

    #[test]
    fn next_task_is_blocked_between_two_untouched_lessons() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let mut engine = build_engine(curriculum.path(), &progress_dir.path().join("progress.json"));

        engine.process_input(Input::NextTask);
        match engine.next_action() {
            Action::RenderEditor { title, .. } => assert_eq!(title, "Hello"),
            other => panic!("expected RenderEditor, got {other:?}"),
        }
    }

    #[test]
    fn running_off_the_last_lesson_shows_celebration() {
        let curriculum = tempfile::tempdir().unwrap();
        build_curriculum(curriculum.path());
        let progress_dir = tempfile::tempdir().unwrap();
        let mut engine = build_engine(curriculum.path(), &progress_dir.path().join("progress.json"));

        engine.process_input(Input::Skip);
        engine.process_input(Input::Skip);
        match engine.next_action() {
            Action::RenderCelebration { skipped_count, .. } => assert_eq!(skipped_count, 2),
            other => panic!("expected RenderCelebration, got {other:?}"),
        }
    }
}
