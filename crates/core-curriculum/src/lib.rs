//! Curriculum Provider (§4.5): loads an ordered sequence of lessons from a
//! manifest-driven directory layout, grounded in `curriculum_manager.py`'s
//! chapter/lesson directory walk and `Lesson.__init__`'s tolerant field
//! defaults.

pub mod scaffold;
pub mod solvability;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use core_executor::ValidatorHandle;

#[derive(Debug, Error)]
pub enum CurriculumError {
    #[error("failed to read curriculum directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {}: {source}", path.display())]
    Json { path: PathBuf, #[source] source: serde_json::Error },
    #[error("manifest.json not found under {}", .0.display())]
    MissingManifest(PathBuf),
    #[error("lesson directory {} has no task.json", .0.display())]
    MissingTask(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Lesson {
    pub uuid: Uuid,
    /// 1-based position across the whole ordering — the legacy numeric ID
    /// the original engine's `id_map` keyed on, kept for UI display.
    pub index: u32,
    pub category: String,
    pub title: String,
    pub description: String,
    pub hint: String,
    pub solution: Option<String>,
    pub validator: ValidatorHandle,
    pub tags: Vec<String>,
    pub xp: u32,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    chapters: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskDescriptor {
    uuid: Uuid,
    title: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    hint: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    xp: u32,
}

/// The loaded, order-stable sequence of lessons a [`SimulationEngine`] (in
/// `core-engine`) walks. `first`/`by_uuid`/`next`/`prev`/`count` are all
/// O(1) or O(log n) over the backing `Vec` + index maps, per §4.5.
#[derive(Debug, Clone, Default)]
pub struct LessonOrdering {
    lessons: Vec<Lesson>,
    uuid_index: HashMap<Uuid, usize>,
    by_index: HashMap<u32, usize>,
}

impl LessonOrdering {
    fn from_lessons(lessons: Vec<Lesson>) -> Self {
        let uuid_index = lessons.iter().enumerate().map(|(i, l)| (l.uuid, i)).collect();
        let by_index = lessons.iter().enumerate().map(|(i, l)| (l.index, i)).collect();
        Self { lessons, uuid_index, by_index }
    }

    pub fn first(&self) -> Option<&Lesson> {
        self.lessons.first()
    }

    pub fn by_uuid(&self, uuid: Uuid) -> Option<&Lesson> {
        self.uuid_index.get(&uuid).map(|&i| &self.lessons[i])
    }

    /// Legacy numeric lookup, kept for UI display alongside the UUID map —
    /// `curriculum_manager.py`'s `id_map` kept the same pairing.
    pub fn by_index(&self, index: u32) -> Option<&Lesson> {
        self.by_index.get(&index).map(|&i| &self.lessons[i])
    }

    pub fn next(&self, uuid: Uuid) -> Option<&Lesson> {
        let i = *self.uuid_index.get(&uuid)?;
        self.lessons.get(i + 1)
    }

    pub fn prev(&self, uuid: Uuid) -> Option<&Lesson> {
        let i = *self.uuid_index.get(&uuid)?;
        i.checked_sub(1).and_then(|j| self.lessons.get(j))
    }

    pub fn count(&self) -> usize {
        self.lessons.len()
    }

    pub fn all(&self) -> &[Lesson] {
        &self.lessons
    }

    /// The earliest (lowest-index) lesson whose UUID appears in `skipped` —
    /// the supplemented `GOTO_FIRST_SKIPPED` behavior (§4.7, §9).
    pub fn first_skipped<'a>(&'a self, skipped: &std::collections::HashSet<Uuid>) -> Option<&'a Lesson> {
        self.lessons.iter().find(|l| skipped.contains(&l.uuid))
    }
}

pub struct CurriculumProvider;

impl CurriculumProvider {
    pub fn load(root: &Path) -> Result<LessonOrdering, CurriculumError> {
        let manifest_path = root.join("manifest.json");
        if !manifest_path.exists() {
            return Err(CurriculumError::MissingManifest(manifest_path));
        }
        let manifest_raw = fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = serde_json::from_str(&manifest_raw)
            .map_err(|source| CurriculumError::Json { path: manifest_path.clone(), source })?;

        let mut lessons = Vec::new();
        let mut index = 1u32;
        for chapter in &manifest.chapters {
            let chapter_dir = root.join(chapter);
            let mut lesson_dirs: Vec<PathBuf> = fs::read_dir(&chapter_dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            lesson_dirs.sort();

            for lesson_dir in lesson_dirs {
                let task_path = lesson_dir.join("task.json");
                if !task_path.exists() {
                    return Err(CurriculumError::MissingTask(lesson_dir));
                }
                let raw = fs::read_to_string(&task_path)?;
                let task: TaskDescriptor = serde_json::from_str(&raw)
                    .map_err(|source| CurriculumError::Json { path: task_path.clone(), source })?;

                let solution_path = lesson_dir.join("solution.lang");
                let solution = fs::read_to_string(&solution_path).ok();

                lessons.push(Lesson {
                    uuid: task.uuid,
                    index,
                    category: task.category.unwrap_or_else(|| chapter.clone()),
                    title: task.title,
                    description: task.description,
                    hint: task.hint,
                    solution,
                    validator: ValidatorHandle::new(lesson_dir.join("validation.lang")),
                    tags: task.tags,
                    xp: task.xp,
                });
                index += 1;
            }
        }

        Ok(LessonOrdering::from_lessons(lessons))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn build_fixture(root: &Path) {
        write(&root.join("manifest.json"), r#"{"chapters": ["01_basics"]}"#);
        write(
            &root.join("01_basics/010_hello/task.json"),
            r#"{"uuid": "11111111-1111-1111-1111-111111111111", "title": "Hello", "xp": 10}"#,
        );
        write(&root.join("01_basics/010_hello/validation.lang"), "passed = True\n");
        write(&root.join("01_basics/010_hello/solution.lang"), "print('hi')\n");
        write(
            &root.join("01_basics/020_vars/task.json"),
            r#"{"uuid": "22222222-2222-2222-2222-222222222222", "title": "Variables"}"#,
        );
        write(&root.join("01_basics/020_vars/validation.lang"), "passed = True\n");
    }

    #[test]
    fn loads_lessons_in_directory_order_with_a_1_based_index() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let ordering = CurriculumProvider::load(dir.path()).unwrap();
        assert_eq!(ordering.count(), 2);
        let first = ordering.first().unwrap();
        assert_eq!(first.title, "Hello");
        assert_eq!(first.index, 1);
        assert_eq!(first.category, "01_basics");
    }

    #[test]
    fn next_and_prev_walk_the_ordering() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let ordering = CurriculumProvider::load(dir.path()).unwrap();
        let first = ordering.first().unwrap();
        let second = ordering.next(first.uuid).unwrap();
        assert_eq!(second.title, "Variables");
        assert_eq!(ordering.prev(second.uuid).unwrap().uuid, first.uuid);
        assert!(ordering.next(second.uuid).is_none());
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = CurriculumProvider::load(dir.path()).unwrap_err();
        assert!(matches!(err, CurriculumError::MissingManifest(_)));
    }

    #[test]
    fn by_index_is_the_legacy_lookup_path() {
        let dir = tempfile::tempdir().unwrap();
        build_fixture(dir.path());
        let ordering = CurriculumProvider::load(dir.path()).unwrap();
        assert_eq!(ordering.by_index(2).unwrap().title, "Variables");
        assert!(ordering.by_index(99).is_none());
    }
}
