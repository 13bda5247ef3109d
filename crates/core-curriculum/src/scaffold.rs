//! Generates a new lesson's skeleton files — the Rust counterpart of
//! `tools/scaffold_lesson.py`. Supplemented tooling (§9), not part of the
//! Curriculum Provider's read path.

use std::fs;
use std::path::Path;

use uuid::Uuid;

use crate::CurriculumError;

/// Writes `root/chapter/slug/{task.json,validation.lang,solution.lang}`.
/// Fails if the lesson directory already exists, so re-running the
/// scaffolder never silently clobbers a lesson in progress.
pub fn new_lesson(root: &Path, chapter: &str, slug: &str, title: &str) -> Result<Uuid, CurriculumError> {
    let dir = root.join(chapter).join(slug);
    if dir.exists() {
        return Err(CurriculumError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", dir.display()),
        )));
    }
    fs::create_dir_all(&dir)?;

    let uuid = Uuid::new_v4();
    let task = format!(
        "{{\n  \"uuid\": \"{uuid}\",\n  \"title\": \"{title}\",\n  \"description\": \"\",\n  \"hint\": \"\",\n  \"tags\": [],\n  \"xp\": 10\n}}\n"
    );
    fs::write(dir.join("task.json"), task)?;
    fs::write(dir.join("validation.lang"), "passed = False\nmessage = 'not yet implemented'\n")?;
    fs::write(dir.join("solution.lang"), "# reference solution goes here\n")?;
    Ok(uuid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffolds_the_three_expected_files() {
        let dir = tempfile::tempdir().unwrap();
        new_lesson(dir.path(), "01_basics", "030_new", "New Lesson").unwrap();
        let lesson_dir = dir.path().join("01_basics/030_new");
        assert!(lesson_dir.join("task.json").exists());
        assert!(lesson_dir.join("validation.lang").exists());
        assert!(lesson_dir.join("solution.lang").exists());
    }

    #[test]
    fn refuses_to_overwrite_an_existing_lesson() {
        let dir = tempfile::tempdir().unwrap();
        new_lesson(dir.path(), "01_basics", "030_new", "New Lesson").unwrap();
        let err = new_lesson(dir.path(), "01_basics", "030_new", "New Lesson").unwrap_err();
        assert!(matches!(err, CurriculumError::Io(_)));
    }
}
