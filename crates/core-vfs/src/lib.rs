//! In-memory virtual file system for sandboxed user code.
//!
//! Mirrors the shape of `core-terminal`'s RAII guard: callers acquire a
//! handle, operate on it, and the handle guarantees its buffered state is
//! committed back to the store on every exit path (explicit `close` or
//! `Drop`). No state here ever touches the host file system; everything
//! lives in a process-local map and is discarded with the worker.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("binary mode is not supported in this sandbox")]
    BinaryModeUnsupported,
    #[error("operation attempted on a closed handle")]
    HandleClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    Append,
}

impl Mode {
    /// Parses the small subset of Python-style mode strings the curriculum
    /// exercises (`"r"`, `"w"`, `"a"`, optionally followed by `"t"`/`"+"`).
    /// Binary mode (`"b"` anywhere in the string) is rejected per §4.1.
    pub fn parse(raw: &str) -> Result<Self, VfsError> {
        if raw.contains('b') {
            return Err(VfsError::BinaryModeUnsupported);
        }
        if raw.contains('w') {
            Ok(Mode::Write)
        } else if raw.contains('a') {
            Ok(Mode::Append)
        } else {
            Ok(Mode::Read)
        }
    }
}

/// Process-local, in-memory file store. Cheaply `Clone`-able (shared
/// ownership of the same backing map) so it can be captured by the
/// restricted environment's `open` builtin as well as held directly by
/// the caller for setup/inspection.
#[derive(Debug, Clone, Default)]
pub struct Vfs {
    files: Rc<RefCell<HashMap<String, String>>>,
}

impl Vfs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file's content directly, bypassing handle semantics. Used by
    /// lesson setup code and tests.
    pub fn seed(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.borrow_mut().insert(path.into(), content.into());
    }

    pub fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    pub fn remove(&self, path: &str) -> Result<(), VfsError> {
        self.files
            .borrow_mut()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    pub fn open(&self, path: &str, mode: Mode) -> Result<VfsHandle, VfsError> {
        let initial = match mode {
            Mode::Read => {
                let store = self.files.borrow();
                store
                    .get(path)
                    .cloned()
                    .ok_or_else(|| VfsError::NotFound(path.to_string()))?
            }
            Mode::Write => {
                // Truncate-or-create happens immediately, not on close.
                self.files.borrow_mut().insert(path.to_string(), String::new());
                String::new()
            }
            Mode::Append => self
                .files
                .borrow()
                .get(path)
                .cloned()
                .unwrap_or_default(),
        };

        Ok(VfsHandle {
            fs: self.clone(),
            path: path.to_string(),
            mode,
            buffer: initial,
            cursor: 0,
            closed: false,
        })
    }
}

/// A handle to an in-memory file. Reads operate over a snapshot taken at
/// open time (the sandbox has no concurrent writers); writes accumulate in
/// `buffer` and are committed to the store only on close, matching
/// `original_source/vfs.py`'s `MockFileHandle.close`.
pub struct VfsHandle {
    fs: Vfs,
    path: String,
    mode: Mode,
    buffer: String,
    cursor: usize,
    closed: bool,
}

impl VfsHandle {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn read_to_string(&mut self) -> Result<String, VfsError> {
        self.ensure_open()?;
        let rest = self.buffer[self.cursor..].to_string();
        self.cursor = self.buffer.len();
        Ok(rest)
    }

    /// Reads a single line (including its trailing newline, if any), or
    /// `None` at end of content.
    pub fn read_line(&mut self) -> Result<Option<String>, VfsError> {
        self.ensure_open()?;
        if self.cursor >= self.buffer.len() {
            return Ok(None);
        }
        let rest = &self.buffer[self.cursor..];
        let line = match rest.find('\n') {
            Some(idx) => &rest[..=idx],
            None => rest,
        };
        let line = line.to_string();
        self.cursor += line.len();
        Ok(Some(line))
    }

    pub fn read_lines(&mut self) -> Result<Vec<String>, VfsError> {
        self.ensure_open()?;
        let mut out = Vec::new();
        while let Some(line) = self.read_line()? {
            out.push(line);
        }
        Ok(out)
    }

    pub fn write(&mut self, data: &str) -> Result<(), VfsError> {
        self.ensure_open()?;
        if self.mode == Mode::Read {
            return Err(VfsError::HandleClosed);
        }
        self.buffer.push_str(data);
        Ok(())
    }

    /// Flushes buffered writes to the VFS store. Idempotent: calling this
    /// more than once (or letting `Drop` call it after an explicit close)
    /// is a no-op on the second call.
    pub fn close(&mut self) -> Result<(), VfsError> {
        if self.closed {
            return Ok(());
        }
        if matches!(self.mode, Mode::Write | Mode::Append) {
            self.fs
                .files
                .borrow_mut()
                .insert(self.path.clone(), self.buffer.clone());
        }
        self.closed = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), VfsError> {
        if self.closed {
            Err(VfsError::HandleClosed)
        } else {
            Ok(())
        }
    }
}

impl Drop for VfsHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let fs = Vfs::new();
        {
            let mut h = fs.open("notes.txt", Mode::Write).unwrap();
            h.write("hello\n").unwrap();
            h.write("world\n").unwrap();
            h.close().unwrap();
        }
        let mut h = fs.open("notes.txt", Mode::Read).unwrap();
        assert_eq!(h.read_to_string().unwrap(), "hello\nworld\n");
    }

    #[test]
    fn read_missing_path_fails() {
        let fs = Vfs::new();
        let err = fs.open("missing.txt", Mode::Read).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(_)));
    }

    #[test]
    fn write_mode_truncates_immediately_even_without_close() {
        let fs = Vfs::new();
        fs.seed("existing.txt", "old content");
        let _handle = fs.open("existing.txt", Mode::Write).unwrap();
        // Truncation is visible in the store the instant the handle opens,
        // independent of whether/when it is closed.
        assert_eq!(fs.files.borrow().get("existing.txt").unwrap(), "");
    }

    #[test]
    fn append_mode_preserves_existing_content() {
        let fs = Vfs::new();
        fs.seed("log.txt", "line1\n");
        {
            let mut h = fs.open("log.txt", Mode::Append).unwrap();
            h.write("line2\n").unwrap();
        }
        let mut h = fs.open("log.txt", Mode::Read).unwrap();
        assert_eq!(h.read_to_string().unwrap(), "line1\nline2\n");
    }

    #[test]
    fn binary_mode_rejected() {
        assert!(matches!(
            Mode::parse("rb"),
            Err(VfsError::BinaryModeUnsupported)
        ));
    }

    #[test]
    fn drop_commits_buffered_writes() {
        let fs = Vfs::new();
        {
            let mut h = fs.open("auto.txt", Mode::Write).unwrap();
            h.write("flushed on drop").unwrap();
            // no explicit close() call
        }
        let mut h = fs.open("auto.txt", Mode::Read).unwrap();
        assert_eq!(h.read_to_string().unwrap(), "flushed on drop");
    }

    #[test]
    fn remove_missing_path_errors() {
        let fs = Vfs::new();
        assert!(matches!(fs.remove("ghost.txt"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn read_line_splits_on_newline_boundaries() {
        let fs = Vfs::new();
        fs.seed("multi.txt", "a\nb\nc");
        let mut h = fs.open("multi.txt", Mode::Read).unwrap();
        assert_eq!(h.read_line().unwrap(), Some("a\n".to_string()));
        assert_eq!(h.read_line().unwrap(), Some("b\n".to_string()));
        assert_eq!(h.read_line().unwrap(), Some("c".to_string()));
        assert_eq!(h.read_line().unwrap(), None);
    }
}
