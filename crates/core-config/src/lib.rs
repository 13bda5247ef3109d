//! Configuration loading and parsing.
//!
//! Parses `sim.toml` (or an override path given by the binary): curriculum
//! root, progress file location, and overrides for the default
//! `ResourceBudget` and wall-clock timeout the Executor runs every
//! submission under. Grounded in `config.py::System`'s tolerant-defaults
//! loading and `core-config`'s own pre-existing `load_from`/`discover`
//! shape — unknown fields are ignored (TOML deserialization tolerance) and
//! a missing or unparsable file quietly falls back to defaults rather than
//! failing startup.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

use core_guardian::ResourceBudget;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ResourceBudgetConfig {
    pub memory_bytes: Option<u64>,
    pub cpu_seconds: Option<u64>,
    pub max_operations: Option<u64>,
    pub recursion_depth: Option<u32>,
}

impl ResourceBudgetConfig {
    /// Overlays configured fields onto the default budget; a field left
    /// unset in `sim.toml` keeps the Guardian's built-in default (§4.3).
    pub fn apply_to(&self, base: ResourceBudget) -> ResourceBudget {
        ResourceBudget {
            memory_bytes: self.memory_bytes.unwrap_or(base.memory_bytes),
            cpu_seconds: self.cpu_seconds.unwrap_or(base.cpu_seconds),
            max_operations: self.max_operations.unwrap_or(base.max_operations),
            recursion_depth: self.recursion_depth.unwrap_or(base.recursion_depth),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub curriculum_root: Option<PathBuf>,
    #[serde(default)]
    pub progress_path: Option<PathBuf>,
    #[serde(default)]
    pub budget: ResourceBudgetConfig,
    #[serde(default = "ConfigFile::default_worker_timeout_secs")]
    pub worker_timeout_secs: u64,
}

impl ConfigFile {
    const fn default_worker_timeout_secs() -> u64 {
        5
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            curriculum_root: None,
            progress_path: None,
            budget: ResourceBudgetConfig::default(),
            worker_timeout_secs: Self::default_worker_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
}

impl Config {
    pub fn curriculum_root(&self) -> PathBuf {
        self.file
            .curriculum_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("curriculum"))
    }

    pub fn progress_path(&self) -> PathBuf {
        self.file
            .progress_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("progress.json"))
    }

    pub fn resource_budget(&self) -> ResourceBudget {
        self.file.budget.apply_to(ResourceBudget::default())
    }

    pub fn worker_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.file.worker_timeout_secs)
    }
}

/// Best-effort config path: prefer a local `sim.toml` before falling back to
/// the platform config directory.
pub fn discover() -> PathBuf {
    let local = PathBuf::from("sim.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("sim").join("sim.toml");
    }
    PathBuf::from("sim.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "loaded configuration");
                Ok(Config { file })
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "failed to parse config, using defaults");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.curriculum_root(), PathBuf::from("curriculum"));
        assert_eq!(cfg.progress_path(), PathBuf::from("progress.json"));
        assert_eq!(cfg.resource_budget(), ResourceBudget::default());
    }

    #[test]
    fn parses_curriculum_and_progress_paths() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "curriculum_root = \"/srv/curriculum\"\nprogress_path = \"/var/lib/sim/progress.json\"\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.curriculum_root(), PathBuf::from("/srv/curriculum"));
        assert_eq!(cfg.progress_path(), PathBuf::from("/var/lib/sim/progress.json"));
    }

    #[test]
    fn partial_budget_override_keeps_other_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[budget]\nmax_operations = 500000\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        let budget = cfg.resource_budget();
        assert_eq!(budget.max_operations, 500_000);
        assert_eq!(budget.memory_bytes, ResourceBudget::default().memory_bytes);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "curriculum_root = [not valid").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.curriculum_root(), PathBuf::from("curriculum"));
    }

    #[test]
    fn worker_timeout_defaults_to_five_seconds() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_timeout__.toml"))).unwrap();
        assert_eq!(cfg.worker_timeout().as_secs(), 5);
    }
}
