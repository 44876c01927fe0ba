use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PynstalError, Result};

/// File name of the global interpreter registry inside the config directory
pub const INTERPRETERS_FILE: &str = "interpreters.json";

/// File name of the user-writable template registry inside the config directory
pub const TEMPLATES_FILE: &str = "templates.json";

/// Project-local config file, placed directly inside the working directory
pub const PROJECT_FILE: &str = ".pynstal.json";

/// Global registry of known interpreter paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpreterRegistry {
    /// Registered interpreters, unique, in insertion order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interpreters: Vec<PathBuf>,

    /// Interpreter used when neither the command line nor the project picks one
    #[serde(default)]
    pub default_interpreter: Option<PathBuf>,
}

impl InterpreterRegistry {
    pub fn contains(&self, path: &Path) -> bool {
        self.interpreters.iter().any(|p| p == path)
    }

    /// Append `path` unless it is already registered. Returns whether it was added.
    pub fn add(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.interpreters.push(path);
        true
    }

    /// Insert `path` at the front unless it is already registered.
    pub fn insert_front(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.interpreters.insert(0, path);
        true
    }

    /// Make `path` the global default, registering it first if needed.
    pub fn set_default(&mut self, path: PathBuf) {
        self.insert_front(path.clone());
        self.default_interpreter = Some(path);
    }

    /// Seed an unset default with the interpreter running on this machine.
    ///
    /// Returns `true` when the registry changed and should be persisted.
    pub fn seed(&mut self, current: Option<&Path>) -> bool {
        if self.default_interpreter.is_some() {
            return false;
        }
        match current {
            Some(current) => {
                self.set_default(current.to_path_buf());
                true
            }
            None => false,
        }
    }

    /// Remove a single registered path. Returns whether anything was removed.
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.interpreters.len();
        self.interpreters.retain(|p| p != path);
        let removed = self.interpreters.len() != before;
        if self.default_interpreter.as_deref() == Some(path) {
            self.reassign_default();
        }
        removed
    }

    /// Remove every interpreter lexically inside `prefix`, both resolved against `cwd`.
    pub fn remove_under(&mut self, prefix: &Path, cwd: &Path) -> Vec<PathBuf> {
        let prefix = absolutize(prefix, cwd);
        let (removed, kept): (Vec<PathBuf>, Vec<PathBuf>) = self
            .interpreters
            .drain(..)
            .partition(|p| absolutize(p, cwd).starts_with(&prefix));
        self.interpreters = kept;

        let default_removed = self
            .default_interpreter
            .as_deref()
            .map(|d| absolutize(d, cwd).starts_with(&prefix))
            .unwrap_or(false);
        if default_removed {
            self.reassign_default();
        }
        removed
    }

    fn reassign_default(&mut self) {
        self.default_interpreter = self.interpreters.first().cloned();
        debug!("Default interpreter reassigned to {:?}", self.default_interpreter);
    }
}

/// Per-project settings stored in `.pynstal.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Overrides the global default interpreter for this directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_interpreter: Option<PathBuf>,

    /// Keys this version does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProjectConfig {
    pub fn path(cwd: &Path) -> PathBuf {
        cwd.join(PROJECT_FILE)
    }

    /// Load the project config. Missing or malformed files yield an empty config.
    pub fn load(cwd: &Path) -> Self {
        let path = Self::path(cwd);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            debug!("Ignoring unreadable project config {}: {}", path.display(), e);
            Self::default()
        })
    }

    pub fn save(&self, cwd: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::path(cwd), content)?;
        Ok(())
    }
}

/// Record `interpreter` as the project default for `cwd`.
pub fn set_project_default_interpreter(interpreter: &Path, cwd: &Path) -> Result<()> {
    let mut project = ProjectConfig::load(cwd);
    project.default_interpreter = Some(interpreter.to_path_buf());
    project.save(cwd)
}

/// Clear the project default for `cwd` if it points inside `prefix`.
pub fn clear_project_override_if_under(prefix: &Path, cwd: &Path) -> Result<bool> {
    let mut project = ProjectConfig::load(cwd);
    let inside = project
        .default_interpreter
        .as_deref()
        .map(|p| absolutize(p, cwd).starts_with(absolutize(prefix, cwd)))
        .unwrap_or(false);

    if inside {
        project.default_interpreter = None;
        project.save(cwd)?;
        info!("Cleared project default interpreter for {}", cwd.display());
    }
    Ok(inside)
}

/// File-backed store for the global interpreter registry
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-user configuration directory used when no override is given
    pub fn default_dir() -> Result<PathBuf> {
        directories::ProjectDirs::from("", "", "pynstal")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or_else(|| PynstalError::Config("No user home directory found".to_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interpreters_path(&self) -> PathBuf {
        self.dir.join(INTERPRETERS_FILE)
    }

    /// Load the registry. A missing file is an empty registry; a malformed one is an error.
    pub fn load_global(&self) -> Result<InterpreterRegistry> {
        let path = self.interpreters_path();
        if !path.exists() {
            return Ok(InterpreterRegistry::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|e| {
            PynstalError::Config(format!("Malformed registry {}: {}", path.display(), e))
        })
    }

    /// Load the registry and seed its default from `current`, persisting if it changed.
    pub fn load_global_seeded(&self, current: Option<&Path>) -> Result<InterpreterRegistry> {
        let mut registry = self.load_global()?;
        if registry.seed(current) {
            info!("Seeded default interpreter: {:?}", registry.default_interpreter);
            self.save_global(&registry)?;
        }
        Ok(registry)
    }

    pub fn save_global(&self, registry: &InterpreterRegistry) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let content = serde_json::to_string_pretty(registry)?;
        std::fs::write(self.interpreters_path(), content)?;
        Ok(())
    }
}

/// Resolve `path` against `cwd` and fold `.` / `..` without touching the filesystem.
pub fn absolutize(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
