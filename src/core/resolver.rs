use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::prompt::{choose_one, Choice, Prompter};
use crate::config::{InterpreterRegistry, ProjectConfig};

/// Picks the interpreter a command should use.
///
/// First match wins: explicit argument, project default, global default, then
/// an interactive pick from the registered list. Nothing is checked for
/// existence here.
pub struct InterpreterResolver<'a> {
    registry: &'a InterpreterRegistry,
    cwd: &'a Path,
}

impl<'a> InterpreterResolver<'a> {
    pub fn new(registry: &'a InterpreterRegistry, cwd: &'a Path) -> Self {
        Self { registry, cwd }
    }

    pub fn resolve(&self, explicit: Option<&Path>, prompter: &mut dyn Prompter) -> Option<PathBuf> {
        if let Some(explicit) = explicit {
            debug!("Using explicit interpreter {}", explicit.display());
            return Some(explicit.to_path_buf());
        }

        if let Some(project) = ProjectConfig::load(self.cwd).default_interpreter {
            debug!("Using project default interpreter {}", project.display());
            return Some(project);
        }

        if let Some(global) = &self.registry.default_interpreter {
            debug!("Using global default interpreter {}", global.display());
            return Some(global.clone());
        }

        if self.registry.interpreters.is_empty() {
            return None;
        }

        let options: Vec<String> = self
            .registry
            .interpreters
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        match choose_one(prompter, "No default interpreter set. Choose one:", &options) {
            Choice::Picked(index) => Some(self.registry.interpreters[index].clone()),
            Choice::Skipped => self.registry.default_interpreter.clone(),
            Choice::Invalid(answer) => {
                warn!("Invalid interpreter choice: {}", answer);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::set_project_default_interpreter;
    use crate::core::prompt::ScriptedPrompter;
    use tempfile::TempDir;

    fn registry(default: Option<&str>, interpreters: &[&str]) -> InterpreterRegistry {
        InterpreterRegistry {
            interpreters: interpreters.iter().map(PathBuf::from).collect(),
            default_interpreter: default.map(PathBuf::from),
        }
    }

    #[test]
    fn test_explicit_beats_everything() {
        let dir = TempDir::new().unwrap();
        set_project_default_interpreter(Path::new("/project/python"), dir.path()).unwrap();
        let registry = registry(Some("/global/python"), &["/global/python"]);
        let mut prompter = ScriptedPrompter::default();

        let resolved = InterpreterResolver::new(&registry, dir.path())
            .resolve(Some(Path::new("/explicit/python")), &mut prompter);

        assert_eq!(resolved, Some(PathBuf::from("/explicit/python")));
        assert!(prompter.questions.is_empty());
    }

    #[test]
    fn test_project_beats_global() {
        let dir = TempDir::new().unwrap();
        set_project_default_interpreter(Path::new("/project/python"), dir.path()).unwrap();
        let registry = registry(Some("/global/python"), &["/global/python"]);

        let resolved = InterpreterResolver::new(&registry, dir.path())
            .resolve(None, &mut ScriptedPrompter::default());
        assert_eq!(resolved, Some(PathBuf::from("/project/python")));
    }

    #[test]
    fn test_global_default_used_without_project() {
        let dir = TempDir::new().unwrap();
        let registry = registry(Some("/global/python"), &[]);

        let resolved = InterpreterResolver::new(&registry, dir.path())
            .resolve(None, &mut ScriptedPrompter::default());
        assert_eq!(resolved, Some(PathBuf::from("/global/python")));
    }

    #[test]
    fn test_interactive_pick_when_no_default() {
        let dir = TempDir::new().unwrap();
        let registry = registry(None, &["/a/python", "/b/python"]);
        let mut prompter = ScriptedPrompter::new([Some("2")]);

        let resolved = InterpreterResolver::new(&registry, dir.path()).resolve(None, &mut prompter);
        assert_eq!(resolved, Some(PathBuf::from("/b/python")));
        assert_eq!(prompter.questions.len(), 1);
    }

    #[test]
    fn test_empty_answer_without_default_is_none() {
        let dir = TempDir::new().unwrap();
        let registry = registry(None, &["/a/python"]);
        let mut prompter = ScriptedPrompter::new([None::<&str>]);

        assert_eq!(
            InterpreterResolver::new(&registry, dir.path()).resolve(None, &mut prompter),
            None
        );
    }

    #[test]
    fn test_nothing_registered_is_none() {
        let dir = TempDir::new().unwrap();
        let registry = InterpreterRegistry::default();
        let mut prompter = ScriptedPrompter::default();

        assert_eq!(
            InterpreterResolver::new(&registry, dir.path()).resolve(None, &mut prompter),
            None
        );
        assert!(prompter.questions.is_empty());
    }
}
