// src/core/engine.rs
use std::fmt::Display;
use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use tracing::{debug, info};

use super::{
    venv_python, choose_many, choose_one, confirm, current_runtime, detect,
    resolve_program, spawn_activated_shell, Choice, CommandRunner, EnvironmentBuilder,
    InterpreterResolver, PackageInstaller, PackageSpec, Prompter, Removal, SearchRoots,
    SystemRunner, TemplateRegistry, TemplateStore, TerminalPrompter, VenvRemover,
};
use crate::config::{absolutize, ConfigStore, InterpreterRegistry, ProjectConfig};
use crate::error::PynstalError;

/// Runs every pynstal command against the config directory and working directory
pub struct Engine {
    store: ConfigStore,
    templates: TemplateStore,
    cwd: PathBuf,
    registry: InterpreterRegistry,
    prompter: Box<dyn Prompter>,
    runner: Box<dyn CommandRunner>,
}

impl Engine {
    /// Engine wired to the terminal and real subprocesses.
    ///
    /// Loading seeds the global default from the current runtime when unset.
    pub fn new(config_dir: PathBuf, cwd: PathBuf) -> Result<Self> {
        Self::with_io(
            config_dir,
            cwd,
            current_runtime(),
            Box::new(TerminalPrompter),
            Box::new(SystemRunner),
        )
    }

    pub fn with_io(
        config_dir: PathBuf,
        cwd: PathBuf,
        current: Option<PathBuf>,
        prompter: Box<dyn Prompter>,
        runner: Box<dyn CommandRunner>,
    ) -> Result<Self> {
        let store = ConfigStore::new(config_dir);
        let registry = store.load_global_seeded(current.as_deref())?;
        debug!("Loaded registry from {}: {:?}", store.dir().display(), registry);

        Ok(Self {
            templates: TemplateStore::new(store.dir()),
            store,
            cwd,
            registry,
            prompter,
            runner,
        })
    }

    // Interpreter registry

    pub fn add_interpreter(&mut self, path: &Path) -> Result<()> {
        let path = resolve_program(path, &self.cwd);
        if self.registry.add(path.clone()) {
            self.store.save_global(&self.registry)?;
            success(format!("Added interpreter: {}", path.display()));
        } else {
            println!("Interpreter already registered: {}", path.display());
        }
        Ok(())
    }

    pub fn set_default_interpreter(&mut self, path: Option<&Path>, project: bool) -> Result<()> {
        let path = match path {
            Some(path) => resolve_program(path, &self.cwd),
            None => match self.pick_registered("Choose the default interpreter:")? {
                Some(path) => path,
                None => {
                    println!("Default interpreter unchanged.");
                    return Ok(());
                }
            },
        };

        if !path.is_file() {
            return Err(PynstalError::InterpreterNotFound(path).into());
        }

        if project {
            let mut config = ProjectConfig::load(&self.cwd);
            config.default_interpreter = Some(path.clone());
            config.save(&self.cwd)?;
            success(format!(
                "Set project default interpreter for {}: {}",
                self.cwd.display(),
                path.display()
            ));
        } else {
            self.registry.set_default(path.clone());
            self.store.save_global(&self.registry)?;
            success(format!("Set default interpreter: {}", path.display()));
        }
        Ok(())
    }

    pub fn remove_interpreter(&mut self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(path) if self.registry.contains(path) => path.to_path_buf(),
            Some(path) => resolve_program(path, &self.cwd),
            None => match self.pick_registered("Choose the interpreter to remove:")? {
                Some(path) => path,
                None => {
                    println!("Skipped.");
                    return Ok(());
                }
            },
        };

        if !self.registry.remove(&path) {
            return Err(PynstalError::Validation(format!(
                "Interpreter is not registered: {}",
                path.display()
            ))
            .into());
        }
        self.store.save_global(&self.registry)?;
        success(format!("Removed interpreter: {}", path.display()));
        match &self.registry.default_interpreter {
            Some(default) => println!("Default interpreter: {}", default.display()),
            None => caution("No default interpreter left."),
        }
        Ok(())
    }

    pub fn list(&self) -> Result<()> {
        notice("Interpreters:");
        if self.registry.interpreters.is_empty() {
            caution(" - (none)");
        }
        for path in &self.registry.interpreters {
            println!(" - {}", path.display());
        }

        notice("Default interpreter:");
        println!(" - {}", display_or_none(self.registry.default_interpreter.as_deref()));

        notice("Project default interpreter:");
        let project = ProjectConfig::load(&self.cwd);
        println!(" - {}", display_or_none(project.default_interpreter.as_deref()));
        Ok(())
    }

    pub fn detect_interpreters(&mut self, add: bool, add_all: bool) -> Result<()> {
        notice("Scanning for Python installations...");
        let found = detect(&SearchRoots::from_env());

        if found.is_empty() {
            caution("No Python installations found.");
            return Err(PynstalError::Execution("No Python installations found".into()).into());
        }

        notice(format!("\nFound {} Python installation(s):\n", found.len()));
        for (i, item) in found.iter().enumerate() {
            println!("  [{}] {}", i + 1, item.path.display());
            println!("      Version: {}", item.version);
        }

        let picked: Vec<usize> = if add_all {
            (0..found.len()).collect()
        } else if add {
            let question = "\nEnter the numbers of interpreters to add (comma-separated, e.g., 1,2,3).\n\
                            Or press Enter to skip.\n> ";
            match choose_many(self.prompter.as_mut(), question, found.len()) {
                Ok(picked) if picked.is_empty() => {
                    println!("Skipped.");
                    return Ok(());
                }
                Ok(picked) => picked,
                Err(answer) => {
                    return Err(PynstalError::Validation(format!("Invalid input: {}", answer)).into())
                }
            }
        } else {
            return Ok(());
        };

        let mut added = 0;
        for index in picked {
            let path = found[index].path.clone();
            if self.registry.add(path.clone()) {
                println!("  Added: {}", path.display());
                added += 1;
            }
        }
        self.store.save_global(&self.registry)?;
        success(format!(
            "\nAdded {} interpreter(s) to {}",
            added,
            self.store.interpreters_path().display()
        ));
        Ok(())
    }

    // Virtual environments

    pub fn create_venv(
        &mut self,
        venv_dir: &Path,
        interpreter: Option<&Path>,
        dry_run: bool,
        offer_activation: bool,
    ) -> Result<()> {
        let interpreter = self.resolve_interpreter(interpreter)?;
        self.build_venv(&interpreter, venv_dir, dry_run)?;

        if !dry_run && offer_activation {
            self.offer_activation(venv_dir);
        }
        Ok(())
    }

    pub fn remove_venv(&mut self, venv_dir: &Path) -> Result<()> {
        let removal = VenvRemover::new(&self.store, &self.cwd)
            .remove(venv_dir, self.prompter.as_mut())?;

        match removal {
            Removal::Cancelled => println!("Aborted; nothing was deleted."),
            Removal::Removed {
                unregistered,
                default_interpreter,
                project_cleared,
            } => {
                success(format!("Removed virtual environment: {}", venv_dir.display()));
                for path in &unregistered {
                    println!("  Unregistered interpreter: {}", path.display());
                }
                if !unregistered.is_empty() {
                    println!(
                        "  Default interpreter: {}",
                        display_or_none(default_interpreter.as_deref())
                    );
                }
                if project_cleared {
                    println!("  Cleared project default interpreter.");
                }
                self.registry = self.store.load_global()?;
            }
        }
        Ok(())
    }

    pub fn create_from_template(
        &mut self,
        template: &str,
        venv_dir: &Path,
        interpreter: Option<&Path>,
        dry_run: bool,
        offer_activation: bool,
    ) -> Result<()> {
        let entries = self.template_entries(template)?;
        let interpreter = self.resolve_interpreter(interpreter)?;

        self.build_venv(&interpreter, venv_dir, dry_run)?;

        let venv_interpreter = absolutize(&venv_python(venv_dir), &self.cwd);
        self.install_entries(&venv_interpreter, &entries, dry_run)?;

        if !dry_run && offer_activation {
            self.offer_activation(venv_dir);
        }
        Ok(())
    }

    pub fn install(&mut self, template: &str, interpreter: Option<&Path>, dry_run: bool) -> Result<()> {
        let entries = self.template_entries(template)?;
        let interpreter = self.resolve_interpreter(interpreter)?;
        self.install_entries(&interpreter, &entries, dry_run)
    }

    // Templates

    pub fn template_list(&self) -> Result<()> {
        let registry = self.templates.load();
        if registry.templates.is_empty() {
            println!("No templates defined.");
            return Ok(());
        }

        notice("Available templates:");
        for (name, template) in &registry.templates {
            println!("  {}:", name);
            for entry in template.entries() {
                println!("    - {}", entry);
            }
        }
        Ok(())
    }

    pub fn template_show(&self, name: &str) -> Result<()> {
        let registry = self.templates.load();
        let template = registry.get(name)?;

        notice(format!("Template '{}':", name));
        for (i, entry) in template.entries().iter().enumerate() {
            match entry {
                PackageSpec::Simple(package) => println!("  [{}] {}", i + 1, package),
                PackageSpec::Grouped { .. } => println!(
                    "  [{}] {}",
                    i + 1,
                    serde_json::to_string_pretty(entry)?.replace('\n', "\n      ")
                ),
            }
        }
        Ok(())
    }

    pub fn template_add(&self, name: &str, packages: &[String], args: Option<&str>) -> Result<()> {
        let packages = split_words(packages);
        let args = args.map(|a| split_words(&[a.to_string()])).unwrap_or_default();

        let mut registry = self.templates.load_for_update()?;
        registry.add(name, TemplateRegistry::group(packages.clone(), args.clone()))?;
        self.templates.save(&registry)?;

        success(format!(
            "Template '{}' added with packages: {}",
            name,
            packages.join(", ")
        ));
        if !args.is_empty() {
            notice(format!("  Install args: {}", args.join(" ")));
        }
        Ok(())
    }

    pub fn template_remove(&self, name: &str) -> Result<()> {
        let mut registry = self.templates.load_for_update()?;
        registry.remove(name)?;
        self.templates.save(&registry)?;
        success(format!("Template '{}' removed.", name));
        Ok(())
    }

    pub fn template_add_packages(
        &self,
        name: &str,
        packages: &[String],
        args: Option<&str>,
    ) -> Result<()> {
        let packages = split_words(packages);
        let args = args.map(|a| split_words(&[a.to_string()]));

        let mut registry = self.templates.load_for_update()?;
        let report = registry.add_packages(name, &packages, args)?;
        for skipped in &report.skipped {
            caution(format!("Package '{}' is already in template '{}'", skipped, name));
        }
        if report.added.is_empty() {
            println!("Template '{}' unchanged.", name);
            return Ok(());
        }

        self.templates.save(&registry)?;
        success(format!(
            "Added to template '{}': {}",
            name,
            report.added.join(", ")
        ));
        Ok(())
    }

    /// Remove the entry shown as `position` (1-based) by `template show`.
    pub fn template_remove_package(&self, name: &str, position: usize) -> Result<()> {
        let mut registry = self.templates.load_for_update()?;
        let len = registry.get(name)?.entries().len();
        let index = position.checked_sub(1).ok_or(PynstalError::IndexOutOfRange {
            template: name.to_string(),
            index: position,
            len,
        })?;

        let removed = registry.remove_package(name, index).map_err(|e| match e {
            PynstalError::IndexOutOfRange { template, len, .. } => PynstalError::IndexOutOfRange {
                template,
                index: position,
                len,
            },
            other => other,
        })?;
        self.templates.save(&registry)?;
        success(format!("Removed '{}' from template '{}'.", removed, name));
        Ok(())
    }

    // Helpers

    fn resolve_interpreter(&mut self, explicit: Option<&Path>) -> Result<PathBuf> {
        let resolved = InterpreterResolver::new(&self.registry, &self.cwd)
            .resolve(explicit, self.prompter.as_mut())
            .ok_or(PynstalError::NoInterpreter)?;
        let program = resolve_program(&resolved, &self.cwd);
        info!("Using interpreter {}", program.display());
        Ok(program)
    }

    fn pick_registered(&mut self, title: &str) -> Result<Option<PathBuf>> {
        if self.registry.interpreters.is_empty() {
            return Err(PynstalError::NoInterpreter.into());
        }
        let options: Vec<String> = self
            .registry
            .interpreters
            .iter()
            .map(|p| p.display().to_string())
            .collect();

        match choose_one(self.prompter.as_mut(), title, &options) {
            Choice::Picked(index) => Ok(Some(self.registry.interpreters[index].clone())),
            Choice::Skipped => Ok(None),
            Choice::Invalid(answer) => {
                Err(PynstalError::Validation(format!("Invalid choice: {}", answer)).into())
            }
        }
    }

    fn template_entries(&self, template: &str) -> Result<Vec<PackageSpec>> {
        let registry = self.templates.load();
        match registry.get(template) {
            Ok(found) => Ok(found.entries().to_vec()),
            Err(err) => {
                failure(format!(
                    "Template '{}' not defined. Available: {}",
                    template,
                    registry.names().join(", ")
                ));
                Err(err.into())
            }
        }
    }

    fn build_venv(&mut self, interpreter: &Path, venv_dir: &Path, dry_run: bool) -> Result<()> {
        let result = EnvironmentBuilder::new(self.runner.as_ref(), &self.store, &self.cwd).create(
            interpreter,
            venv_dir,
            dry_run,
            &mut |line| println!("{}", line),
        );

        if !result.success {
            failure(format!(
                "Failed to create virtual environment. Error:\n{}",
                result.error
            ));
            return Err(PynstalError::Execution(result.error).into());
        }

        if dry_run {
            println!("{}", result.stdout);
        } else {
            success(format!(
                "Virtual environment created successfully at {}.",
                venv_dir.display()
            ));
            self.registry = self.store.load_global()?;
        }
        Ok(())
    }

    fn install_entries(&self, interpreter: &Path, entries: &[PackageSpec], dry_run: bool) -> Result<()> {
        let result = PackageInstaller::new(self.runner.as_ref()).install(
            interpreter,
            entries,
            dry_run,
            &mut |line| println!("{}", line),
        );

        if !result.success {
            failure(format!("Failed installing packages. Error:\n{}", result.error));
            return Err(PynstalError::Execution(result.error).into());
        }

        if dry_run {
            println!("{}", result.stdout);
        } else {
            success("Packages installed successfully.");
        }
        Ok(())
    }

    fn offer_activation(&mut self, venv_dir: &Path) {
        if confirm(self.prompter.as_mut(), "Activate venv now in a subshell? [y/N]: ") {
            spawn_activated_shell(&absolutize(venv_dir, &self.cwd));
        }
    }
}

fn split_words(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split_whitespace())
        .map(str::to_string)
        .collect()
}

fn display_or_none(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

fn success(msg: impl Display) {
    println!("{}", msg.to_string().green());
}

fn notice(msg: impl Display) {
    println!("{}", msg.to_string().cyan());
}

fn caution(msg: impl Display) {
    println!("{}", msg.to_string().yellow());
}

fn failure(msg: impl Display) {
    eprintln!("{}", msg.to_string().red());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::RecordingRunner;
    use crate::core::process::CommandResult;
    use crate::core::prompt::ScriptedPrompter;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Lets a test keep inspecting the runner after handing it to the engine
    struct SharedRunner(Rc<RecordingRunner>);

    impl CommandRunner for SharedRunner {
        fn run(
            &self,
            command: &crate::core::process::CommandLine,
            sink: &mut dyn FnMut(&str),
        ) -> CommandResult {
            self.0.run(command, sink)
        }
    }

    struct Fixture {
        dir: TempDir,
        runner: Rc<RecordingRunner>,
    }

    impl Fixture {
        fn new(results: Vec<CommandResult>) -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("project")).unwrap();
            Self {
                dir,
                runner: Rc::new(RecordingRunner::with_results(results)),
            }
        }

        fn cwd(&self) -> PathBuf {
            self.dir.path().join("project")
        }

        fn config_dir(&self) -> PathBuf {
            self.dir.path().join("cfg")
        }

        fn engine(&self, answers: Vec<Option<&str>>) -> Engine {
            Engine::with_io(
                self.config_dir(),
                self.cwd(),
                None,
                Box::new(ScriptedPrompter::new(answers)),
                Box::new(SharedRunner(self.runner.clone())),
            )
            .unwrap()
        }

        fn python(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, "").unwrap();
            path
        }

        fn registry(&self) -> InterpreterRegistry {
            ConfigStore::new(self.config_dir()).load_global().unwrap()
        }
    }

    fn exit_code(err: &anyhow::Error) -> Option<u8> {
        err.downcast_ref::<PynstalError>().map(PynstalError::exit_code)
    }

    #[test]
    fn test_add_interpreter_twice() {
        let fx = Fixture::new(vec![]);
        let mut engine = fx.engine(vec![]);
        engine.add_interpreter(Path::new("/usr/bin/python3")).unwrap();
        engine.add_interpreter(Path::new("/usr/bin/python3")).unwrap();

        assert_eq!(
            fx.registry().interpreters,
            vec![PathBuf::from("/usr/bin/python3")]
        );
    }

    #[test]
    fn test_set_default_checks_existence() {
        let fx = Fixture::new(vec![]);
        let mut engine = fx.engine(vec![]);

        let err = engine
            .set_default_interpreter(Some(Path::new("/no/such/python")), false)
            .unwrap_err();
        assert_eq!(exit_code(&err), Some(2));
        assert!(fx.registry().default_interpreter.is_none());

        let python = fx.python("python3");
        engine.set_default_interpreter(Some(&python), false).unwrap();
        assert_eq!(fx.registry().default_interpreter, Some(python));
    }

    #[test]
    fn test_set_project_default_leaves_global() {
        let fx = Fixture::new(vec![]);
        let python = fx.python("python3");
        let mut engine = fx.engine(vec![]);

        engine.set_default_interpreter(Some(&python), true).unwrap();
        assert_eq!(ProjectConfig::load(&fx.cwd()).default_interpreter, Some(python));
        assert!(fx.registry().default_interpreter.is_none());
    }

    #[test]
    fn test_interactive_default_skip_keeps_state() {
        let fx = Fixture::new(vec![]);
        let mut engine = fx.engine(vec![None]);
        engine.add_interpreter(Path::new("/a/python")).unwrap();

        engine.set_default_interpreter(None, false).unwrap();
        assert!(fx.registry().default_interpreter.is_none());
    }

    #[test]
    fn test_install_dry_run_scenario() {
        let fx = Fixture::new(vec![]);
        let engine = fx.engine(vec![]);
        engine
            .template_add("ml", &["numpy".into(), "pandas".into()], None)
            .unwrap();

        let mut engine = fx.engine(vec![]);
        engine
            .install("ml", Some(Path::new("/usr/bin/python3")), true)
            .unwrap();
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[test]
    fn test_unknown_template_is_validation_error() {
        let fx = Fixture::new(vec![]);
        let mut engine = fx.engine(vec![]);

        let err = engine
            .install("missing", Some(Path::new("/usr/bin/python3")), true)
            .unwrap_err();
        assert_eq!(exit_code(&err), Some(2));
    }

    #[test]
    fn test_no_interpreter_stops_before_running() {
        let fx = Fixture::new(vec![]);
        let mut engine = fx.engine(vec![]);

        let err = engine
            .create_venv(Path::new("env"), None, false, false)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PynstalError>(),
            Some(PynstalError::NoInterpreter)
        ));
        assert_eq!(fx.runner.call_count(), 0);
    }

    #[test]
    fn test_failed_install_exits_one() {
        let fx = Fixture::new(vec![CommandResult::failed(
            String::new(),
            "Command exited with 1".into(),
        )]);
        let python = fx.python("python3");
        let mut engine = fx.engine(vec![]);

        let err = engine.install("web", Some(&python), false).unwrap_err();
        assert_eq!(exit_code(&err), Some(1));
        assert_eq!(fx.runner.call_count(), 1);
    }

    #[test]
    fn test_create_from_template_installs_into_venv() {
        let fx = Fixture::new(vec![]);
        let python = fx.python("python3");
        let venv_python_path = venv_python(&fx.cwd().join("env"));
        std::fs::create_dir_all(venv_python_path.parent().unwrap()).unwrap();
        std::fs::write(&venv_python_path, "").unwrap();

        let engine = fx.engine(vec![]);
        engine.template_add("site", &["requests".into()], None).unwrap();
        let mut engine = fx.engine(vec![]);
        engine
            .create_from_template("site", Path::new("env"), Some(&python), false, false)
            .unwrap();

        let calls = fx.runner.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, python);
        assert_eq!(calls[1].program, venv_python_path);
        assert_eq!(
            ProjectConfig::load(&fx.cwd()).default_interpreter,
            Some(venv_python_path.clone())
        );
    }

    #[test]
    fn test_venv_failure_skips_install() {
        let fx = Fixture::new(vec![CommandResult::failed(
            String::new(),
            "Command exited with 1".into(),
        )]);
        let python = fx.python("python3");
        let mut engine = fx.engine(vec![]);

        let err = engine
            .create_from_template("web", Path::new("env"), Some(&python), false, false)
            .unwrap_err();
        assert_eq!(exit_code(&err), Some(1));
        assert_eq!(fx.runner.call_count(), 1);
    }

    #[test]
    fn test_remove_interpreter_reassigns_default() {
        let fx = Fixture::new(vec![]);
        let a = fx.python("a");
        let b = fx.python("b");
        let mut engine = fx.engine(vec![]);
        engine.add_interpreter(&b).unwrap();
        engine.set_default_interpreter(Some(&a), false).unwrap();

        engine.remove_interpreter(Some(&a)).unwrap();
        let registry = fx.registry();
        assert_eq!(registry.interpreters, vec![b.clone()]);
        assert_eq!(registry.default_interpreter, Some(b));

        let err = engine.remove_interpreter(Some(&a)).unwrap_err();
        assert_eq!(exit_code(&err), Some(2));
    }

    #[test]
    fn test_template_remove_package_is_one_based() {
        let fx = Fixture::new(vec![]);
        let engine = fx.engine(vec![]);
        engine.template_add("ml", &["numpy".into()], None).unwrap();
        engine
            .template_add_packages("ml", &["pandas".into()], None)
            .unwrap();

        let err = engine.template_remove_package("ml", 0).unwrap_err();
        assert_eq!(exit_code(&err), Some(2));
        let err = engine.template_remove_package("ml", 3).unwrap_err();
        assert!(err.to_string().contains("Index 3"));

        engine.template_remove_package("ml", 2).unwrap();
        let registry = TemplateStore::new(&fx.config_dir()).load();
        assert_eq!(registry.get("ml").unwrap().entries().len(), 1);
    }

    #[test]
    fn test_seeding_happens_once() {
        let fx = Fixture::new(vec![]);
        Engine::with_io(
            fx.config_dir(),
            fx.cwd(),
            Some("/usr/bin/python3".into()),
            Box::new(ScriptedPrompter::default()),
            Box::new(SharedRunner(fx.runner.clone())),
        )
        .unwrap();

        let registry = fx.registry();
        assert_eq!(registry.default_interpreter, Some("/usr/bin/python3".into()));
        assert_eq!(registry.interpreters, vec![PathBuf::from("/usr/bin/python3")]);
    }

    #[test]
    fn test_malformed_templates_are_not_overwritten() {
        let fx = Fixture::new(vec![]);
        let store = TemplateStore::new(&fx.config_dir());
        std::fs::create_dir_all(fx.config_dir()).unwrap();
        let content = r#"{"templates": {"mine": ["requests"], "bad": [{"packages": ["x"], "args": [1]}]}}"#;
        std::fs::write(store.path(), content).unwrap();

        let engine = fx.engine(vec![]);
        let err = engine
            .template_add("new", &["flask".into()], None)
            .unwrap_err();
        assert_eq!(exit_code(&err), Some(1));
        assert!(engine.template_remove("mine").is_err());
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), content);
    }
}
