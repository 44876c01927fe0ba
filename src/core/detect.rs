//! Discovery of Python installations in well-known locations.

use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;
use walkdir::WalkDir;

use super::process::find_on_path;

/// How long a candidate may take to answer `--version`
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_POLL: Duration = Duration::from_millis(20);

/// An interpreter that answered `--version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedInterpreter {
    pub path: PathBuf,
    pub version: String,
}

/// The interpreter this machine runs by default: first `python3` or `python` on `PATH`
pub fn current_runtime() -> Option<PathBuf> {
    find_on_path("python3").or_else(|| find_on_path("python"))
}

/// Directories searched for interpreters
#[derive(Debug, Clone, Default)]
pub struct SearchRoots {
    /// Directories whose `python*` executables are candidates
    pub bin_dirs: Vec<PathBuf>,
    /// Parents of one installation per subdirectory (pyenv versions, Windows installs)
    pub install_parents: Vec<PathBuf>,
    /// Conda installations; their own interpreter and each of `envs/*`
    pub conda_roots: Vec<PathBuf>,
}

impl SearchRoots {
    pub fn from_env() -> Self {
        let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let env_path = |key: &str| std::env::var_os(key).map(PathBuf::from);
        let mut roots = SearchRoots::default();

        if cfg!(windows) {
            roots.bin_dirs.extend(
                ["310", "311", "312", "313"]
                    .into_iter()
                    .map(|v| PathBuf::from(format!(r"C:\Python{}", v))),
            );
            if let Some(local) = env_path("LOCALAPPDATA") {
                roots.install_parents.push(local.join("Programs").join("Python"));
            }
        } else {
            roots.bin_dirs.extend(
                ["/usr/bin", "/usr/local/bin", "/opt/python"]
                    .into_iter()
                    .map(PathBuf::from),
            );
            if let Some(home) = &home {
                roots.bin_dirs.push(home.join(".local").join("bin"));
            }
        }

        let pyenv = env_path("PYENV_ROOT").or_else(|| home.as_ref().map(|h| h.join(".pyenv")));
        if let Some(pyenv) = pyenv {
            roots.install_parents.push(pyenv.join("versions"));
        }

        if let Some(home) = &home {
            for name in ["anaconda3", "miniconda3", "mambaforge"] {
                roots.conda_roots.push(home.join(name));
            }
        }
        roots.conda_roots.extend(env_path("CONDA_PREFIX"));
        roots
    }

    /// Every path that might be an interpreter, deduplicated and sorted
    pub fn candidates(&self) -> BTreeSet<PathBuf> {
        let mut found = BTreeSet::new();

        for dir in &self.bin_dirs {
            found.extend(
                list_dir(dir)
                    .into_iter()
                    .filter(|p| is_python_name(p) && is_executable(p)),
            );
        }

        for parent in &self.install_parents {
            for install in list_dir(parent) {
                found.extend(existing(install_python(&install)));
            }
        }

        for root in &self.conda_roots {
            found.extend(existing(install_python(root)));
            for env in list_dir(&root.join("envs")) {
                found.extend(existing(install_python(&env)));
            }
        }

        found.extend(current_runtime());
        found
    }
}

/// Probe every candidate and keep the ones reporting a Python version.
pub fn detect(roots: &SearchRoots) -> Vec<DetectedInterpreter> {
    let pattern = version_pattern();
    roots
        .candidates()
        .into_iter()
        .filter_map(|path| {
            let version = probe_version(&path, &pattern)?;
            Some(DetectedInterpreter { path, version })
        })
        .collect()
}

fn version_pattern() -> Regex {
    Regex::new(r"Python\s+(\d+\.\d+(?:\.\d+)?\S*)").expect("Invalid version regex")
}

fn probe_version(path: &Path, pattern: &Regex) -> Option<String> {
    let output = run_with_deadline(path, PROBE_TIMEOUT)?;
    if !output.status.success() {
        return None;
    }

    // Python 2 prints its version on stderr
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_version(&text, pattern)
}

/// Run `<program> --version`, killing it if it has not exited within `timeout`.
fn run_with_deadline(program: &Path, timeout: Duration) -> Option<Output> {
    let mut child = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| debug!("Skipped {}: {}", program.display(), e))
        .ok()?;

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => std::thread::sleep(PROBE_POLL),
            Ok(None) => {
                debug!("Skipped {}: no answer within {:?}", program.display(), timeout);
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
            Err(e) => {
                debug!("Skipped {}: {}", program.display(), e);
                return None;
            }
        }
    }

    child.wait_with_output().ok()
}

fn parse_version(text: &str, pattern: &Regex) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn list_dir(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .collect()
}

fn install_python(install: &Path) -> PathBuf {
    if cfg!(windows) {
        install.join("python.exe")
    } else {
        install.join("bin").join("python")
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

fn is_python_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("python") && !n.ends_with("-config"))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_version_variants() {
        let pattern = version_pattern();
        assert_eq!(parse_version("Python 3.12.4\n", &pattern), Some("3.12.4".into()));
        assert_eq!(parse_version("Python 2.7.18", &pattern), Some("2.7.18".into()));
        assert_eq!(parse_version("Python 3.13.0rc1", &pattern), Some("3.13.0rc1".into()));
        assert_eq!(parse_version("usage: python3-config", &pattern), None);
    }

    #[test]
    fn test_name_filter() {
        assert!(is_python_name(Path::new("/usr/bin/python3.11")));
        assert!(!is_python_name(Path::new("/usr/bin/python3-config")));
        assert!(!is_python_name(Path::new("/usr/bin/perl")));
    }

    #[cfg(unix)]
    #[test]
    fn test_candidates_cover_all_root_kinds() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let touch = |p: &Path, mode: u32| {
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "").unwrap();
            std::fs::set_permissions(p, std::fs::Permissions::from_mode(mode)).unwrap();
        };

        let bin = dir.path().join("bin");
        touch(&bin.join("python3.12"), 0o755);
        touch(&bin.join("python-notes"), 0o644);
        touch(&bin.join("ruby"), 0o755);

        let pyenv = dir.path().join("pyenv/versions");
        touch(&pyenv.join("3.11.9/bin/python"), 0o755);

        let conda = dir.path().join("miniconda3");
        touch(&conda.join("bin/python"), 0o755);
        touch(&conda.join("envs/ml/bin/python"), 0o755);

        let roots = SearchRoots {
            bin_dirs: vec![bin.clone(), dir.path().join("missing")],
            install_parents: vec![pyenv.clone()],
            conda_roots: vec![conda.clone()],
        };
        let candidates = roots.candidates();

        assert!(candidates.contains(&bin.join("python3.12")));
        assert!(!candidates.contains(&bin.join("python-notes")));
        assert!(!candidates.contains(&bin.join("ruby")));
        assert!(candidates.contains(&pyenv.join("3.11.9/bin/python")));
        assert!(candidates.contains(&conda.join("bin/python")));
        assert!(candidates.contains(&conda.join("envs/ml/bin/python")));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_gives_up_on_hanging_program() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("python-hangs");
        std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let started = Instant::now();
        assert!(run_with_deadline(&script, Duration::from_millis(200)).is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_reads_version_from_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("python2.7");
        std::fs::write(&script, "#!/bin/sh\necho 'Python 2.7.18' >&2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            probe_version(&script, &version_pattern()),
            Some("2.7.18".to_string())
        );
    }
}
