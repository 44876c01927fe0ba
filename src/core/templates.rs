use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::TEMPLATES_FILE;
use crate::error::{PynstalError, Result};

/// Templates shipped with the binary, used until the user writes their own copy
const BUNDLED_TEMPLATES: &str = include_str!("../templates.json");

/// One entry of a template: a single package, or a group installed with extra pip flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSpec {
    Simple(String),
    Grouped {
        #[serde(alias = "package", deserialize_with = "one_or_many")]
        packages: Vec<String>,
        #[serde(default, deserialize_with = "one_or_many")]
        args: Vec<String>,
    },
}

impl PackageSpec {
    pub fn packages(&self) -> &[String] {
        match self {
            PackageSpec::Simple(name) => std::slice::from_ref(name),
            PackageSpec::Grouped { packages, .. } => packages,
        }
    }

    pub fn args(&self) -> &[String] {
        match self {
            PackageSpec::Simple(_) => &[],
            PackageSpec::Grouped { args, .. } => args,
        }
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSpec::Simple(name) => write!(f, "{}", name),
            PackageSpec::Grouped { packages, args } if args.is_empty() => {
                write!(f, "{}", packages.join(", "))
            }
            PackageSpec::Grouped { packages, args } => {
                write!(f, "{} (args: {})", packages.join(", "), args.join(" "))
            }
        }
    }
}

/// Ordered package list of a single template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Template(pub Vec<PackageSpec>);

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Older files stored a compound template as a bare object
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Many(Vec<PackageSpec>),
            One(PackageSpec),
        }

        Ok(match Shape::deserialize(deserializer)? {
            Shape::Many(entries) => Template(entries),
            Shape::One(entry) => Template(vec![entry]),
        })
    }
}

impl Template {
    pub fn entries(&self) -> &[PackageSpec] {
        &self.0
    }

    pub fn contains_package(&self, name: &str) -> bool {
        self.0
            .iter()
            .any(|entry| entry.packages().iter().any(|p| p == name))
    }
}

/// Contents of `templates.json`. Templates keep the order they appear in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRegistry {
    #[serde(default, with = "in_file_order")]
    pub templates: Vec<(String, Template)>,
}

/// Outcome of appending packages to an existing template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddPackagesReport {
    pub added: Vec<String>,
    pub skipped: Vec<String>,
}

impl TemplateRegistry {
    pub fn get(&self, name: &str) -> Result<&Template> {
        self.templates
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, template)| template)
            .ok_or_else(|| PynstalError::TemplateNotFound(name.to_string()))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut Template> {
        self.templates
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, template)| template)
            .ok_or_else(|| PynstalError::TemplateNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn add(&mut self, name: &str, entries: Vec<PackageSpec>) -> Result<()> {
        if self.get(name).is_ok() {
            return Err(PynstalError::TemplateExists(name.to_string()));
        }
        self.templates.push((name.to_string(), Template(entries)));
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Template> {
        let position = self
            .templates
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| PynstalError::TemplateNotFound(name.to_string()))?;
        Ok(self.templates.remove(position).1)
    }

    /// Append packages to `name`, skipping ones it already lists.
    ///
    /// With `args`, the new packages form one grouped entry so the flags never
    /// attach to packages that were already in the template.
    pub fn add_packages(
        &mut self,
        name: &str,
        packages: &[String],
        args: Option<Vec<String>>,
    ) -> Result<AddPackagesReport> {
        let template = self.get_mut(name)?;

        let mut report = AddPackagesReport::default();
        for package in packages {
            if template.contains_package(package) || report.added.contains(package) {
                report.skipped.push(package.clone());
            } else {
                report.added.push(package.clone());
            }
        }

        if report.added.is_empty() {
            return Ok(report);
        }

        match args {
            Some(args) => template.0.push(PackageSpec::Grouped {
                packages: report.added.clone(),
                args,
            }),
            None => template
                .0
                .extend(report.added.iter().cloned().map(PackageSpec::Simple)),
        }
        Ok(report)
    }

    pub fn remove_package(&mut self, name: &str, index: usize) -> Result<PackageSpec> {
        let template = self.get_mut(name)?;

        if index >= template.0.len() {
            return Err(PynstalError::IndexOutOfRange {
                template: name.to_string(),
                index,
                len: template.0.len(),
            });
        }
        Ok(template.0.remove(index))
    }

    /// Entry for a freshly added template: all packages in one pip call
    pub fn group(packages: Vec<String>, args: Vec<String>) -> Vec<PackageSpec> {
        vec![PackageSpec::Grouped { packages, args }]
    }

    /// Registry compiled into the binary
    pub fn bundled() -> Self {
        serde_json::from_str(BUNDLED_TEMPLATES).unwrap_or_else(|e| {
            warn!("Bundled templates are unreadable: {}", e);
            Self::default()
        })
    }
}

/// Loads and saves the user-writable template registry
#[derive(Debug, Clone)]
pub struct TemplateStore {
    path: PathBuf,
}

impl TemplateStore {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join(TEMPLATES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prefer the user copy; fall back to the bundled seed when it is absent or unreadable.
    pub fn load(&self) -> TemplateRegistry {
        self.load_for_update().unwrap_or_else(|e| {
            warn!("Ignoring templates file {}: {}", self.path().display(), e);
            TemplateRegistry::bundled()
        })
    }

    /// Load for a read-modify-write. A user copy that exists but does not parse is an
    /// error, so saving never replaces it with the bundled seed.
    pub fn load_for_update(&self) -> Result<TemplateRegistry> {
        let content = match std::fs::read_to_string(self.path()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No user templates at {}, using bundled set", self.path().display());
                return Ok(TemplateRegistry::bundled());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| {
            PynstalError::Config(format!(
                "Malformed templates file {}: {}",
                self.path().display(),
                e
            ))
        })
    }

    pub fn save(&self, registry: &TemplateRegistry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(registry)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
        OneOrMany::Null(()) => Vec::new(),
    })
}

/// A JSON object kept as a list of pairs in the order the file lists them
mod in_file_order {
    use super::*;

    pub fn serialize<S>(pairs: &[(String, Template)], serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (name, template) in pairs {
            map.serialize_entry(name, template)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, Template)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, Template)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of templates")
            }

            fn visit_map<A>(self, mut access: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs: Vec<(String, Template)> = Vec::new();
                while let Some((name, template)) = access.next_entry::<String, Template>()? {
                    // Later duplicates win, as with any JSON object
                    match pairs.iter_mut().find(|(n, _)| *n == name) {
                        Some(slot) => slot.1 = template,
                        None => pairs.push((name, template)),
                    }
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}
