use std::{
    fmt::{Display, Formatter},
    path::Path,
};

use log::{debug, error};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use toml::{map::Map, Table, Value};

use crate::model::ParseError;

#[derive(Clone, Hash, Deserialize, Serialize, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(s: impl Into<String>) -> Self {
        PackageName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PackageName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        PackageName(s)
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        PackageName(s.to_string())
    }
}

/// Which ref of a VCS dependency should be checked out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum GitReference {
    #[default]
    DefaultBranch,
    Branch(String),
    Tag(String),
    Rev(String),
}

impl GitReference {
    /// Reference as understood by `rev_parse` and `checkout`.
    pub fn as_str(&self) -> &str {
        match self {
            GitReference::DefaultBranch => "HEAD",
            GitReference::Branch(s) | GitReference::Tag(s) | GitReference::Rev(s) => s,
        }
    }
}

impl Display for GitReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum DependencySource {
    #[default]
    Registry,
    Git {
        url: String,
        reference: GitReference,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: PackageName,
    pub constraint: VersionReq,
    pub source: DependencySource,
}

impl Dependency {
    pub fn new(name: impl Into<PackageName>, constraint: VersionReq) -> Self {
        Dependency {
            name: name.into(),
            constraint,
            source: DependencySource::Registry,
        }
    }

    pub fn git(
        name: impl Into<PackageName>,
        url: impl Into<String>,
        reference: GitReference,
    ) -> Self {
        Dependency {
            name: name.into(),
            constraint: VersionReq::STAR,
            source: DependencySource::Git {
                url: url.into(),
                reference,
            },
        }
    }

    pub fn is_vcs(&self) -> bool {
        matches!(self.source, DependencySource::Git { .. })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.constraint.matches(version)
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            DependencySource::Registry => write!(f, "{} ({})", self.name, self.constraint),
            DependencySource::Git { url, reference } => {
                write!(f, "{} ({} {})", self.name, url, reference)
            }
        }
    }
}

/// In-memory view of a `project.toml` manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    pub name: PackageName,
    pub version: Version,
    pub description: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub dev_dependencies: Vec<Dependency>,
}

impl ProjectDescriptor {
    pub fn new(name: impl Into<PackageName>, version: Version) -> Self {
        ProjectDescriptor {
            name: name.into(),
            version,
            description: None,
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<ProjectDescriptor, ParseError> {
        debug!("Attempting to read project descriptor from {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let descriptor = ProjectDescriptor::from_toml_str(&contents);
        if let Err(err) = &descriptor {
            error!("Could not build a valid descriptor from {}: {err}", path.display())
        }
        descriptor
    }

    pub fn from_toml_str(data: &str) -> Result<ProjectDescriptor, ParseError> {
        let table = toml::from_str::<Table>(data)?;
        ProjectDescriptor::from_table(&table)
    }

    pub fn from_table(table: &Table) -> Result<ProjectDescriptor, ParseError> {
        let package = table
            .get("package")
            .and_then(Value::as_table)
            .ok_or_else(|| ParseError::MissingKey("package".to_string()))?;

        let name = package
            .get("name")
            .ok_or_else(|| ParseError::MissingKey("package.name".to_string()))
            .and_then(|v| v.clone().try_into::<String>().map_err(|e| e.into()))?;

        let version = package
            .get("version")
            .ok_or_else(|| ParseError::MissingKey("package.version".to_string()))
            .and_then(|v| v.clone().try_into::<String>().map_err(|e| e.into()))
            .and_then(|v| Version::parse(&v).map_err(|e| e.into()))?;

        let description = package
            .get("description")
            .map(|v| v.clone().try_into::<String>())
            .map_or(Ok(None), |v| v.map(Some))?;

        Ok(ProjectDescriptor {
            name: PackageName::new(name),
            version,
            description,
            dependencies: parse_dependencies(table, "dependencies")?,
            dev_dependencies: parse_dependencies(table, "dev-dependencies")?,
        })
    }

    /// Every dependency the project needs installed, dev dependencies included.
    pub fn all_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.dependencies.iter().chain(self.dev_dependencies.iter())
    }

    pub fn into_toml(self) -> Value {
        let mut package = Map::new();
        package.insert("name".to_string(), Value::String(self.name.to_string()));
        package.insert("version".to_string(), Value::String(self.version.to_string()));
        if let Some(d) = self.description {
            package.insert("description".to_string(), Value::String(d));
        }

        let mut manifest = Map::new();
        manifest.insert("package".to_string(), Value::Table(package));
        manifest.insert(
            "dependencies".to_string(),
            dependencies_into_toml(self.dependencies),
        );
        if !self.dev_dependencies.is_empty() {
            manifest.insert(
                "dev-dependencies".to_string(),
                dependencies_into_toml(self.dev_dependencies),
            );
        }
        Value::Table(manifest)
    }
}

fn parse_dependencies(table: &Table, key: &str) -> Result<Vec<Dependency>, ParseError> {
    match table.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Table(entries)) => entries
            .iter()
            .map(|(name, value)| parse_dependency(name, value))
            .collect(),
        Some(_) => Err(ParseError::InvalidDependency {
            name: key.to_string(),
            reason: "expected a table of dependencies".to_string(),
        }),
    }
}

fn parse_dependency(name: &str, value: &Value) -> Result<Dependency, ParseError> {
    let invalid = |reason: &str| ParseError::InvalidDependency {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    match value {
        Value::String(constraint) => Ok(Dependency::new(name, VersionReq::parse(constraint)?)),
        Value::Table(table) => {
            let constraint = table
                .get("version")
                .map(|v| v.clone().try_into::<String>())
                .map_or(Ok(None), |v| v.map(Some))?
                .map(|v| VersionReq::parse(&v))
                .transpose()?;

            let Some(url) = table.get("git") else {
                return constraint
                    .map(|constraint| Dependency::new(name, constraint))
                    .ok_or_else(|| invalid("expected `version` or `git`"));
            };
            let url = url.clone().try_into::<String>()?;

            let mut references = ["branch", "tag", "rev"]
                .into_iter()
                .filter_map(|key| table.get(key).map(|v| (key, v)));
            let reference = match (references.next(), references.next()) {
                (None, _) => GitReference::DefaultBranch,
                (Some(_), Some(_)) => {
                    return Err(invalid("only one of `branch`, `tag` or `rev` may be set"))
                }
                (Some((key, value)), None) => {
                    let value = value.clone().try_into::<String>()?;
                    match key {
                        "branch" => GitReference::Branch(value),
                        "tag" => GitReference::Tag(value),
                        _ => GitReference::Rev(value),
                    }
                }
            };

            let mut dependency = Dependency::git(name, url, reference);
            if let Some(constraint) = constraint {
                dependency.constraint = constraint;
            }
            Ok(dependency)
        }
        _ => Err(invalid("expected a version string or a table")),
    }
}

fn dependencies_into_toml(dependencies: Vec<Dependency>) -> Value {
    let mut table = Map::new();
    for d in dependencies {
        let value = match d.source {
            DependencySource::Registry => Value::String(d.constraint.to_string()),
            DependencySource::Git { url, reference } => {
                let mut git = Map::new();
                git.insert("git".to_string(), Value::String(url));
                match reference {
                    GitReference::DefaultBranch => {}
                    GitReference::Branch(b) => {
                        git.insert("branch".to_string(), Value::String(b));
                    }
                    GitReference::Tag(t) => {
                        git.insert("tag".to_string(), Value::String(t));
                    }
                    GitReference::Rev(r) => {
                        git.insert("rev".to_string(), Value::String(r));
                    }
                }
                if d.constraint != VersionReq::STAR {
                    git.insert("version".to_string(), Value::String(d.constraint.to_string()));
                }
                Value::Table(git)
            }
        };
        table.insert(d.name.to_string(), value);
    }
    Value::Table(table)
}
