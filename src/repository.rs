//! Package sources consulted during resolution.
//!
//! [`Repository`] and [`Pool`] are shared handles: cloning one yields another
//! handle onto the same underlying store. A test can therefore keep adding
//! packages to a repository after it has been placed in a pool, and an
//! application reset can re-attach the exact pool it had before.

use std::{
    cell::RefCell,
    fmt::{Display, Formatter},
    rc::Rc,
};

use semver::Version;

use crate::model::{
    lock::{LockedPackage, LockedSource},
    manifest::{Dependency, DependencySource, GitReference, PackageName},
};

/// Name of the default public package index.
pub const DEFAULT_SOURCE: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    pub url: String,
    pub reference: GitReference,
    pub resolved_reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: PackageName,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    pub source: Option<PackageSource>,
}

impl Package {
    pub fn new(name: impl Into<PackageName>, version: Version) -> Self {
        Package {
            name: name.into(),
            version,
            dependencies: Vec::new(),
            source: None,
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Whether this package can stand in for `dependency`.
    pub fn satisfies(&self, dependency: &Dependency) -> bool {
        if self.name != dependency.name || !dependency.matches(&self.version) {
            return false;
        }
        match (&dependency.source, &self.source) {
            (DependencySource::Registry, None) => true,
            (DependencySource::Git { url, reference }, Some(source)) => {
                url == &source.url && reference.as_str() == source.reference.as_str()
            }
            _ => false,
        }
    }

    pub fn to_locked(&self) -> LockedPackage {
        LockedPackage {
            name: self.name.clone(),
            version: self.version.clone(),
            source: self.source.as_ref().map(|source| LockedSource {
                kind: "git".to_string(),
                url: source.url.clone(),
                reference: source.reference.to_string(),
                resolved_reference: source.resolved_reference.clone(),
            }),
            dependencies: self
                .dependencies
                .iter()
                .map(|d| (d.name.to_string(), d.constraint.to_string()))
                .collect(),
        }
    }

    pub fn from_locked(locked: &LockedPackage) -> Result<Package, semver::Error> {
        let dependencies = locked
            .dependencies
            .iter()
            .map(|(name, constraint)| {
                semver::VersionReq::parse(constraint)
                    .map(|constraint| Dependency::new(name.as_str(), constraint))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Package {
            name: locked.name.clone(),
            version: locked.version.clone(),
            dependencies,
            source: locked.source.as_ref().map(|source| PackageSource {
                url: source.url.clone(),
                reference: match source.reference.as_str() {
                    "HEAD" => GitReference::DefaultBranch,
                    reference => GitReference::Rev(reference.to_string()),
                },
                resolved_reference: source.resolved_reference.clone(),
            }),
        })
    }
}

impl Display for Package {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            None => write!(f, "{} ({})", self.name, self.version),
            Some(source) => write!(
                f,
                "{} ({} {})",
                self.name,
                self.version,
                source
                    .resolved_reference
                    .get(..7)
                    .unwrap_or(&source.resolved_reference)
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Repository {
    name: Rc<str>,
    packages: Rc<RefCell<Vec<Package>>>,
}

impl Default for Repository {
    fn default() -> Self {
        Repository::named("")
    }
}

impl Repository {
    pub fn named(name: &str) -> Self {
        Repository {
            name: Rc::from(name),
            packages: Rc::default(),
        }
    }

    pub fn with_packages(name: &str, packages: impl IntoIterator<Item = Package>) -> Self {
        let repository = Repository::named(name);
        for package in packages {
            repository.add_package(package);
        }
        repository
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_package(&self, package: Package) {
        self.packages.borrow_mut().push(package);
    }

    pub fn remove_package(&self, name: &PackageName) -> Option<Package> {
        let mut packages = self.packages.borrow_mut();
        let index = packages.iter().position(|p| &p.name == name)?;
        Some(packages.remove(index))
    }

    pub fn packages(&self) -> Vec<Package> {
        self.packages.borrow().clone()
    }

    pub fn find(&self, name: &PackageName) -> Option<Package> {
        self.packages
            .borrow()
            .iter()
            .find(|p| &p.name == name)
            .cloned()
    }

    /// Packages satisfying `dependency`, highest version first.
    pub fn find_packages(&self, dependency: &Dependency) -> Vec<Package> {
        let mut found: Vec<Package> = self
            .packages
            .borrow()
            .iter()
            .filter(|p| p.satisfies(dependency))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.version.cmp(&a.version));
        found
    }

    pub fn has_package(&self, package: &Package) -> bool {
        self.packages.borrow().iter().any(|p| p == package)
    }

    pub fn len(&self) -> usize {
        self.packages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Repository) -> bool {
        Rc::ptr_eq(&self.packages, &other.packages)
    }
}

/// Ordered set of repositories consulted during resolution.
#[derive(Debug, Clone, Default)]
pub struct Pool {
    repositories: Rc<RefCell<Vec<Repository>>>,
}

impl Pool {
    pub fn add_repository(&self, repository: Repository) {
        self.repositories.borrow_mut().push(repository);
    }

    /// Returns whether a repository called `name` was present.
    pub fn remove_repository(&self, name: &str) -> bool {
        let mut repositories = self.repositories.borrow_mut();
        let before = repositories.len();
        repositories.retain(|r| r.name() != name);
        repositories.len() != before
    }

    pub fn has_repository(&self, name: &str) -> bool {
        self.repositories.borrow().iter().any(|r| r.name() == name)
    }

    pub fn repository(&self, name: &str) -> Option<Repository> {
        self.repositories
            .borrow()
            .iter()
            .find(|r| r.name() == name)
            .cloned()
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.repositories.borrow().clone()
    }

    /// Candidates in repository order; within a repository, highest version first.
    pub fn find_packages(&self, dependency: &Dependency) -> Vec<Package> {
        self.repositories
            .borrow()
            .iter()
            .flat_map(|r| r.find_packages(dependency))
            .collect()
    }

    pub fn ptr_eq(&self, other: &Pool) -> bool {
        Rc::ptr_eq(&self.repositories, &other.repositories)
    }
}

#[cfg(test)]
mod tests {
    use semver::VersionReq;

    use super::*;
    use pretty_assertions::assert_eq;

    fn package(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    #[test]
    fn repository_handles_share_packages() {
        let repo = Repository::named("repo");
        let pool = Pool::default();
        pool.add_repository(repo.clone());

        repo.add_package(package("cleo", "0.6.8"));

        let dependency = Dependency::new("cleo", VersionReq::parse("^0.6").unwrap());
        assert_eq!(pool.find_packages(&dependency), vec![package("cleo", "0.6.8")]);
        assert!(pool.repository("repo").unwrap().ptr_eq(&repo));
    }

    #[test]
    fn find_packages_highest_version_first() {
        let repo = Repository::with_packages(
            "repo",
            [
                package("cleo", "0.6.1"),
                package("cleo", "0.7.0"),
                package("cleo", "0.6.8"),
            ],
        );
        let dependency = Dependency::new("cleo", VersionReq::parse("^0.6").unwrap());
        let versions: Vec<String> = repo
            .find_packages(&dependency)
            .into_iter()
            .map(|p| p.version.to_string())
            .collect();
        assert_eq!(versions, vec!["0.6.8", "0.6.1"]);
    }

    #[test]
    fn remove_missing_repository_is_not_an_error() {
        let pool = Pool::default();
        assert!(!pool.remove_repository(DEFAULT_SOURCE));

        pool.add_repository(Repository::named(DEFAULT_SOURCE));
        pool.add_repository(Repository::named("repo"));
        assert!(pool.remove_repository(DEFAULT_SOURCE));
        assert!(!pool.has_repository(DEFAULT_SOURCE));
        assert_eq!(pool.repositories().len(), 1);
    }

    #[test]
    fn cloned_pool_keeps_identity() {
        let pool = Pool::default();
        let other = pool.clone();
        assert!(pool.ptr_eq(&other));
        assert!(!pool.ptr_eq(&Pool::default()));
    }

    #[test]
    fn git_package_round_trips_through_lock() {
        let mut pendulum = package("pendulum", "2.0.0")
            .with_dependency(Dependency::new("tzdata", VersionReq::parse("^1.0").unwrap()));
        pendulum.source = Some(PackageSource {
            url: "https://github.com/demo/pendulum.git".to_string(),
            reference: GitReference::Rev("2.0".to_string()),
            resolved_reference: "9cf87a285a2d3fbb0b9fa621997b3acc3631ed24".to_string(),
        });
        let locked = pendulum.to_locked();
        assert_eq!(Package::from_locked(&locked).unwrap(), pendulum);
    }
}
