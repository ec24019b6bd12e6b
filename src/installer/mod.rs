use std::fmt::{Display, Formatter};

use log::{info, warn};

use crate::{
    git::VcsClient,
    project::Project,
    repository::{Package, Repository},
    resolver::{Provider, ResolverTiming, Solver},
};

mod noop;

pub use noop::NoopInstaller;

/// Applies package operations to a target environment.
pub trait PackageInstaller {
    fn install(&mut self, package: &Package) -> anyhow::Result<()>;

    fn update(&mut self, from: &Package, to: &Package) -> anyhow::Result<()>;

    fn remove(&mut self, package: &Package) -> anyhow::Result<()>;
}

/// The target environment packages are installed into.
pub trait InstallEnvironment {
    fn installer(&self) -> Box<dyn PackageInstaller>;

    /// Packages already present in the environment.
    fn installed(&self) -> anyhow::Result<Repository>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Install(Package),
    Update { from: Package, to: Package },
    Uninstall(Package),
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Install(package) => write!(f, "Installing {}", package),
            Operation::Update { from, to } => {
                write!(f, "Updating {} ({} -> {})", to.name, from.version, to.version)
            }
            Operation::Uninstall(package) => write!(f, "Removing {}", package),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub operations: Vec<Operation>,
    /// Solver progress lines; empty when installing straight from a fresh lock file.
    pub progress: Vec<String>,
    pub lock_updated: bool,
}

/// Brings an environment in line with a project's dependencies.
pub struct Installer<'a> {
    project: &'a mut Project,
    environment: &'a dyn InstallEnvironment,
    vcs: &'a dyn VcsClient,
    timing: &'a dyn ResolverTiming,
    update: bool,
    dry_run: bool,
    remove_untracked: bool,
}

impl<'a> Installer<'a> {
    pub fn new(
        project: &'a mut Project,
        environment: &'a dyn InstallEnvironment,
        vcs: &'a dyn VcsClient,
        timing: &'a dyn ResolverTiming,
    ) -> Self {
        Installer {
            project,
            environment,
            vcs,
            timing,
            update: false,
            dry_run: false,
            remove_untracked: false,
        }
    }

    /// Ignore the lock file and resolve from scratch.
    pub fn update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    /// Compute operations without executing them or writing the lock file.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Also remove installed packages the project does not require.
    pub fn remove_untracked(mut self, remove_untracked: bool) -> Self {
        self.remove_untracked = remove_untracked;
        self
    }

    pub fn run(self) -> anyhow::Result<InstallReport> {
        let Installer {
            project,
            environment,
            vcs,
            timing,
            update,
            dry_run,
            remove_untracked,
        } = self;

        let locked = project.locker().is_locked() && !update;
        let fresh = locked && project.locker_mut().is_fresh()?;

        let (packages, progress, lock_updated) = if fresh {
            info!("Installing dependencies from lock file");
            let packages = project.locker_mut().locked_repository()?.packages();
            (packages, Vec::new(), false)
        } else {
            if locked {
                warn!("The lock file is not up to date with the latest changes in the manifest");
            }
            let preferred = if locked {
                Some(project.locker_mut().locked_repository()?)
            } else {
                None
            };

            let provider = Provider::new(vcs, timing)
                .with_scratch_dir(project.config().cache_dir.clone());
            let mut solver = Solver::new(project.pool(), &provider);
            if let Some(preferred) = preferred {
                solver = solver.with_locked(preferred);
            }
            let resolution = solver.solve(project.package())?;

            let lock_updated =
                !dry_run && project.locker_mut().set_lock_data(&resolution.packages)?;
            (resolution.packages, resolution.progress, lock_updated)
        };

        let installed = environment.installed()?;
        let operations = operations(&packages, &installed, remove_untracked);

        if !dry_run {
            let mut installer = environment.installer();
            for operation in &operations {
                info!("{}", operation);
                match operation {
                    Operation::Install(package) => installer.install(package)?,
                    Operation::Update { from, to } => installer.update(from, to)?,
                    Operation::Uninstall(package) => installer.remove(package)?,
                }
            }
        }

        Ok(InstallReport {
            operations,
            progress,
            lock_updated,
        })
    }
}

fn same_install(a: &Package, b: &Package) -> bool {
    a.version == b.version
        && a.source.as_ref().map(|s| &s.resolved_reference)
            == b.source.as_ref().map(|s| &s.resolved_reference)
}

fn operations(
    packages: &[Package],
    installed: &Repository,
    remove_untracked: bool,
) -> Vec<Operation> {
    let mut operations = Vec::new();
    for package in packages {
        match installed.find(&package.name) {
            None => operations.push(Operation::Install(package.clone())),
            Some(current) if same_install(&current, package) => {}
            Some(current) => operations.push(Operation::Update {
                from: current,
                to: package.clone(),
            }),
        }
    }

    if remove_untracked {
        for current in installed.packages() {
            if !packages.iter().any(|p| p.name == current.name) {
                operations.push(Operation::Uninstall(current));
            }
        }
    }
    operations
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;
    use pretty_assertions::assert_eq;

    fn package(name: &str, version: &str) -> Package {
        Package::new(name, Version::parse(version).unwrap())
    }

    #[test]
    fn operations_against_installed() {
        let installed = Repository::with_packages(
            "installed",
            [
                package("cleo", "0.6.1"),
                package("pastel", "0.1.0"),
                package("stray", "1.0.0"),
            ],
        );
        let packages = vec![
            package("cleo", "0.6.8"),
            package("pastel", "0.1.0"),
            package("tomlkit", "0.4.0"),
        ];

        assert_eq!(
            operations(&packages, &installed, false),
            vec![
                Operation::Update {
                    from: package("cleo", "0.6.1"),
                    to: package("cleo", "0.6.8"),
                },
                Operation::Install(package("tomlkit", "0.4.0")),
            ]
        );
        assert_eq!(
            operations(&packages, &installed, true).last(),
            Some(&Operation::Uninstall(package("stray", "1.0.0")))
        );
    }

    #[test]
    fn operations_display() {
        let update = Operation::Update {
            from: package("cleo", "0.6.1"),
            to: package("cleo", "0.6.8"),
        };
        assert_eq!(update.to_string(), "Updating cleo (0.6.1 -> 0.6.8)");
        assert_eq!(
            Operation::Install(package("cleo", "0.6.8")).to_string(),
            "Installing cleo (0.6.8)"
        );
    }
}
