use std::path::{Path, PathBuf};

use log::debug;
use toml::Table;

use crate::{
    config::Config,
    installer::{InstallEnvironment, NoopInstaller, PackageInstaller},
    locker::{LockError, LockStore, Locker},
    model::lock::LockFile,
    project::ProjectComponents,
    repository::{Pool, Repository},
    resolver::ResolverTiming,
};

pub const DEFAULT_PROGRESS_RATE: u64 = 3600;

/// File name recorded by the isolated configuration. Never read.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Reports the same progress rate no matter how fast the solver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedTiming(u64);

impl FixedTiming {
    pub fn new(rate: u64) -> Self {
        FixedTiming(rate)
    }
}

impl Default for FixedTiming {
    fn default() -> Self {
        FixedTiming(DEFAULT_PROGRESS_RATE)
    }
}

impl ResolverTiming for FixedTiming {
    fn progress_rate(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardLockStore;

impl LockStore for DiscardLockStore {
    fn write(&self, path: &Path, data: &LockFile) -> Result<(), LockError> {
        debug!(
            "Discarding {} locked packages for {}",
            data.packages.len(),
            path.display()
        );
        Ok(())
    }
}

/// A clean target environment: nothing is installed and every operation
/// goes to the shared [`NoopInstaller`].
#[derive(Debug, Clone, Default)]
pub struct HermeticEnvironment {
    installer: NoopInstaller,
}

impl HermeticEnvironment {
    pub fn new(installer: NoopInstaller) -> Self {
        HermeticEnvironment { installer }
    }
}

impl InstallEnvironment for HermeticEnvironment {
    fn installer(&self) -> Box<dyn PackageInstaller> {
        Box::new(self.installer.clone())
    }

    fn installed(&self) -> anyhow::Result<Repository> {
        Ok(Repository::named("installed"))
    }
}

/// Isolated configuration, a locker that never persists and an empty pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct HermeticComponents;

impl ProjectComponents for HermeticComponents {
    fn config(&self) -> anyhow::Result<Config> {
        Ok(Config::isolated(CONFIG_FILE_NAME))
    }

    fn locker(&self, lock: PathBuf, local_config: Table) -> anyhow::Result<Locker> {
        Ok(Locker::with_store(lock, local_config, Box::new(DiscardLockStore))?)
    }

    fn pool(&self, _config: &Config) -> Pool {
        Pool::default()
    }
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;
    use crate::repository::Package;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixed_timing_ignores_steps() {
        let timing = FixedTiming::default();
        assert_eq!(timing.progress_rate(), DEFAULT_PROGRESS_RATE);
        for _ in 0..10_000 {
            timing.record_step();
        }
        assert_eq!(timing.progress_rate(), DEFAULT_PROGRESS_RATE);
    }

    #[test]
    fn hermetic_environment_is_empty_and_shares_installer() {
        let installer = NoopInstaller::new();
        let environment = HermeticEnvironment::new(installer.clone());
        assert!(environment.installed().unwrap().is_empty());

        let package = Package::new("cleo", Version::new(0, 6, 8));
        environment.installer().install(&package).unwrap();
        assert_eq!(installer.installs(), vec![package]);
    }

    #[test]
    fn discarding_locker_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.lock");
        let mut locker = HermeticComponents.locker(path.clone(), Table::new()).unwrap();

        let packages = vec![Package::new("cleo", Version::new(0, 6, 8))];
        assert!(locker.set_lock_data(&packages).unwrap());
        assert!(!path.exists());
        assert!(!locker.is_locked());
    }

    #[test]
    fn hermetic_components_are_isolated() {
        let config = HermeticComponents.config().unwrap();
        assert_eq!(config, Config::isolated(CONFIG_FILE_NAME));
        assert!(HermeticComponents.pool(&config).repositories().is_empty());
    }
}
