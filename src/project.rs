use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{debug, info};
use toml::Table;

use crate::{
    config::Config,
    locker::Locker,
    model::manifest::ProjectDescriptor,
    repository::{Pool, Repository, DEFAULT_SOURCE},
};

pub const MANIFEST_FILE_NAME: &str = "project.toml";
pub const LOCK_FILE_NAME: &str = "project.lock";

/// Builds the environment-dependent parts of a [`Project`].
pub trait ProjectComponents {
    fn config(&self) -> anyhow::Result<Config>;

    fn locker(&self, lock: PathBuf, local_config: Table) -> anyhow::Result<Locker>;

    fn pool(&self, config: &Config) -> Pool;
}

/// Global configuration, a lock file on disk and the public index.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemComponents;

impl ProjectComponents for SystemComponents {
    fn config(&self) -> anyhow::Result<Config> {
        Config::load(Config::default_file().as_deref())
    }

    fn locker(&self, lock: PathBuf, local_config: Table) -> anyhow::Result<Locker> {
        Ok(Locker::new(lock, local_config)?)
    }

    fn pool(&self, config: &Config) -> Pool {
        let pool = Pool::default();
        for (name, url) in &config.repositories {
            debug!("Adding repository {} ({})", name, url);
            pool.add_repository(Repository::named(name));
        }
        pool.add_repository(Repository::named(DEFAULT_SOURCE));
        pool
    }
}

#[derive(Debug)]
pub struct Project {
    file: PathBuf,
    local_config: Table,
    package: ProjectDescriptor,
    locker: Locker,
    config: Config,
    pool: Pool,
}

impl Project {
    pub fn new(
        file: PathBuf,
        local_config: Table,
        package: ProjectDescriptor,
        locker: Locker,
        config: Config,
        pool: Pool,
    ) -> Self {
        Project {
            file,
            local_config,
            package,
            locker,
            config,
            pool,
        }
    }

    pub fn create(path: &Path) -> anyhow::Result<Self> {
        Self::create_with(path, &SystemComponents)
    }

    /// Loads the project whose manifest is `path`, or lives in the directory `path`.
    pub fn create_with(path: &Path, components: &dyn ProjectComponents) -> anyhow::Result<Self> {
        let file = if path.is_dir() {
            path.join(MANIFEST_FILE_NAME)
        } else {
            path.to_path_buf()
        };

        let contents = std::fs::read_to_string(&file)
            .with_context(|| format!("Could not read manifest {}", file.display()))?;
        let local_config: Table = toml::from_str(&contents)
            .with_context(|| format!("Invalid manifest {}", file.display()))?;
        let package = ProjectDescriptor::from_table(&local_config)?;

        let locker = components.locker(file.with_file_name(LOCK_FILE_NAME), local_config.clone())?;
        let config = components.config()?;
        let pool = components.pool(&config);

        info!("Loaded project {} {}", package.name, package.version);

        Ok(Project::new(file, local_config, package, locker, config, pool))
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory holding the manifest. `.` for a bare relative file name.
    pub fn root(&self) -> &Path {
        self.file
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    pub fn local_config(&self) -> &Table {
        &self.local_config
    }

    pub fn package(&self) -> &ProjectDescriptor {
        &self.package
    }

    pub fn locker(&self) -> &Locker {
        &self.locker
    }

    pub fn locker_mut(&mut self) -> &mut Locker {
        &mut self.locker
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn set_pool(&mut self, pool: Pool) {
        self.pool = pool;
    }
}
