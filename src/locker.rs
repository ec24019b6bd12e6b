use std::path::{Path, PathBuf};

use log::{debug, info};
use sha2::{Digest, Sha256};
use thiserror::Error;
use toml::Table;

use crate::{
    model::{
        lock::{LockFile, LockMetadata},
        ParseError,
    },
    repository::{Package, Repository},
};

/// Manifest keys whose content decides whether a lock file is still fresh.
const RELEVANT_KEYS: [&str; 3] = ["dependencies", "dev-dependencies", "source"];

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Error while parsing lock file: {0}")]
    Parse(#[from] ParseError),
    #[error("Error while serializing lock file: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Error while hashing manifest content: {0}")]
    Hash(#[from] serde_json::Error),
    #[error("Invalid version in locked package: {0}")]
    Version(#[from] semver::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Where lock data ends up once it has been computed.
pub trait LockStore {
    fn write(&self, path: &Path, data: &LockFile) -> Result<(), LockError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FileLockStore;

impl LockStore for FileLockStore {
    fn write(&self, path: &Path, data: &LockFile) -> Result<(), LockError> {
        std::fs::write(path, data.to_string()?)?;
        info!("Wrote lock file to {}", path.display());
        Ok(())
    }
}

pub struct Locker {
    lock: PathBuf,
    local_config: Table,
    content_hash: String,
    lock_data: Option<LockFile>,
    store: Box<dyn LockStore>,
}

impl Locker {
    pub fn new(lock: impl Into<PathBuf>, local_config: Table) -> Result<Self, LockError> {
        Self::with_store(lock, local_config, Box::new(FileLockStore))
    }

    pub fn with_store(
        lock: impl Into<PathBuf>,
        local_config: Table,
        store: Box<dyn LockStore>,
    ) -> Result<Self, LockError> {
        let content_hash = content_hash(&local_config)?;
        Ok(Locker {
            lock: lock.into(),
            local_config,
            content_hash,
            lock_data: None,
            store,
        })
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock
    }

    pub fn local_config(&self) -> &Table {
        &self.local_config
    }

    /// Hash of the dependency sections as they were when this locker was built.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn is_locked(&self) -> bool {
        self.lock.exists()
    }

    pub fn lock_data(&mut self) -> Result<&LockFile, LockError> {
        let data = match self.lock_data.take() {
            Some(data) => data,
            None => {
                debug!("Reading lock file {}", self.lock.display());
                LockFile::from_file(&self.lock)?
            }
        };
        Ok(self.lock_data.insert(data))
    }

    pub fn is_fresh(&mut self) -> Result<bool, LockError> {
        let hash = self.content_hash.clone();
        Ok(self.lock_data()?.metadata.content_hash == hash)
    }

    pub fn locked_repository(&mut self) -> Result<Repository, LockError> {
        if !self.is_locked() {
            return Ok(Repository::named("locked"));
        }
        let packages = self
            .lock_data()?
            .packages
            .iter()
            .map(Package::from_locked)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Repository::with_packages("locked", packages))
    }

    /// Records `packages` as the resolved set. Returns false when the lock was already up to date.
    pub fn set_lock_data(&mut self, packages: &[Package]) -> Result<bool, LockError> {
        let mut locked: Vec<_> = packages.iter().map(Package::to_locked).collect();
        locked.sort_by(|a, b| a.name.cmp(&b.name));
        let data = LockFile {
            packages: locked,
            metadata: LockMetadata {
                content_hash: self.content_hash.clone(),
            },
        };

        if self.is_locked() && self.lock_data()? == &data {
            debug!("Lock file is up to date");
            return Ok(false);
        }

        self.write_lock_data(data)?;
        Ok(true)
    }

    pub fn write_lock_data(&mut self, data: LockFile) -> Result<(), LockError> {
        self.store.write(&self.lock, &data)?;
        self.lock_data = None;
        Ok(())
    }
}

impl std::fmt::Debug for Locker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Locker")
            .field("lock", &self.lock)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

fn content_hash(local_config: &Table) -> Result<String, LockError> {
    let mut relevant = serde_json::Map::new();
    for key in RELEVANT_KEYS {
        let value = match local_config.get(key) {
            Some(value) => serde_json::to_value(value)?,
            None => serde_json::Value::Null,
        };
        relevant.insert(key.to_string(), value);
    }
    let json = serde_json::to_string(&serde_json::Value::Object(relevant))?;
    Ok(hex::encode(Sha256::digest(json.as_bytes())))
}

#[cfg(test)]
mod tests {
    use semver::Version;

    use super::*;
    use pretty_assertions::assert_eq;

    fn manifest(dependencies: &str) -> Table {
        toml::from_str(&format!(
            "[package]\nname = \"demo\"\nversion = \"1.0.0\"\n\n[dependencies]\n{dependencies}\n"
        ))
        .unwrap()
    }

    #[test]
    fn content_hash_ignores_package_metadata() {
        let a = manifest("cleo = \"^0.6\"");
        let mut b = a.clone();
        b.insert("package".to_string(), toml::Value::Table(Table::new()));
        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
        assert_ne!(
            content_hash(&a).unwrap(),
            content_hash(&manifest("cleo = \"^0.7\"")).unwrap()
        );
    }

    #[test]
    fn content_hash_is_fixed_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let locker = Locker::new(dir.path().join("project.lock"), manifest("")).unwrap();
        assert_eq!(locker.content_hash(), content_hash(&manifest("")).unwrap());
        assert_eq!(locker.content_hash().len(), 64);
    }

    #[test]
    fn set_lock_data_writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.lock");
        let mut locker = Locker::new(&path, manifest("cleo = \"^0.6\"")).unwrap();
        assert!(!locker.is_locked());

        let packages = vec![Package::new("cleo", Version::new(0, 6, 8))];
        assert!(locker.set_lock_data(&packages).unwrap());
        assert!(locker.is_locked());
        assert!(locker.is_fresh().unwrap());
        assert!(!locker.set_lock_data(&packages).unwrap());

        let locked = locker.locked_repository().unwrap();
        assert_eq!(locked.packages(), packages);
    }

    #[test]
    fn stale_lock_is_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("project.lock");
        Locker::new(&path, manifest("cleo = \"^0.6\""))
            .unwrap()
            .set_lock_data(&[])
            .unwrap();

        let mut locker = Locker::new(&path, manifest("cleo = \"^0.7\"")).unwrap();
        assert!(!locker.is_fresh().unwrap());
    }
}
