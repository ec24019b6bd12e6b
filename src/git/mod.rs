use std::path::{Path, PathBuf};

use thiserror::Error;

mod client;

pub use client::GitClient;

#[derive(Error, Debug)]
pub enum VcsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),
    #[error("Invalid repository locator {locator}: {reason}")]
    InvalidLocator { locator: String, reason: String },
    #[error("No fixture repository for {locator} at {}", path.display())]
    MissingFixture { locator: String, path: PathBuf },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// The version-control operations a dependency manager performs on remote sources.
pub trait VcsClient {
    /// Populates `dest` with the contents of the repository at `source`.
    fn clone_repository(&self, source: &str, dest: &Path) -> Result<(), VcsError>;

    /// Switches the working tree in `folder` to `reference`.
    fn checkout(&self, reference: &str, folder: &Path) -> Result<(), VcsError>;

    /// Resolves `reference` in `folder` to a full commit hash.
    fn rev_parse(&self, reference: &str, folder: &Path) -> Result<String, VcsError>;
}

impl<T: VcsClient + ?Sized> VcsClient for &T {
    fn clone_repository(&self, source: &str, dest: &Path) -> Result<(), VcsError> {
        (**self).clone_repository(source, dest)
    }

    fn checkout(&self, reference: &str, folder: &Path) -> Result<(), VcsError> {
        (**self).checkout(reference, folder)
    }

    fn rev_parse(&self, reference: &str, folder: &Path) -> Result<String, VcsError> {
        (**self).rev_parse(reference, folder)
    }
}
