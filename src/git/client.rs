use std::path::Path;

use git2::{build::CheckoutBuilder, build::RepoBuilder, Oid, Repository};
use log::{debug, trace};

use super::{VcsClient, VcsError};

/// [`VcsClient`] backed by libgit2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitClient;

impl GitClient {
    /// Branches of a fresh clone only exist as `origin/<branch>`.
    fn commit_for_obj_str(repo: &Repository, reference: &str) -> Result<Oid, VcsError> {
        let object = match repo.revparse_single(reference) {
            Ok(object) => object,
            Err(error) if error.code() == git2::ErrorCode::NotFound => {
                trace!("{} not found, trying origin/{}", reference, reference);
                repo.revparse_single(&format!("origin/{reference}"))
                    .map_err(|_| error)?
            }
            Err(error) => return Err(error.into()),
        };
        Ok(object.peel_to_commit()?.id())
    }
}

impl VcsClient for GitClient {
    fn clone_repository(&self, source: &str, dest: &Path) -> Result<(), VcsError> {
        trace!("Cloning repo {} into {}", source, dest.display());
        RepoBuilder::new().clone(source, dest)?;
        Ok(())
    }

    fn checkout(&self, reference: &str, folder: &Path) -> Result<(), VcsError> {
        let repo = Repository::open(folder)?;
        let oid = Self::commit_for_obj_str(&repo, reference)?;
        let commit = repo.find_commit(oid)?;

        debug!("Checking out {} ({}) in {}", reference, oid, folder.display());
        repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        repo.set_head_detached(oid)?;
        Ok(())
    }

    fn rev_parse(&self, reference: &str, folder: &Path) -> Result<String, VcsError> {
        let repo = Repository::open(folder)?;
        Ok(Self::commit_for_obj_str(&repo, reference)?.to_string())
    }
}
