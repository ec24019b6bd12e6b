use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::{
    git::VcsClient,
    model::manifest::{Dependency, DependencySource, GitReference, ProjectDescriptor},
    project::MANIFEST_FILE_NAME,
    repository::{Package, PackageSource, Pool, Repository},
};

use super::{timing::ResolverTiming, SolveError};

/// Answers the solver's questions about available packages.
pub struct Provider<'a> {
    vcs: &'a dyn VcsClient,
    timing: &'a dyn ResolverTiming,
    scratch_dir: Option<PathBuf>,
}

impl<'a> Provider<'a> {
    pub fn new(vcs: &'a dyn VcsClient, timing: &'a dyn ResolverTiming) -> Self {
        Provider {
            vcs,
            timing,
            scratch_dir: None,
        }
    }

    /// Directory under which VCS dependencies are cloned. Defaults to the system temp dir.
    pub fn with_scratch_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.scratch_dir = dir;
        self
    }

    pub fn progress_rate(&self) -> u64 {
        self.timing.progress_rate().max(1)
    }

    pub fn record_step(&self) {
        self.timing.record_step()
    }

    /// Candidates for `dependency`, best first. A matching locked package wins outright.
    pub fn search_for(
        &self,
        dependency: &Dependency,
        pool: &Pool,
        locked: Option<&Repository>,
    ) -> Result<Vec<Package>, SolveError> {
        if let Some(package) = locked.and_then(|l| l.find_packages(dependency).into_iter().next()) {
            debug!("Using locked {} for {}", package, dependency);
            return Ok(vec![package]);
        }

        match &dependency.source {
            DependencySource::Registry => Ok(pool.find_packages(dependency)),
            DependencySource::Git { url, reference } => {
                let package = self.search_for_vcs(dependency, url, reference)?;
                if dependency.matches(&package.version) {
                    Ok(vec![package])
                } else {
                    Ok(vec![])
                }
            }
        }
    }

    fn search_for_vcs(
        &self,
        dependency: &Dependency,
        url: &str,
        reference: &GitReference,
    ) -> Result<Package, SolveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("depharness-vcs-");
        let checkout = match &self.scratch_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };

        info!("Cloning {} for {}", url, dependency.name);
        self.vcs.clone_repository(url, checkout.path())?;
        if reference != &GitReference::DefaultBranch {
            self.vcs.checkout(reference.as_str(), checkout.path())?;
        }
        let revision = self.vcs.rev_parse(reference.as_str(), checkout.path())?;

        let descriptor = read_descriptor(checkout.path())?;
        if descriptor.name != dependency.name {
            return Err(SolveError::NameMismatch {
                url: url.to_string(),
                expected: dependency.name.to_string(),
                found: descriptor.name.to_string(),
            });
        }

        Ok(Package {
            name: descriptor.name,
            version: descriptor.version,
            dependencies: descriptor.dependencies,
            source: Some(PackageSource {
                url: url.to_string(),
                reference: reference.clone(),
                resolved_reference: revision,
            }),
        })
    }
}

fn read_descriptor(checkout: &Path) -> Result<ProjectDescriptor, SolveError> {
    Ok(ProjectDescriptor::from_file(&checkout.join(MANIFEST_FILE_NAME))?)
}
