use std::collections::{BTreeMap, VecDeque};

use log::{debug, info};
use thiserror::Error;

use crate::{
    git::VcsError,
    model::{
        manifest::{Dependency, PackageName, ProjectDescriptor},
        ParseError,
    },
    repository::{Package, Pool, Repository},
};

mod provider;
mod timing;

pub use provider::Provider;
pub use timing::{AdaptiveTiming, ResolverTiming};

#[derive(Error, Debug)]
pub enum SolveError {
    #[error("Could not find a package matching {0}")]
    NotFound(String),
    #[error("{required_by} requires {dependency}, but {selected} was already selected")]
    Conflict {
        dependency: String,
        selected: String,
        required_by: String,
    },
    #[error("Repository {url} provides package {found}, expected {expected}")]
    NameMismatch {
        url: String,
        expected: String,
        found: String,
    },
    #[error("VCS error: {0}")]
    Vcs(#[from] VcsError),
    #[error("Error while parsing descriptor: {0}")]
    Parsing(#[from] ParseError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Selected packages ordered by name.
    pub packages: Vec<Package>,
    /// Progress lines emitted while solving, including the final summary.
    pub progress: Vec<String>,
    pub steps: u64,
}

pub struct Solver<'a> {
    pool: &'a Pool,
    provider: &'a Provider<'a>,
    locked: Option<Repository>,
}

impl<'a> Solver<'a> {
    pub fn new(pool: &'a Pool, provider: &'a Provider<'a>) -> Self {
        Solver {
            pool,
            provider,
            locked: None,
        }
    }

    /// Prefer versions from `locked` whenever they still satisfy a requirement.
    pub fn with_locked(mut self, locked: Repository) -> Self {
        self.locked = Some(locked);
        self
    }

    pub fn solve(&self, root: &ProjectDescriptor) -> Result<Resolution, SolveError> {
        let mut queue: VecDeque<(Dependency, PackageName)> = root
            .all_dependencies()
            .map(|d| (d.clone(), root.name.clone()))
            .collect();
        let mut selected: BTreeMap<PackageName, Package> = BTreeMap::new();
        let mut progress = Vec::new();
        let mut steps = 0u64;

        while let Some((dependency, required_by)) = queue.pop_front() {
            steps += 1;
            self.provider.record_step();
            if steps % self.provider.progress_rate() == 0 {
                let line = format!("Resolving dependencies... ({steps} steps)");
                info!("{}", line);
                progress.push(line);
            }

            if let Some(existing) = selected.get(&dependency.name) {
                if !existing.satisfies(&dependency) {
                    return Err(SolveError::Conflict {
                        dependency: dependency.to_string(),
                        selected: existing.to_string(),
                        required_by: required_by.to_string(),
                    });
                }
                continue;
            }

            let package = self
                .provider
                .search_for(&dependency, self.pool, self.locked.as_ref())?
                .into_iter()
                .next()
                .ok_or_else(|| SolveError::NotFound(dependency.to_string()))?;
            debug!("Selected {} for {}", package, dependency);

            for child in &package.dependencies {
                queue.push_back((child.clone(), package.name.clone()));
            }
            selected.insert(package.name.clone(), package);
        }

        let summary = format!("Resolved {} packages in {} steps", selected.len(), steps);
        info!("{}", summary);
        progress.push(summary);

        Ok(Resolution {
            packages: selected.into_values().collect(),
            progress,
            steps,
        })
    }
}
