//! Composition root for hermetic test cases.
//!
//! Every test case works on the canned project under
//! `<tests>/fixtures/simple_project`. Its manifest is recorded before the
//! project is loaded and written back when the case ends, whether the test
//! body returned, failed or panicked. Cases sharing a manifest are serialized
//! within the process.

use std::{
    cell::Cell,
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    rc::Rc,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Context};
use log::{debug, error};
use thiserror::Error;

use crate::{
    api::{Application, Collaborators},
    installer::NoopInstaller,
    project::{Project, MANIFEST_FILE_NAME},
    repository::{Repository, DEFAULT_SOURCE},
};

use super::{
    doubles::{FixedTiming, HermeticComponents, HermeticEnvironment, DEFAULT_PROGRESS_RATE},
    init_logging,
    vcs::{FixtureGit, DEFAULT_REVISION},
};

const FIXTURES_DIR: &str = "fixtures";
const SIMPLE_PROJECT_DIR: &str = "simple_project";

/// Name of the repository standing in for every package index.
pub const TEST_REPOSITORY: &str = "repo";

static MANIFEST_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    static HOLDS_MANIFEST: Cell<bool> = const { Cell::new(false) };
}

/// Root of the test data tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureRoot {
    tests: PathBuf,
}

impl FixtureRoot {
    pub fn new(tests: impl Into<PathBuf>) -> Self {
        FixtureRoot {
            tests: tests.into(),
        }
    }

    pub fn fixtures(&self) -> PathBuf {
        self.tests.join(FIXTURES_DIR)
    }

    pub fn simple_project(&self) -> PathBuf {
        self.fixtures().join(SIMPLE_PROJECT_DIR)
    }
}

impl Default for FixtureRoot {
    fn default() -> Self {
        FixtureRoot::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("tests"))
    }
}

#[derive(Error, Debug)]
#[error("Could not restore manifest {}: {source}", path.display())]
pub struct TeardownError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Holds the original bytes of a manifest and writes them back when released.
///
/// Prefer [`ManifestGuard::restore`], which reports a failed write. Dropping
/// an unrestored guard restores too, panicking on failure unless the thread is
/// already unwinding.
///
/// Only one guard may be alive per thread: recording a second one is an error
/// rather than a deadlock on the process-wide lock.
#[must_use]
pub struct ManifestGuard {
    path: PathBuf,
    original: Vec<u8>,
    restored: bool,
    _serial: MutexGuard<'static, ()>,
}

impl ManifestGuard {
    pub fn record(path: &Path) -> anyhow::Result<Self> {
        if HOLDS_MANIFEST.with(Cell::get) {
            bail!(
                "A manifest is already recorded on this thread, cannot record {}",
                path.display()
            );
        }
        // A test that panicked while holding the lock has already been restored.
        let serial = MANIFEST_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let original = std::fs::read(path)
            .with_context(|| format!("Could not record manifest {}", path.display()))?;
        HOLDS_MANIFEST.with(|holds| holds.set(true));
        debug!("Recorded {} bytes of {}", original.len(), path.display());
        Ok(ManifestGuard {
            path: path.to_path_buf(),
            original,
            restored: false,
            _serial: serial,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn restore(mut self) -> Result<(), TeardownError> {
        self.restored = true;
        self.write_original()
    }

    fn write_original(&self) -> Result<(), TeardownError> {
        std::fs::write(&self.path, &self.original).map_err(|source| TeardownError {
            path: self.path.clone(),
            source,
        })
    }
}

impl Drop for ManifestGuard {
    fn drop(&mut self) {
        HOLDS_MANIFEST.with(|holds| holds.set(false));
        if self.restored {
            return;
        }
        if let Err(e) = self.write_original() {
            if std::thread::panicking() {
                error!("{}", e);
            } else {
                panic!("{}", e);
            }
        }
    }
}

impl std::fmt::Debug for ManifestGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestGuard")
            .field("path", &self.path)
            .field("restored", &self.restored)
            .finish_non_exhaustive()
    }
}

/// A project loaded from the canned fixture, with its manifest under guard.
#[derive(Debug)]
pub struct ProjectFixture {
    project: Project,
    guard: ManifestGuard,
}

impl ProjectFixture {
    pub fn guard(&self) -> &ManifestGuard {
        &self.guard
    }

    pub fn finish(self) -> Result<(), TeardownError> {
        let ProjectFixture { project, guard } = self;
        drop(project);
        guard.restore()
    }
}

impl Deref for ProjectFixture {
    type Target = Project;

    fn deref(&self) -> &Project {
        &self.project
    }
}

impl DerefMut for ProjectFixture {
    fn deref_mut(&mut self) -> &mut Project {
        &mut self.project
    }
}

pub struct AppFixture {
    app: Application,
    guard: ManifestGuard,
}

impl AppFixture {
    pub fn guard(&self) -> &ManifestGuard {
        &self.guard
    }

    pub fn finish(self) -> Result<(), TeardownError> {
        let AppFixture { app, guard } = self;
        drop(app);
        guard.restore()
    }
}

impl Deref for AppFixture {
    type Target = Application;

    fn deref(&self) -> &Application {
        &self.app
    }
}

impl DerefMut for AppFixture {
    fn deref_mut(&mut self) -> &mut Application {
        &mut self.app
    }
}

/// Everything a test receives: the installer handle, the controlled
/// repository and the wired application.
pub struct TestCase {
    pub installer: NoopInstaller,
    pub repo: Repository,
    pub app: AppFixture,
}

impl TestCase {
    pub fn finish(self) -> Result<(), TeardownError> {
        self.app.finish()
    }
}

/// Builds test cases around the canned project.
///
/// A thread holds at most one case (or [`ProjectFixture`]) at a time; asking for
/// another before the first is finished or dropped returns an error.
#[derive(Debug, Clone)]
pub struct Fixtures {
    root: FixtureRoot,
    revision: String,
    progress_rate: u64,
}

impl Default for Fixtures {
    fn default() -> Self {
        Fixtures {
            root: FixtureRoot::default(),
            revision: DEFAULT_REVISION.to_string(),
            progress_rate: DEFAULT_PROGRESS_RATE,
        }
    }
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(mut self, root: FixtureRoot) -> Self {
        self.root = root;
        self
    }

    /// Revision every lookup through [`FixtureGit`] reports.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn with_progress_rate(mut self, rate: u64) -> Self {
        self.progress_rate = rate;
        self
    }

    pub fn root(&self) -> &FixtureRoot {
        &self.root
    }

    pub fn installer(&self) -> NoopInstaller {
        NoopInstaller::new()
    }

    /// Collaborators that keep a test off the network and the real environment.
    pub fn setup(&self, installer: &NoopInstaller) -> Collaborators {
        Collaborators {
            vcs: Rc::new(
                FixtureGit::new(self.root.fixtures()).with_revision(self.revision.clone()),
            ),
            environment: Rc::new(HermeticEnvironment::new(installer.clone())),
            timing: Rc::new(FixedTiming::new(self.progress_rate)),
            components: Rc::new(HermeticComponents),
        }
    }

    pub fn repo(&self) -> Repository {
        Repository::named(TEST_REPOSITORY)
    }

    /// Loads the canned project with `repo` as its only package source.
    pub fn project(&self, repo: &Repository) -> anyhow::Result<ProjectFixture> {
        let guard = ManifestGuard::record(&self.root.simple_project().join(MANIFEST_FILE_NAME))?;
        let project = Project::create_with(guard.path(), &HermeticComponents)?;

        project.pool().remove_repository(DEFAULT_SOURCE);
        project.pool().add_repository(repo.clone());

        Ok(ProjectFixture { project, guard })
    }

    pub fn app(&self, project: ProjectFixture, collaborators: Collaborators) -> AppFixture {
        let ProjectFixture { project, guard } = project;
        AppFixture {
            app: Application::new(project, collaborators),
            guard,
        }
    }

    pub fn test_case(&self) -> anyhow::Result<TestCase> {
        init_logging();

        let installer = self.installer();
        let collaborators = self.setup(&installer);
        let repo = self.repo();
        let project = self.project(&repo)?;
        Ok(TestCase {
            installer,
            repo,
            app: self.app(project, collaborators),
        })
    }

    /// Runs `body` on a fresh test case and restores the manifest afterwards.
    ///
    /// A failing body wins over a failing teardown, with the teardown error
    /// attached as context.
    pub fn run<F>(&self, body: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut TestCase) -> anyhow::Result<()>,
    {
        let mut case = self.test_case()?;
        let outcome = body(&mut case);
        let teardown = case.finish();
        match (outcome, teardown) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(teardown)) => Err(teardown.into()),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown)) => Err(e.context(format!("teardown also failed: {teardown}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_root() -> (tempfile::TempDir, FixtureRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = FixtureRoot::new(dir.path());
        std::fs::create_dir_all(root.simple_project()).unwrap();
        std::fs::write(
            root.simple_project().join(MANIFEST_FILE_NAME),
            "[package]\nname = \"scratch\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        (dir, root)
    }

    #[test]
    fn guard_restores_on_drop() {
        let (_dir, root) = temp_root();
        let manifest = root.simple_project().join(MANIFEST_FILE_NAME);
        let before = std::fs::read(&manifest).unwrap();

        {
            let _guard = ManifestGuard::record(&manifest).unwrap();
            std::fs::write(&manifest, "garbage").unwrap();
        }

        assert_eq!(std::fs::read(&manifest).unwrap(), before);
    }

    #[test]
    fn second_guard_on_same_thread_fails() {
        let (_dir, root) = temp_root();
        let manifest = root.simple_project().join(MANIFEST_FILE_NAME);

        let first = ManifestGuard::record(&manifest).unwrap();
        let err = ManifestGuard::record(&manifest).unwrap_err();
        assert!(err.to_string().starts_with("A manifest is already recorded"));

        first.restore().unwrap();
        ManifestGuard::record(&manifest).unwrap().restore().unwrap();
    }

    #[test]
    fn nested_run_fails_instead_of_blocking() {
        let (_dir, root) = temp_root();
        let fixtures = Fixtures::new().with_root(root);

        let err = fixtures.run(|_| fixtures.run(|_| Ok(()))).unwrap_err();
        assert!(err.to_string().starts_with("A manifest is already recorded"));
    }

    #[test]
    fn restore_reports_unwritable_manifest() {
        let (dir, root) = temp_root();
        let manifest = root.simple_project().join(MANIFEST_FILE_NAME);

        let guard = ManifestGuard::record(&manifest).unwrap();
        std::fs::remove_dir_all(dir.path()).unwrap();

        let err = guard.restore().unwrap_err();
        assert!(err.to_string().starts_with("Could not restore manifest"));
    }

    #[test]
    fn project_swaps_public_source_for_repo() {
        let (_dir, root) = temp_root();
        let fixtures = Fixtures::new().with_root(root);
        let repo = fixtures.repo();

        let project = fixtures.project(&repo).unwrap();
        let repositories = project.pool().repositories();
        assert_eq!(repositories.len(), 1);
        assert!(repositories[0].ptr_eq(&repo));
        assert!(!project.pool().has_repository(DEFAULT_SOURCE));
        project.finish().unwrap();
    }

    #[test]
    fn run_surfaces_body_error_and_still_restores() {
        let (_dir, root) = temp_root();
        let manifest = root.simple_project().join(MANIFEST_FILE_NAME);
        let before = std::fs::read(&manifest).unwrap();

        let err = Fixtures::new()
            .with_root(root)
            .run(|case| {
                std::fs::write(case.app.project().file(), "[package]\n")?;
                anyhow::bail!("body failed")
            })
            .unwrap_err();

        assert_eq!(err.to_string(), "body failed");
        assert_eq!(std::fs::read(&manifest).unwrap(), before);
    }
}
