//! Deterministic stand-ins for everything a test run would otherwise reach
//! outside the process: remote repositories, the install target, the global
//! configuration, lock persistence and resolver timing.
//!
//! ```no_run
//! use depharness::testing::Fixtures;
//!
//! Fixtures::new()
//!     .run(|case| {
//!         let report = case.app.installer().run()?;
//!         assert!(report.operations.is_empty());
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

use std::sync::Once;

pub mod doubles;
pub mod fixtures;
pub mod vcs;

pub use doubles::{
    DiscardLockStore, FixedTiming, HermeticComponents, HermeticEnvironment, DEFAULT_PROGRESS_RATE,
};
pub use fixtures::{
    AppFixture, FixtureRoot, Fixtures, ManifestGuard, ProjectFixture, TeardownError, TestCase,
    TEST_REPOSITORY,
};
pub use vcs::{fixture_path, FixtureGit, DEFAULT_REVISION};

static INIT_LOGGING: Once = Once::new();

/// Routes `log` output through the test harness's captured stdout.
///
/// Filtering follows `RUST_LOG`. Safe to call from every test.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}
