//! Local stand-in for remote version control.
//!
//! Clones are served from pre-recorded snapshots under
//! `<fixtures>/git/<netloc>/<path>/`, where `<netloc>` is the locator's
//! `user@host:port` as written and `<path>` its URL path without leading
//! slashes and without a trailing `.git`.

use std::path::{Path, PathBuf};

use log::{debug, trace};
use url::Url;
use walkdir::WalkDir;

use crate::git::{VcsClient, VcsError};

/// Revision reported by [`FixtureGit::rev_parse`] unless configured otherwise.
pub const DEFAULT_REVISION: &str = "9cf87a285a2d3fbb0b9fa621997b3acc3631ed24";

const GIT_FIXTURES_DIR: &str = "git";
const VCS_SUFFIX: &str = ".git";

/// Maps a repository locator to its fixture directory. Purely structural: the
/// returned path is not checked for existence.
pub fn fixture_path(fixtures: &Path, locator: &str) -> Result<PathBuf, VcsError> {
    Url::parse(locator).map_err(|e| VcsError::InvalidLocator {
        locator: locator.to_string(),
        reason: e.to_string(),
    })?;

    let (netloc, path) = split_locator(locator);
    let path = path.trim_start_matches('/');
    let path = path.strip_suffix(VCS_SUFFIX).unwrap_or(path);

    Ok(fixtures.join(GIT_FIXTURES_DIR).join(netloc).join(path))
}

/// Network location and path exactly as written. `Url` would lowercase the
/// host and drop default ports, which changes the fixture directory.
fn split_locator(locator: &str) -> (&str, &str) {
    let rest = locator.split_once(':').map_or(locator, |(_, rest)| rest);
    let rest = &rest[..rest.find(['?', '#']).unwrap_or(rest.len())];
    match rest.strip_prefix("//") {
        Some(authority) => authority.split_at(authority.find('/').unwrap_or(authority.len())),
        None => ("", rest),
    }
}

/// [`VcsClient`] that copies fixture snapshots instead of cloning.
#[derive(Debug, Clone)]
pub struct FixtureGit {
    fixtures: PathBuf,
    revision: String,
}

impl FixtureGit {
    pub fn new(fixtures: impl Into<PathBuf>) -> Self {
        FixtureGit {
            fixtures: fixtures.into(),
            revision: DEFAULT_REVISION.to_string(),
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }
}

impl VcsClient for FixtureGit {
    fn clone_repository(&self, source: &str, dest: &Path) -> Result<(), VcsError> {
        let folder = fixture_path(&self.fixtures, source)?;
        if !folder.is_dir() {
            return Err(VcsError::MissingFixture {
                locator: source.to_string(),
                path: folder,
            });
        }

        debug!("Serving {} from {}", source, folder.display());
        if dest.exists() {
            std::fs::remove_dir_all(dest)?;
        }
        copy_tree(&folder, dest)
    }

    fn checkout(&self, reference: &str, _folder: &Path) -> Result<(), VcsError> {
        trace!("Ignoring checkout of {}", reference);
        Ok(())
    }

    fn rev_parse(&self, _reference: &str, _folder: &Path) -> Result<String, VcsError> {
        Ok(self.revision.clone())
    }
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), VcsError> {
    std::fs::create_dir_all(dest)?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn fixture_path_strips_separator_and_suffix() {
        let path =
            fixture_path(Path::new("/t/fixtures"), "https://github.com/demo/lib.git").unwrap();
        assert_eq!(path, PathBuf::from("/t/fixtures/git/github.com/demo/lib"));
    }

    #[test]
    fn fixture_path_strips_only_the_suffix_token() {
        let path = fixture_path(Path::new("/t"), "https://github.com/demo/light.git").unwrap();
        assert_eq!(path, PathBuf::from("/t/git/github.com/demo/light"));

        let path = fixture_path(Path::new("/t"), "https://github.com/demo/gitit").unwrap();
        assert_eq!(path, PathBuf::from("/t/git/github.com/demo/gitit"));
    }

    #[test]
    fn fixture_path_keeps_user_and_port() {
        let path =
            fixture_path(Path::new("/t"), "ssh://git@example.com:2222/org/repo.git").unwrap();
        assert_eq!(path, PathBuf::from("/t/git/git@example.com:2222/org/repo"));
    }

    #[test]
    fn fixture_path_keeps_authority_as_written() {
        let locator = "https://GitHub.com:443/demo/lib.git";
        let path = fixture_path(Path::new("/t"), locator).unwrap();
        assert_eq!(path, PathBuf::from("/t/git/GitHub.com:443/demo/lib"));
    }

    #[test]
    fn fixture_path_ignores_query_and_fragment() {
        let locator = "https://github.com/demo/lib.git?ref=main#top";
        let path = fixture_path(Path::new("/t"), locator).unwrap();
        assert_eq!(path, PathBuf::from("/t/git/github.com/demo/lib"));
    }

    #[test]
    fn fixture_path_is_structural() {
        let a = fixture_path(Path::new("/t"), "https://github.com/demo/lib.git").unwrap();
        let b = fixture_path(Path::new("/t"), "http://github.com/demo/lib").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fixture_path_rejects_scp_style_locator() {
        let err = fixture_path(Path::new("/t"), "git@github.com:demo/lib.git").unwrap_err();
        assert!(matches!(err, VcsError::InvalidLocator { .. }));
    }

    #[test]
    fn clone_replaces_destination_contents() {
        let fixtures = tempfile::tempdir().unwrap();
        let repo = fixtures.path().join("git/example.com/org/repo");
        std::fs::create_dir_all(repo.join("src")).unwrap();
        std::fs::write(repo.join("project.toml"), "name").unwrap();
        std::fs::write(repo.join("src/lib.txt"), "lib").unwrap();

        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("stale.txt"), "stale").unwrap();

        FixtureGit::new(fixtures.path())
            .clone_repository("https://example.com/org/repo.git", dest.path())
            .unwrap();

        assert!(!dest.path().join("stale.txt").exists());
        assert_eq!(
            std::fs::read_to_string(dest.path().join("project.toml")).unwrap(),
            "name"
        );
        assert_eq!(
            std::fs::read_to_string(dest.path().join("src/lib.txt")).unwrap(),
            "lib"
        );
        assert!(repo.join("project.toml").exists());
    }

    #[test]
    fn clone_missing_fixture_leaves_destination_alone() {
        let fixtures = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        std::fs::write(dest.path().join("keep.txt"), "keep").unwrap();

        let err = FixtureGit::new(fixtures.path())
            .clone_repository("https://example.com/org/missing.git", dest.path())
            .unwrap_err();

        assert!(matches!(err, VcsError::MissingFixture { .. }));
        assert!(dest.path().join("keep.txt").exists());
    }

    #[test]
    fn checkout_and_rev_parse_are_constant() {
        let git = FixtureGit::new("/nowhere");
        git.checkout("v1.0.0", Path::new("/nowhere")).unwrap();
        for (reference, folder) in [("HEAD", "/a"), ("main", "/b")] {
            let revision = git.rev_parse(reference, Path::new(folder)).unwrap();
            assert_eq!(revision, DEFAULT_REVISION);
        }
        assert_eq!(DEFAULT_REVISION.len(), 40);

        let git = git.with_revision("0".repeat(40));
        let revision = git.rev_parse("HEAD", Path::new("/a")).unwrap();
        assert_eq!(revision, "0".repeat(40));
    }
}
