use std::{env, path::PathBuf};

use anyhow::anyhow;

use crate::project::Project;

use super::{Application, Collaborators};

#[derive(Default)]
pub struct ApplicationBuilder {
    root: Option<PathBuf>,
    collaborators: Option<Collaborators>,
}

impl ApplicationBuilder {
    /// Project root directory, or the manifest itself.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Collaborators used to load the project and act on it.
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = Some(collaborators);
        self
    }

    pub fn try_build(self) -> anyhow::Result<Application> {
        let Self {
            root,
            collaborators,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };
        let collaborators = collaborators
            .ok_or_else(|| anyhow!("No collaborators configured for the application"))?;

        let project = Project::create_with(&root, collaborators.components.as_ref())?;
        Ok(Application::new(project, collaborators))
    }
}
