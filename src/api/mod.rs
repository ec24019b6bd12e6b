use std::rc::Rc;

use log::debug;

use crate::{
    git::{GitClient, VcsClient},
    installer::{InstallEnvironment, Installer},
    project::{Project, ProjectComponents, SystemComponents},
    resolver::{AdaptiveTiming, ResolverTiming},
};

mod builder;

pub use builder::ApplicationBuilder;

/// The collaborators an [`Application`] delegates environment-dependent work to.
#[derive(Clone)]
pub struct Collaborators {
    pub vcs: Rc<dyn VcsClient>,
    pub environment: Rc<dyn InstallEnvironment>,
    pub timing: Rc<dyn ResolverTiming>,
    pub components: Rc<dyn ProjectComponents>,
}

impl Collaborators {
    /// libgit2, wall-clock progress timing and system configuration around `environment`.
    pub fn new(environment: Rc<dyn InstallEnvironment>) -> Self {
        Collaborators {
            vcs: Rc::new(GitClient),
            environment,
            timing: Rc::new(AdaptiveTiming::new()),
            components: Rc::new(SystemComponents),
        }
    }
}

pub struct Application {
    project: Project,
    collaborators: Collaborators,
}

impl Application {
    pub fn new(project: Project, collaborators: Collaborators) -> Self {
        Application {
            project,
            collaborators,
        }
    }

    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn project_mut(&mut self) -> &mut Project {
        &mut self.project
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// An installer for the current project, wired to this application's collaborators.
    pub fn installer(&mut self) -> Installer<'_> {
        Installer::new(
            &mut self.project,
            self.collaborators.environment.as_ref(),
            self.collaborators.vcs.as_ref(),
            self.collaborators.timing.as_ref(),
        )
    }

    /// Reloads the project from disk, keeping the current repository pool.
    pub fn reset_project(&mut self) -> anyhow::Result<()> {
        let pool = self.project.pool().clone();
        debug!("Reloading project from {}", self.project.root().display());
        let mut project =
            Project::create_with(self.project.root(), self.collaborators.components.as_ref())?;
        project.set_pool(pool);
        self.project = project;
        Ok(())
    }
}
