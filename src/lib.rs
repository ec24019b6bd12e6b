pub mod config;
pub mod git;
pub mod installer;
pub mod locker;
pub mod model;
pub mod project;
pub mod repository;
pub mod resolver;
pub mod testing;

mod api;

pub use api::{Application, ApplicationBuilder, Collaborators};
