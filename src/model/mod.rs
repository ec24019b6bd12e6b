use thiserror::Error;

pub mod lock;
pub mod manifest;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error reading toml: {0}")]
    IO(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Version parsing error: {0}")]
    Semver(#[from] semver::Error),
    #[error("Missing TOML key `{0}` while parsing")]
    MissingKey(String),
    #[error("Invalid dependency `{name}`: {reason}")]
    InvalidDependency { name: String, reason: String },
    #[error("Unsupported lock file version {0}")]
    UnsupportedLockFileVersion(toml::Value),
    #[error("Lock file has no version")]
    MissingLockFileVersion,
}
