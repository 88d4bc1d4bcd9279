use casekeep_core::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot archive because archive root '{}' not found", .0.display())]
    ArchiveRootMissing(PathBuf),

    #[error("expected relative path, got '{0}'")]
    AbsolutePath(String),

    #[error("invalid regex '{pattern}': {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },

    #[error("invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        source: globset::Error,
    },

    #[error("`{command}` failed: {status}")]
    ExternalCommand { command: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
