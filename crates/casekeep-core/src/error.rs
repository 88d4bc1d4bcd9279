use std::path::PathBuf;
use thiserror::Error;

/// Problems with archive configuration. All of these abort a session.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unrecognized safety level '{0}'; known options are none | status | report | restart")]
    UnknownSafetyLevel(String),

    #[error("archive_folder is not set")]
    NoArchiveFolder,

    #[error("no casekeep.yaml found in {} or any parent", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}
