use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of a managed server operation.
///
/// `NotRunning` and `Start` are expected, recoverable conditions that the
/// dispatcher reports to the client as ordinary response messages.
/// `Transport` means the control channel itself failed while an operation
/// was reporting progress; it abandons the current connection only.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("server is not running")]
    NotRunning,

    #[error("could not start server: {0}")]
    Start(#[source] io::Error),

    #[error(transparent)]
    Transport(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file missing: {0}")]
    Missing(PathBuf),

    #[error("could not read config file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
