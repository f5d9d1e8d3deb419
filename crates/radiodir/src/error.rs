//! Error types for the station directory core.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No directory mirror could be discovered.
    #[error("mirror discovery failed: {0}")]
    Discovery(String),

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("settings error: {0}")]
    Settings(String),

    #[error("unknown station: {0}")]
    UnknownStation(String),

    #[error("player command failed: {0}")]
    Player(#[from] anyhow::Error),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Storage {
            path: path.into(),
            source,
        }
    }

    /// True for failures that happened before any HTTP request went out.
    pub fn is_discovery(&self) -> bool {
        matches!(self, Error::Discovery(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
