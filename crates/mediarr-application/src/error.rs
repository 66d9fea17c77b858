// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::PathBuf;

use thiserror::Error;

/// A read-only collaborator (history, disk, media probe) could not answer.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("history unavailable: {0}")]
    History(String),
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("media probe failed for {path}: {message}")]
    Probe { path: PathBuf, message: String },
}

impl CollaboratorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
