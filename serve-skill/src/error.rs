use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no files matching {pattern:?} in {dir:?}")]
    DataNotFound { dir: PathBuf, pattern: String },

    #[error("player {0:?} was not seen when the encoder was fit")]
    UnknownPlayer(String),

    #[error("player id {0} is outside the encoder's range")]
    UnknownPlayerId(usize),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{method} failed: {reason}")]
    Backend { method: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn backend(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Backend {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
