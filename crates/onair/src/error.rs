use thiserror::Error;

use crate::load_error::LoadError;

#[derive(Error, Debug)]
pub enum OnairError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error(transparent)]
    ConfigParseError(#[from] toml::de::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type OnairResult<T> = Result<T, OnairError>;

/// Failure while opening a stream. Raw, without any retry judgment.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("Unexpected response code {0}")]
    HttpStatus(u16),

    #[error("Empty body")]
    EmptyBody,

    #[error("No response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to open stream: {0}")]
    Transport(#[source] LoadError),
}

impl From<reqwest::Error> for OpenError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(LoadError::from_std(&error))
    }
}

/// Failure while reading from an open stream.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("No data received for {0:?}")]
    Timeout(std::time::Duration),

    #[error("Stream closed")]
    Closed,

    #[error("Read failed: {0}")]
    Transport(#[source] LoadError),
}

impl From<reqwest::Error> for ReadError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(LoadError::from_std(&error))
    }
}

impl From<std::io::Error> for ReadError {
    fn from(error: std::io::Error) -> Self {
        Self::Transport(LoadError::from_std(&error))
    }
}
