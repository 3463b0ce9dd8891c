use std::{error::Error as StdError, fmt, io};

use crate::error::{OpenError, ReadError};

/// Maximum number of links followed when converting a foreign error chain.
const MAX_CHAIN_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection could not be established (refused, unreachable, TLS).
    Connect,
    /// The host name could not be resolved.
    NameResolution,
    Timeout,
    /// The connection was reset or closed mid-transfer.
    Reset,
    Io,
    /// The server answered with this HTTP status code.
    ResponseCode(u16),
    /// The payload is not a format the pipeline can play.
    UnrecognizedFormat,
    /// The payload could not be parsed.
    Parse,
    /// Opening the stream failed. The underlying reason is in the cause chain.
    Open,
    /// Reading from an open stream failed.
    Read,
    /// A length-unknown stream reached end of input.
    EndOfStream,
    Other,
}

/// A structured load failure with an explicit causal chain.
///
/// The chain is walked by [`LoadError::causes`], starting with the error
/// itself and ending with the root cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    kind: ErrorKind,
    message: String,
    cause: Option<Box<LoadError>>,
}

impl LoadError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn response_code(code: u16) -> Self {
        Self::new(ErrorKind::ResponseCode(code), format!("Response code: {code}"))
    }

    pub fn unrecognized_format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnrecognizedFormat, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn end_of_stream() -> Self {
        Self::new(ErrorKind::EndOfStream, "Live stream reached end of input")
    }

    /// Wraps `cause` as the direct underlying reason of `self`.
    pub fn with_cause(mut self, cause: LoadError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&LoadError> {
        self.cause.as_deref()
    }

    pub fn causes(&self) -> Causes<'_> {
        Causes { next: Some(self) }
    }

    pub fn root_cause(&self) -> &LoadError {
        self.causes().last().unwrap_or(self)
    }

    /// Converts any error into a [`LoadError`] chain by following its
    /// `source()` links. Every link is mapped to the closest [`ErrorKind`].
    pub fn from_std(error: &(dyn StdError + 'static)) -> Self {
        if let Some(load) = error.downcast_ref::<LoadError>() {
            return load.clone();
        }

        let mut links = Vec::new();
        let mut current = Some(error);
        while let Some(err) = current {
            if links.len() == MAX_CHAIN_LEN {
                break;
            }
            links.push((kind_of(err), err.to_string()));
            current = next_cause(err);
        }

        links
            .into_iter()
            .rev()
            .fold(None, |cause: Option<LoadError>, (kind, message)| {
                let link = LoadError::new(kind, message);
                Some(match cause {
                    Some(cause) => link.with_cause(cause),
                    None => link,
                })
            })
            .unwrap_or_else(|| LoadError::new(ErrorKind::Other, error.to_string()))
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for LoadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause.as_deref().map(|c| c as &(dyn StdError + 'static))
    }
}

pub struct Causes<'a> {
    next: Option<&'a LoadError>,
}

impl<'a> Iterator for Causes<'a> {
    type Item = &'a LoadError;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.cause.as_deref();
        Some(current)
    }
}

impl From<OpenError> for LoadError {
    fn from(error: OpenError) -> Self {
        let message = error.to_string();
        match error {
            OpenError::HttpStatus(code) => {
                LoadError::new(ErrorKind::Open, message).with_cause(LoadError::response_code(code))
            }
            OpenError::EmptyBody => LoadError::new(ErrorKind::Open, message),
            OpenError::Timeout(_) => LoadError::new(ErrorKind::Open, "Open timed out")
                .with_cause(LoadError::new(ErrorKind::Timeout, message)),
            OpenError::Transport(cause) => LoadError::new(ErrorKind::Open, message).with_cause(cause),
        }
    }
}

impl From<ReadError> for LoadError {
    fn from(error: ReadError) -> Self {
        let message = error.to_string();
        match error {
            ReadError::Timeout(_) => LoadError::new(ErrorKind::Read, "Read timed out")
                .with_cause(LoadError::new(ErrorKind::Timeout, message)),
            ReadError::Closed => LoadError::new(ErrorKind::Read, message),
            ReadError::Transport(cause) => LoadError::new(ErrorKind::Read, message).with_cause(cause),
        }
    }
}

/// What the failed load was fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Manifest,
    Media,
    Other,
}

/// A single failed load attempt, handed to the retry policy.
#[derive(Debug, Clone)]
pub struct LoadErrorInfo {
    pub error: LoadError,
    /// Starts at 1 for the first failure of an attempt chain.
    pub attempt_count: u32,
    pub data_type: DataType,
}

impl LoadErrorInfo {
    pub fn new(error: LoadError, attempt_count: u32, data_type: DataType) -> Self {
        Self {
            error,
            attempt_count,
            data_type,
        }
    }
}

fn next_cause<'a>(error: &'a (dyn StdError + 'static)) -> Option<&'a (dyn StdError + 'static)> {
    // io::Error::source skips the wrapped error itself
    if let Some(io) = error.downcast_ref::<io::Error>() {
        if let Some(inner) = io.get_ref() {
            return Some(inner as &(dyn StdError + 'static));
        }
    }
    error.source()
}

fn kind_of(error: &(dyn StdError + 'static)) -> ErrorKind {
    if let Some(error) = error.downcast_ref::<reqwest::Error>() {
        // connect timeouts are also connect errors, but they are worth retrying
        if error.is_timeout() {
            return ErrorKind::Timeout;
        }
        if error.is_connect() {
            return if chain_mentions_dns(error) {
                ErrorKind::NameResolution
            } else {
                ErrorKind::Connect
            };
        }
        if let Some(status) = error.status() {
            return ErrorKind::ResponseCode(status.as_u16());
        }
        if error.is_body() || error.is_decode() {
            return ErrorKind::Io;
        }
        return ErrorKind::Other;
    }

    if let Some(error) = error.downcast_ref::<io::Error>() {
        return match error.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable => {
                ErrorKind::Connect
            }
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => ErrorKind::Reset,
            _ if mentions_dns(&error.to_string()) => ErrorKind::NameResolution,
            _ => ErrorKind::Io,
        };
    }

    if error.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
        return ErrorKind::Timeout;
    }

    if mentions_dns(&error.to_string()) {
        ErrorKind::NameResolution
    } else {
        ErrorKind::Other
    }
}

fn chain_mentions_dns(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if mentions_dns(&err.to_string()) {
            return true;
        }
        current = next_cause(err);
    }
    false
}

fn mentions_dns(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "no such host",
        "nodename nor servname",
        "unknown host",
    ]
    .iter()
    .any(|marker| message.contains(marker))
}
