use std::{collections::BTreeMap, future::Future};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use crate::error::{OnairError, OnairResult, OpenError, ReadError};

mod handle;
mod http;
mod live;
#[cfg(test)]
pub(crate) mod scripted;

pub use handle::{BodyStream, StreamHandle};
pub use http::{HttpStreamSource, DEFAULT_USER_AGENT};
pub use live::{is_live_feed, InfiniteLengthAdapter};

/// An immutable description of one open attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    url: Url,
    headers: BTreeMap<String, String>,
}

impl StreamRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: BTreeMap::new(),
        }
    }

    pub fn parse(url: &str) -> OnairResult<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Adds an extra request header. Name and value must be valid HTTP tokens.
    pub fn with_header(mut self, name: &str, value: &str) -> OnairResult<Self> {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| OnairError::InvalidHeader(name.to_string()))?;
        HeaderValue::from_str(value).map_err(|_| OnairError::InvalidHeader(name.to_string()))?;
        self.headers.insert(name.to_string(), value.to_string());
        Ok(self)
    }

    /// The same request, pointed at another URL.
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            url,
            headers: self.headers.clone(),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthHint {
    Known(u64),
    /// The playback pipeline must never expect an end based on byte count.
    Unknown,
}

impl LengthHint {
    pub fn is_unknown(&self) -> bool {
        matches!(self, LengthHint::Unknown)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_transferred: u64,
}

/// Response headers, keyed by lowercase name, values in the order received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders {
    inner: BTreeMap<String, Vec<String>>,
}

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<&HeaderMap> for ResponseHeaders {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = ResponseHeaders::new();
        for (name, value) in map {
            // non-visible-ASCII values are kept lossily, they are only diagnostics
            headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
        }
        headers
    }
}

/// A byte stream opened from a URL.
///
/// Implementations surface failures as they happen and never retry on their
/// own. Retrying is decided by [`crate::retry::RetryPolicy`] only.
pub trait StreamSource: Send {
    /// Opens `request`, closing any previously open handle first.
    fn open(
        &mut self,
        request: &StreamRequest,
    ) -> impl Future<Output = Result<LengthHint, OpenError>> + Send;

    /// Reads into `buf`. `Ok(0)` for a non-empty `buf` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize, ReadError>> + Send;

    /// Releases the connection. Idempotent, and a no-op before `open`.
    fn close(&mut self);

    fn uri(&self) -> Option<&Url>;

    fn response_headers(&self) -> Option<&ResponseHeaders>;

    fn stats(&self) -> TransferStats;
}
