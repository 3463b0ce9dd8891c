use std::time::Duration;

use futures::TryStreamExt;
use reqwest::header::ACCEPT_ENCODING;
use url::Url;

use super::{
    LengthHint, ResponseHeaders, StreamHandle, StreamRequest, StreamSource, TransferStats,
};
use crate::{
    buffer::BufferPlan,
    error::{OpenError, ReadError},
    util::http::HttpClient,
};

pub const DEFAULT_USER_AGENT: &str = concat!("onair/", env!("CARGO_PKG_VERSION"));

const ICY_METADATA: &str = "icy-metadata";

/// Headers the source owns. Caller values for these are dropped.
const RESERVED_HEADERS: [&str; 3] = [ICY_METADATA, "accept-encoding", "user-agent"];

/// Opens live streams over HTTP(S).
///
/// Compression is disabled so byte counts match the wire, and in-band
/// metadata is never requested so the body is pure audio.
pub struct HttpStreamSource {
    client: HttpClient,
    read_timeout: Duration,
    uri: Option<Url>,
    handle: Option<StreamHandle>,
}

impl HttpStreamSource {
    pub fn new(client: HttpClient, plan: &BufferPlan) -> Self {
        Self {
            client,
            read_timeout: plan.read_timeout(),
            uri: None,
            handle: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_closed())
    }
}

impl StreamSource for HttpStreamSource {
    async fn open(&mut self, request: &StreamRequest) -> Result<LengthHint, OpenError> {
        self.close();
        self.handle = None;
        self.uri = Some(request.url().clone());

        tracing::debug!("Opening {}", request.url());
        let mut builder = self
            .client
            .get(request.url().clone())
            .header(ACCEPT_ENCODING, "identity");
        for (name, value) in request.headers() {
            let lower = name.to_ascii_lowercase();
            if RESERVED_HEADERS.contains(&lower.as_str()) {
                tracing::warn!("Dropping reserved request header {name}");
                continue;
            }
            builder = builder.header(name.as_str(), value.as_str());
        }

        // a server may accept the connection and never answer
        let response = match tokio::time::timeout(self.read_timeout, builder.send()).await {
            Ok(response) => response?,
            Err(_) => {
                tracing::warn!("No response from {} within {:?}", request.url(), self.read_timeout);
                return Err(OpenError::Timeout(self.read_timeout));
            }
        };
        if response.url() != request.url() {
            tracing::debug!("Redirected to {}", response.url());
            self.uri = Some(response.url().clone());
        }

        let status = response.status();
        if !status.is_success() {
            drop(response);
            return Err(OpenError::HttpStatus(status.as_u16()));
        }

        let length = match response.content_length() {
            Some(0) => return Err(OpenError::EmptyBody),
            Some(len) => LengthHint::Known(len),
            None => LengthHint::Unknown,
        };

        let headers = ResponseHeaders::from(response.headers());
        let body = response.bytes_stream().map_err(ReadError::from);
        self.handle = Some(StreamHandle::new(
            Box::pin(body),
            headers,
            self.read_timeout,
        ));

        tracing::info!("Opened {} ({length:?})", request.url());
        Ok(length)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        match self.handle.as_mut() {
            Some(handle) => handle.read(buf).await,
            None => Err(ReadError::Closed),
        }
    }

    fn close(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if handle.close() {
                tracing::debug!(
                    "Closed stream after {} bytes",
                    handle.stats().bytes_transferred
                );
            }
        }
    }

    fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    fn response_headers(&self) -> Option<&ResponseHeaders> {
        self.handle.as_ref().map(StreamHandle::headers)
    }

    fn stats(&self) -> TransferStats {
        self.handle
            .as_ref()
            .map(StreamHandle::stats)
            .unwrap_or_default()
    }
}
