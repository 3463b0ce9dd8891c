use url::Url;

use super::{LengthHint, ResponseHeaders, StreamRequest, StreamSource, TransferStats};
use crate::error::{OpenError, ReadError};

const LIVE_MARKERS: [&str; 3] = ["aac", "streamtheworld", "livestream"];

/// Whether `url` looks like an endless live feed.
///
/// Case-insensitive. `streamtheworld` is a live radio CDN.
pub fn is_live_feed(url: &Url) -> bool {
    let url = url.as_str().to_ascii_lowercase();
    LIVE_MARKERS.iter().any(|marker| url.contains(marker))
}

/// Reports [`LengthHint::Unknown`] for live feeds, whatever the server says.
///
/// Some live servers advertise a bogus `Content-Length`; playback must not
/// treat reaching it as the end of the station.
pub struct InfiniteLengthAdapter<S> {
    inner: S,
    live: bool,
}

impl<S> InfiniteLengthAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, live: false }
    }

    /// Whether the currently open request was detected as a live feed.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: StreamSource> StreamSource for InfiniteLengthAdapter<S> {
    async fn open(&mut self, request: &StreamRequest) -> Result<LengthHint, OpenError> {
        self.live = false;
        let hint = self.inner.open(request).await?;

        self.live = is_live_feed(request.url());
        if self.live {
            if let LengthHint::Known(len) = hint {
                tracing::debug!("Ignoring advertised length {len} of live feed {}", request.url());
            }
            return Ok(LengthHint::Unknown);
        }
        Ok(hint)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        self.inner.read(buf).await
    }

    fn close(&mut self) {
        self.live = false;
        self.inner.close();
    }

    fn uri(&self) -> Option<&Url> {
        self.inner.uri()
    }

    fn response_headers(&self) -> Option<&ResponseHeaders> {
        self.inner.response_headers()
    }

    fn stats(&self) -> TransferStats {
        self.inner.stats()
    }
}
