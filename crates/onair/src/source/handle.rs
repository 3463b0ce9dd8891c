use std::{pin::Pin, time::Duration};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use super::{ResponseHeaders, TransferStats};
use crate::error::ReadError;

pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, ReadError>> + Send>>;

/// One open response body.
///
/// A handle is opened once and closed at most once: after [`StreamHandle::close`]
/// the body is gone and every read fails with [`ReadError::Closed`].
pub struct StreamHandle {
    body: Option<BodyStream>,
    pending: Bytes,
    ended: bool,
    headers: ResponseHeaders,
    stats: TransferStats,
    read_timeout: Duration,
}

impl StreamHandle {
    pub fn new(body: BodyStream, headers: ResponseHeaders, read_timeout: Duration) -> Self {
        Self {
            body: Some(body),
            pending: Bytes::new(),
            ended: false,
            headers,
            stats: TransferStats::default(),
            read_timeout,
        }
    }

    /// Waits at most `read_timeout` for the next bytes.
    ///
    /// Reading into an empty buffer returns `Ok(0)` without touching the body.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.pending.is_empty() {
                let len = buf.len().min(self.pending.len());
                let chunk = self.pending.split_to(len);
                buf[..len].copy_from_slice(&chunk);
                self.stats.bytes_transferred += len as u64;
                return Ok(len);
            }

            let body = self.body.as_mut().ok_or(ReadError::Closed)?;
            if self.ended {
                return Ok(0);
            }

            match tokio::time::timeout(self.read_timeout, body.next()).await {
                Err(_) => return Err(ReadError::Timeout(self.read_timeout)),
                Ok(None) => {
                    self.ended = true;
                    return Ok(0);
                }
                Ok(Some(Err(e))) => return Err(e),
                Ok(Some(Ok(chunk))) => self.pending = chunk,
            }
        }
    }

    /// Releases the body. Returns `true` only for the call that released it.
    pub fn close(&mut self) -> bool {
        self.pending = Bytes::new();
        self.body.take().is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.body.is_none()
    }

    pub fn headers(&self) -> &ResponseHeaders {
        &self.headers
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }
}
