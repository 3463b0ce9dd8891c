//! A scripted in-memory source for unit tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use url::Url;

use super::{LengthHint, ResponseHeaders, StreamRequest, StreamSource, TransferStats};
use crate::{
    error::{OpenError, ReadError},
    load_error::{ErrorKind, LoadError},
};

pub(crate) enum Step {
    Fail(OpenError),
    Stream {
        hint: LengthHint,
        chunks: VecDeque<Result<Bytes, ReadError>>,
    },
}

impl Step {
    pub fn status(code: u16) -> Self {
        Step::Fail(OpenError::HttpStatus(code))
    }

    pub fn fail(kind: ErrorKind, message: &str) -> Self {
        Step::Fail(OpenError::Transport(LoadError::new(kind, message)))
    }

    pub fn body(hint: LengthHint, chunks: &[&'static [u8]]) -> Self {
        Step::Stream {
            hint,
            chunks: chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect(),
        }
    }

    /// Streams `chunks`, then fails the next read with `error`.
    pub fn body_then(hint: LengthHint, chunks: &[&'static [u8]], error: ReadError) -> Self {
        let mut step = Self::body(hint, chunks);
        if let Step::Stream { chunks, .. } = &mut step {
            chunks.push_back(Err(error));
        }
        step
    }
}

#[derive(Debug, Default)]
pub(crate) struct Journal {
    pub opens: usize,
    pub closes: usize,
    pub requests: Vec<Url>,
}

/// Plays back `steps` one per open. Once exhausted, every open is refused.
pub(crate) struct ScriptedSource {
    steps: VecDeque<Step>,
    current: Option<VecDeque<Result<Bytes, ReadError>>>,
    pending: Bytes,
    uri: Option<Url>,
    headers: ResponseHeaders,
    stats: TransferStats,
    journal: Arc<Mutex<Journal>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let source = Self {
            steps: steps.into(),
            current: None,
            pending: Bytes::new(),
            uri: None,
            headers: ResponseHeaders::new(),
            stats: TransferStats::default(),
            journal: journal.clone(),
        };
        (source, journal)
    }
}

impl StreamSource for ScriptedSource {
    async fn open(&mut self, request: &StreamRequest) -> Result<LengthHint, OpenError> {
        self.close();
        self.stats = TransferStats::default();
        self.uri = Some(request.url().clone());
        {
            let mut journal = self.journal.lock().unwrap();
            journal.opens += 1;
            journal.requests.push(request.url().clone());
        }

        match self.steps.pop_front() {
            Some(Step::Stream { hint, chunks }) => {
                self.current = Some(chunks);
                self.headers = ResponseHeaders::new();
                self.headers.append("icy-br", "128");
                Ok(hint)
            }
            Some(Step::Fail(error)) => Err(error),
            None => Err(OpenError::Transport(LoadError::new(
                ErrorKind::Connect,
                "connection refused",
            ))),
        }
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ReadError> {
        let chunks = self.current.as_mut().ok_or(ReadError::Closed)?;
        if self.pending.is_empty() {
            match chunks.pop_front() {
                None => return Ok(0),
                Some(Err(e)) => return Err(e),
                Some(Ok(chunk)) => self.pending = chunk,
            }
        }
        let len = buf.len().min(self.pending.len());
        buf[..len].copy_from_slice(&self.pending.split_to(len));
        self.stats.bytes_transferred += len as u64;
        Ok(len)
    }

    fn close(&mut self) {
        if self.current.take().is_some() {
            self.pending = Bytes::new();
            self.journal.lock().unwrap().closes += 1;
        }
    }

    fn uri(&self) -> Option<&Url> {
        self.uri.as_ref()
    }

    fn response_headers(&self) -> Option<&ResponseHeaders> {
        self.current.as_ref().map(|_| &self.headers)
    }

    fn stats(&self) -> TransferStats {
        self.stats
    }
}
