use std::time::Duration;

use bytes::Bytes;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    load_error::{DataType, LoadError, LoadErrorInfo},
    playlist,
    retry::{RetryDecision, RetryPolicy},
    sniff,
    source::{LengthHint, ResponseHeaders, StreamRequest, StreamSource},
    util::http::HttpClient,
};

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
const EVENT_CAPACITY: usize = 64;

/// What a running session reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A stream was opened. Sent once per successful open.
    Connected {
        url: Url,
        length: LengthHint,
        headers: ResponseHeaders,
    },
    Data(Bytes),
    /// A transient failure. The stream is reopened after `delay`.
    Reconnecting {
        attempt: u32,
        delay: Duration,
        error: LoadError,
    },
    /// A fatal failure. The station cannot be played; the session is over.
    Failed(LoadError),
    /// The session ended without error: stopped by the caller, or a stream of
    /// known length was read to its end.
    Stopped,
}

pub struct SessionOptions {
    pub retry: RetryPolicy,
    pub chunk_size: usize,
    /// Resolves `.pls`/`.m3u` links before every open when set.
    pub resolver: Option<HttpClient>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            resolver: None,
        }
    }
}

/// A running stream: one task owning one source, reconnecting until stopped
/// or until a fatal error.
///
/// Dropping the session stops it.
pub struct StreamSession {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamSession {
    pub fn spawn<S>(
        source: S,
        request: StreamRequest,
        options: SessionOptions,
    ) -> (Self, mpsc::Receiver<SessionEvent>)
    where
        S: StreamSource + 'static,
    {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let cancel = CancellationToken::new();
        let runner = Runner {
            source,
            request,
            retry: options.retry,
            resolver: options.resolver,
            chunk_size: options.chunk_size.max(1),
            events,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(runner.run());

        (
            Self {
                cancel,
                task: Some(task),
            },
            rx,
        )
    }

    /// Requests the session to stop. A pending reconnect is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the session task to finish.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Stream session task failed: {e}");
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum AttemptEnd {
    /// The stream failed. `made_progress` is set once data was delivered.
    Failed {
        error: LoadError,
        data_type: DataType,
        made_progress: bool,
    },
    Finished,
    ReceiverGone,
}

struct Runner<S> {
    source: S,
    request: StreamRequest,
    retry: RetryPolicy,
    resolver: Option<HttpClient>,
    chunk_size: usize,
    events: mpsc::Sender<SessionEvent>,
    cancel: CancellationToken,
}

impl<S: StreamSource> Runner<S> {
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        let mut attempt: u32 = 0;

        let last_event = loop {
            let end = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(SessionEvent::Stopped),
                end = self.play_once() => end,
            };

            let (error, data_type) = match end {
                AttemptEnd::Finished => break Some(SessionEvent::Stopped),
                AttemptEnd::ReceiverGone => break None,
                AttemptEnd::Failed {
                    error,
                    data_type,
                    made_progress,
                } => {
                    if made_progress {
                        attempt = 0;
                    }
                    (error, data_type)
                }
            };
            attempt = attempt.saturating_add(1);

            let info = LoadErrorInfo::new(error, attempt, data_type);
            let delay = match self.retry.decide(&info) {
                RetryDecision::Stop => break Some(SessionEvent::Failed(info.error)),
                RetryDecision::Retry(delay) => delay,
            };

            self.source.close();
            let reconnecting = SessionEvent::Reconnecting {
                attempt,
                delay,
                error: info.error,
            };
            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(SessionEvent::Stopped),
                sent = self.events.send(reconnecting) => sent.is_ok(),
            };
            if !sent {
                break None;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(SessionEvent::Stopped),
                _ = tokio::time::sleep(delay) => {}
            }
        };

        self.source.close();
        let Some(event) = last_event else {
            return;
        };
        tracing::debug!("Stream session for {} ended: {event:?}", self.request.url());
        // a stopped session must not wait on a consumer that stopped reading
        tokio::select! {
            biased;
            _ = self.events.send(event.clone()) => {}
            _ = cancel.cancelled() => {
                if self.events.try_send(event).is_err() {
                    tracing::debug!("Dropped final session event, consumer is not reading");
                }
            }
        }
    }

    async fn play_once(&mut self) -> AttemptEnd {
        let request = match &self.resolver {
            Some(client) => match playlist::resolve(client, &self.request).await {
                Ok(request) => request,
                Err(error) => {
                    return AttemptEnd::Failed {
                        error,
                        data_type: DataType::Manifest,
                        made_progress: false,
                    }
                }
            },
            None => self.request.clone(),
        };

        let length = match self.source.open(&request).await {
            Ok(length) => length,
            Err(e) => {
                return AttemptEnd::Failed {
                    error: e.into(),
                    data_type: DataType::Media,
                    made_progress: false,
                }
            }
        };

        let connected = SessionEvent::Connected {
            url: self
                .source
                .uri()
                .cloned()
                .unwrap_or_else(|| request.url().clone()),
            length,
            headers: self.source.response_headers().cloned().unwrap_or_default(),
        };
        if self.events.send(connected).await.is_err() {
            return AttemptEnd::ReceiverGone;
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut made_progress = false;
        loop {
            let len = match self.source.read(&mut buf).await {
                Ok(0) if length.is_unknown() => {
                    tracing::info!("Live stream {} ended, reconnecting", request.url());
                    return AttemptEnd::Failed {
                        error: LoadError::end_of_stream(),
                        data_type: DataType::Media,
                        made_progress,
                    };
                }
                Ok(0) => return AttemptEnd::Finished,
                Ok(len) => len,
                Err(e) => {
                    return AttemptEnd::Failed {
                        error: e.into(),
                        data_type: DataType::Media,
                        made_progress,
                    }
                }
            };

            if !made_progress {
                if let Err(error) = sniff::check_audio(&buf[..len]) {
                    return AttemptEnd::Failed {
                        error,
                        data_type: DataType::Media,
                        made_progress: false,
                    };
                }
                made_progress = true;
            }

            let data = Bytes::copy_from_slice(&buf[..len]);
            if self.events.send(SessionEvent::Data(data)).await.is_err() {
                return AttemptEnd::ReceiverGone;
            }
        }
    }
}
