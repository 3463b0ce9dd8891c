use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    buffer::LoadControl,
    cache::{CachingSource, OnairCache},
    config::OnairConfig,
    error::OnairResult,
    session::{SessionEvent, SessionOptions, StreamSession, DEFAULT_CHUNK_SIZE},
    source::{HttpStreamSource, InfiniteLengthAdapter, StreamRequest},
    util::http::HttpClient,
};

/// Owns everything a player needs to stream one station at a time.
///
/// At most one session is active. Tuning to a station stops the previous
/// session and waits for it to release its connection first.
pub struct Tuner {
    config: OnairConfig,
    client: HttpClient,
    cache: Option<Arc<OnairCache>>,
    current: Option<StreamSession>,
}

impl Tuner {
    /// Builds the client and opens the configured cache. A file cache
    /// indexes its directory here.
    pub async fn new(config: OnairConfig) -> OnairResult<Self> {
        config.validate()?;
        let client = HttpClient::new(&config.http, &config.buffer)?;
        let cache = OnairCache::from_options(&config.cache).await?.map(Arc::new);

        Ok(Self {
            config,
            client,
            cache,
            current: None,
        })
    }

    pub fn config(&self) -> &OnairConfig {
        &self.config
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn cache(&self) -> Option<&Arc<OnairCache>> {
        self.cache.as_ref()
    }

    pub fn load_control(&self) -> LoadControl {
        LoadControl::new(self.config.buffer)
    }

    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|session| !session.is_finished())
    }

    /// Starts streaming `request`, with the attempt count starting over at 1.
    pub async fn tune(&mut self, request: StreamRequest) -> mpsc::Receiver<SessionEvent> {
        self.stop().await;

        tracing::info!("Tuning to {}", request.url());
        let source = InfiniteLengthAdapter::new(HttpStreamSource::new(
            self.client.clone(),
            &self.config.buffer,
        ));
        let options = SessionOptions {
            retry: self.config.retry_policy(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            resolver: Some(self.client.clone()),
        };

        let (session, rx) = match &self.cache {
            Some(cache) => {
                StreamSession::spawn(CachingSource::new(source, cache.clone()), request, options)
            }
            None => StreamSession::spawn(source, request, options),
        };
        self.current = Some(session);
        rx
    }

    /// Stops the current session, if any, and waits until it is gone.
    pub async fn stop(&mut self) {
        if let Some(session) = self.current.take() {
            session.stop();
            session.join().await;
        }
    }
}
