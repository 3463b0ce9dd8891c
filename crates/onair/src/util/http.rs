use std::{ops::Deref, sync::Arc, time::Duration};

use reqwest::{redirect::Policy, Client, IntoUrl};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::{
    buffer::BufferPlan,
    config::HttpOptions,
    error::{OnairError, OnairResult},
};

/// A shared HTTP client with a cookie jar, tuned for long-lived live streams.
///
/// Only the connect phase is bounded by reqwest. Waiting for response headers
/// and for each body chunk is bounded by callers with [`HttpClient::read_timeout`],
/// so no whole-request timeout is set.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
    read_timeout: Duration,
}

impl HttpClient {
    pub fn new(options: &HttpOptions, plan: &BufferPlan) -> OnairResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = Client::builder()
            .cookie_provider(cookies_store.clone())
            .user_agent(options.user_agent.as_str())
            .connect_timeout(plan.connect_timeout())
            .redirect(Policy::limited(options.max_redirects))
            .build()
            .map_err(OnairError::ClientBuild)?;

        Ok(Self {
            client,
            cookies_store,
            read_timeout: plan.read_timeout(),
        })
    }

    pub fn with_defaults() -> OnairResult<Self> {
        Self::new(&HttpOptions::default(), &BufferPlan::LIVE)
    }

    /// Longest silence tolerated while waiting for headers or body data.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Seeds the jar with `Set-Cookie` style strings. Unparseable cookies are skipped.
    pub fn add_cookies(&self, cookies: Vec<String>, url: impl IntoUrl) -> OnairResult<()> {
        let url = url
            .into_url()
            .map_err(|e| OnairError::InvalidConfig(format!("invalid cookie url: {e}")))?;
        let mut lock = match self.cookies_store.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, &url) {
                tracing::warn!("Ignoring cookie {cookie}: {e}");
            }
        }
        Ok(())
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
