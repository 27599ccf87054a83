use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Error as ReqwestError, redirect};
use tracing::debug;

use crucible_core::{ContentFetcher, Error, FetchConfig, FetchError, Result as CoreResult};

/// Fetches URL content over HTTP(S) with a bounded timeout.
#[derive(Clone)]
pub struct HttpContentFetcher {
    client: Client,
}

impl HttpContentFetcher {
    /// Builds a fetcher from the fetch configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &FetchConfig) -> CoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.as_str())
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|err| Error::Config(format!("Failed to build fetch client: {err}")))?;
        Ok(Self { client })
    }
}

/// Maps a reqwest error onto a fetch failure.
fn classify(err: &ReqwestError) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else if err.is_connect() || err.is_redirect() {
        FetchError::Network(err.to_string())
    } else {
        FetchError::Other(err.to_string())
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "Fetching URL content");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| classify(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_owned(),
            });
        }

        response.text().await.map_err(|err| classify(&err))
    }
}
