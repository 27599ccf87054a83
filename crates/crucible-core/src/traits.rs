use async_trait::async_trait;

use crate::FetchError;

/// Retrieves the text behind a URL.
///
/// Implementations enforce their own timeout and report every problem as a
/// [`FetchError`] rather than panicking.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Fetches the text content of `url`.
    ///
    /// # Errors
    ///
    /// Returns an error for non-success statuses, timeouts, network failures,
    /// or any other problem reading the response.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}
