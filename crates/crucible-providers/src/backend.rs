use async_trait::async_trait;
use futures::stream::BoxStream;

use crucible_core::{CallFailure, ModelCallRequest};

/// Incremental chunks produced by a backend. An `Err` item ends the stream.
pub type ChunkStream = BoxStream<'static, Result<String, CallFailure>>;

/// Transport used by the model gateway to reach a chat-completion endpoint.
///
/// Implementations never retry and never consult the concurrency gate; the
/// gateway admits a call before handing it to the backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Sends a request and returns the full completion text.
    ///
    /// # Errors
    /// Returns a classified failure for transport or endpoint problems.
    async fn complete(&self, request: &ModelCallRequest) -> Result<String, CallFailure>;

    /// Sends a request and returns its chunks as they arrive.
    ///
    /// # Errors
    /// Returns a classified failure if the stream could not be opened.
    async fn open_stream(&self, request: &ModelCallRequest) -> Result<ChunkStream, CallFailure>;
}
