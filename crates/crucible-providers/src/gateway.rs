//! The single entry point for model calls.
//!
//! A [`ModelGateway`] is built once at startup and shared by `Arc`. Every call
//! is admitted through the [`ConcurrencyGate`] before exactly one request is
//! dispatched to the backend. Nothing here retries.

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, StreamExt as _};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, warn};

use crucible_core::{
    CallDefaults, CallFailure, CallOptions, ChatMessage, CrucibleConfig, FailureKind,
    ModelCallRequest, Result as CoreResult,
};

use crate::backend::{ChatBackend, ChunkStream};
use crate::gate::ConcurrencyGate;
use crate::openai::OpenAiCompatibleClient;

/// Lazily admitted, finite sequence of text chunks.
///
/// Failures end the sequence early instead of being yielded.
pub type TextStream = BoxStream<'static, String>;

/// Result of one gateway call.
pub enum ModelCallOutcome {
    /// Full completion text of a non-streaming call.
    Text(String),
    /// Chunks of a streaming call.
    Stream(TextStream),
    /// The call failed.
    Failure(CallFailure),
}

impl ModelCallOutcome {
    /// Converts the outcome into text, draining a stream if necessary.
    ///
    /// # Errors
    /// Returns the failure of a failed call.
    pub async fn into_text(self) -> Result<String, CallFailure> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Stream(chunks) => Ok(chunks.collect::<Vec<_>>().await.concat()),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl fmt::Debug for ModelCallOutcome {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => formatter.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => formatter.write_str("Stream(..)"),
            Self::Failure(failure) => formatter.debug_tuple("Failure").field(failure).finish(),
        }
    }
}

/// Bounded-concurrency access to the remote chat endpoint.
pub struct ModelGateway {
    /// Transport; `None` when no credential was configured.
    backend: Option<Arc<dyn ChatBackend>>,
    /// Admission control shared by every call.
    gate: ConcurrencyGate,
    /// Temperature and token budget for calls that do not override them.
    defaults: CallDefaults,
}

impl ModelGateway {
    /// Creates a gateway dispatching to `backend`.
    pub fn new(backend: Arc<dyn ChatBackend>, gate: ConcurrencyGate, defaults: CallDefaults) -> Self {
        Self {
            backend: Some(backend),
            gate,
            defaults,
        }
    }

    /// Creates a gateway whose every call fails with `not_configured`.
    pub fn unconfigured(gate: ConcurrencyGate, defaults: CallDefaults) -> Self {
        Self {
            backend: None,
            gate,
            defaults,
        }
    }

    /// Builds the production gateway from configuration.
    ///
    /// A missing credential is not an error: the gateway is built disabled and
    /// a warning is logged.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &CrucibleConfig) -> CoreResult<Self> {
        let gate = ConcurrencyGate::from_configured(config.execution.max_concurrent_calls);
        let defaults = config.models.call_defaults();

        let Some(api_key) = config.api_key() else {
            warn!(
                env = %config.endpoint.api_key_env,
                "No API key configured; model calls will fail with not_configured"
            );
            return Ok(Self::unconfigured(gate, defaults));
        };

        let client = OpenAiCompatibleClient::new(
            &config.endpoint.base_url,
            api_key,
            Duration::from_secs(config.endpoint.request_timeout_seconds),
        )?;
        debug!(endpoint = client.endpoint(), "Model gateway configured");

        Ok(Self::new(Arc::new(client), gate, defaults))
    }

    /// Whether a backend is available.
    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    /// The admission gate shared by all calls.
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Performs one model call.
    ///
    /// Non-streaming calls wait for admission, dispatch, and release the slot
    /// before returning. Streaming calls return immediately; admission happens
    /// on the first poll and the slot is held until the stream ends or is dropped.
    pub async fn call(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> ModelCallOutcome {
        let Some(backend) = &self.backend else {
            return ModelCallOutcome::Failure(CallFailure::not_configured());
        };

        let request = ModelCallRequest::resolve(model_id, messages, options, self.defaults);
        if request.streaming {
            return ModelCallOutcome::Stream(admitted_stream(
                self.gate.clone(),
                Arc::clone(backend),
                request,
            ));
        }

        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(failure) => return ModelCallOutcome::Failure(failure),
        };
        debug!(
            model = %request.model_id,
            backend = backend.name(),
            messages = request.messages.len(),
            "Dispatching model call"
        );
        let result = backend.complete(&request).await;
        drop(permit);

        match result {
            Ok(text) if text.is_empty() => {
                warn!(model = %request.model_id, "Model returned an empty response");
                ModelCallOutcome::Failure(CallFailure::new(
                    FailureKind::EmptyResponse,
                    format!("model {} returned no content", request.model_id),
                ))
            }
            Ok(text) => ModelCallOutcome::Text(text),
            Err(failure) => {
                warn!(
                    model = %request.model_id,
                    category = %failure.kind.category(),
                    "Model call failed: {failure}"
                );
                ModelCallOutcome::Failure(failure)
            }
        }
    }

    /// Non-streaming call returning the text directly.
    ///
    /// # Errors
    /// Returns the classified failure of the call.
    pub async fn complete(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> Result<String, CallFailure> {
        let options = CallOptions {
            streaming: false,
            ..options
        };
        self.call(model_id, messages, options).await.into_text().await
    }

    /// Streaming call.
    pub async fn stream(
        &self,
        model_id: &str,
        messages: Vec<ChatMessage>,
        options: CallOptions,
    ) -> ModelCallOutcome {
        let options = CallOptions {
            streaming: true,
            ..options
        };
        self.call(model_id, messages, options).await
    }
}

/// Progress of a streaming call.
enum StreamPhase {
    /// Not yet admitted.
    Pending {
        gate: ConcurrencyGate,
        backend: Arc<dyn ChatBackend>,
        request: ModelCallRequest,
    },
    /// Admitted and producing chunks; the permit lives as long as this phase.
    Active {
        chunks: ChunkStream,
        permit: OwnedSemaphorePermit,
        model_id: String,
    },
}

/// Wraps a backend stream with lazy admission and early termination on failure.
fn admitted_stream(
    gate: ConcurrencyGate,
    backend: Arc<dyn ChatBackend>,
    request: ModelCallRequest,
) -> TextStream {
    let initial = StreamPhase::Pending {
        gate,
        backend,
        request,
    };

    stream::unfold(initial, |mut phase| async move {
        loop {
            match phase {
                StreamPhase::Pending {
                    gate,
                    backend,
                    request,
                } => {
                    let permit = match gate.acquire().await {
                        Ok(permit) => permit,
                        Err(failure) => {
                            warn!(model = %request.model_id, "Stream admission failed: {failure}");
                            return None;
                        }
                    };
                    debug!(model = %request.model_id, backend = backend.name(), "Opening model stream");
                    match backend.open_stream(&request).await {
                        Ok(chunks) => {
                            phase = StreamPhase::Active {
                                chunks,
                                permit,
                                model_id: request.model_id,
                            };
                        }
                        Err(failure) => {
                            warn!(model = %request.model_id, "Failed to open stream: {failure}");
                            return None;
                        }
                    }
                }
                StreamPhase::Active {
                    mut chunks,
                    permit,
                    model_id,
                } => match chunks.next().await {
                    Some(Ok(chunk)) if chunk.is_empty() => {
                        phase = StreamPhase::Active {
                            chunks,
                            permit,
                            model_id,
                        };
                    }
                    Some(Ok(chunk)) => {
                        return Some((
                            chunk,
                            StreamPhase::Active {
                                chunks,
                                permit,
                                model_id,
                            },
                        ));
                    }
                    Some(Err(failure)) => {
                        warn!(model = %model_id, "Stream ended early: {failure}");
                        return None;
                    }
                    None => return None,
                },
            }
        }
    })
    .fuse()
    .boxed()
}
