use std::collections::VecDeque;
use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt as _};
use reqwest::{Client, Error as ReqwestError, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use crucible_core::{CallFailure, Error, FailureKind, ModelCallRequest, Result as CoreResult};

use crate::backend::{ChatBackend, ChunkStream};

/// Path appended to the configured base URL.
const COMPLETIONS_PATH: &str = "/chat/completions";
/// SSE payload marking the end of a stream.
const STREAM_DONE: &str = "[DONE]";

/// Client for any endpoint speaking the OpenAI `/chat/completions` format.
pub struct OpenAiCompatibleClient {
    /// HTTP client carrying the request timeout.
    client: Client,
    /// Full completions URL.
    endpoint: String,
    /// Bearer credential.
    api_key: String,
}

impl OpenAiCompatibleClient {
    /// Creates a client for `base_url` with the given credential and timeout.
    ///
    /// # Errors
    /// Returns an error if the API key is empty or the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::MissingApiKey("endpoint api_key".to_owned()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{COMPLETIONS_PATH}", base_url.trim_end_matches('/')),
            api_key,
        })
    }

    /// Completions URL this client posts to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the JSON request body.
    fn request_body(request: &ModelCallRequest) -> Value {
        json!({
            "model": request.model_id,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": request.streaming,
        })
    }

    /// Posts the request and checks the status code.
    async fn send(&self, request: &ModelCallRequest) -> Result<Response, CallFailure> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallFailure::from_status(status.as_u16(), body.trim()));
        }

        Ok(response)
    }
}

/// Maps a reqwest error onto the failure taxonomy.
fn classify_transport(err: &ReqwestError) -> CallFailure {
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if err.is_connect() {
        FailureKind::ConnectionError
    } else if let Some(status) = err.status() {
        return CallFailure::from_status(status.as_u16(), &err.to_string());
    } else {
        FailureKind::Unexpected
    };
    CallFailure::new(kind, err.to_string())
}

/// Non-streaming response payload.
#[derive(Deserialize)]
struct ChatCompletion {
    /// Generated choices; only the first is used.
    choices: Vec<CompletionChoice>,
}

/// One non-streaming choice.
#[derive(Deserialize)]
struct CompletionChoice {
    /// Completed message.
    message: CompletionMessage,
}

/// Message content of a non-streaming choice.
#[derive(Deserialize)]
struct CompletionMessage {
    /// Text, absent for tool-only answers.
    content: Option<String>,
}

/// One SSE `data:` payload.
#[derive(Deserialize)]
struct StreamChunk {
    /// Choices carrying deltas.
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

/// One streaming choice.
#[derive(Deserialize)]
struct StreamChoice {
    /// Incremental content.
    #[serde(default)]
    delta: Option<StreamDelta>,
}

/// Incremental content of a streaming choice.
#[derive(Deserialize)]
struct StreamDelta {
    /// Text added by this chunk.
    content: Option<String>,
}

/// Event decoded from an SSE line.
#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    /// Text to forward.
    Delta(String),
    /// End of stream marker.
    Done,
}

/// Splits raw SSE bytes into `data:` events.
///
/// Bytes are buffered until a full line is available so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds bytes and returns every event completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<SseEvent, CallFailure>> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing line that was not newline-terminated.
    fn finish(&mut self) -> Option<Result<SseEvent, CallFailure>> {
        let rest = mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

/// Decodes one SSE line. Comments, blank lines and non-data fields yield nothing.
fn parse_line(line: &str) -> Option<Result<SseEvent, CallFailure>> {
    let payload = line.trim().strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == STREAM_DONE {
        return Some(Ok(SseEvent::Done));
    }

    let chunk = match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk,
        Err(err) => {
            return Some(Err(CallFailure::new(
                FailureKind::Unexpected,
                format!("Undecodable stream chunk: {err}"),
            )));
        }
    };

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.and_then(|delta| delta.content))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(Ok(SseEvent::Delta(text)))
    }
}

/// Raw body chunks with transport errors already classified.
type ByteStream = stream::BoxStream<'static, Result<Vec<u8>, CallFailure>>;

/// State threaded through the decoding stream.
struct DecodeState {
    bytes: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, CallFailure>>,
    finished: bool,
}

impl DecodeState {
    /// Queues the events decoded from `events`, stopping at the first terminal one.
    fn queue(&mut self, events: Vec<Result<SseEvent, CallFailure>>) {
        for event in events {
            match event {
                Ok(SseEvent::Delta(text)) => self.pending.push_back(Ok(text)),
                Ok(SseEvent::Done) => {
                    self.finished = true;
                    return;
                }
                Err(failure) => {
                    self.pending.push_back(Err(failure));
                    self.finished = true;
                    return;
                }
            }
        }
    }
}

/// Turns an SSE response body into text chunks.
///
/// The stream ends after `data: [DONE]`, at end of body, or right after the
/// first failure item.
fn decode_sse(response: Response) -> ChunkStream {
    let bytes = response
        .bytes_stream()
        .map(|item| {
            item.map(|chunk| chunk.to_vec())
                .map_err(|err| classify_transport(&err))
        })
        .boxed();
    decode_byte_stream(bytes)
}

/// Decodes already-classified body chunks.
fn decode_byte_stream(bytes: ByteStream) -> ChunkStream {
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.queue(events);
                }
                Some(Err(failure)) => {
                    state.pending.push_back(Err(failure));
                    state.finished = true;
                }
                None => {
                    let trailing = state.decoder.finish().into_iter().collect();
                    state.queue(trailing);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleClient {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn complete(&self, request: &ModelCallRequest) -> Result<String, CallFailure> {
        let response = self.send(request).await?;
        let completion: ChatCompletion = response.json().await.map_err(|err| {
            if err.is_timeout() {
                CallFailure::new(FailureKind::Timeout, err.to_string())
            } else {
                CallFailure::new(
                    FailureKind::Unexpected,
                    format!("Failed to parse response: {err}"),
                )
            }
        })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default())
    }

    async fn open_stream(&self, request: &ModelCallRequest) -> Result<ChunkStream, CallFailure> {
        let response = self.send(request).await?;
        Ok(decode_sse(response))
    }
}
