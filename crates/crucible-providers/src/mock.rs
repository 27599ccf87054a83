//! Scripted backend for testing gateway and agent behaviour.
//!
//! Replies are chosen from a queue, then from substring patterns matched
//! against the last user message, then from a default. Every request is
//! recorded, and the number of concurrently running calls is tracked so tests
//! can check the gateway's admission limit.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt as _};
use tokio::time::sleep;

use crucible_core::{CallFailure, IgnoreLock as _, ModelCallRequest, Role};

use crate::backend::{ChatBackend, ChunkStream};

/// What the scripted backend answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// A complete text reply.
    Text(String),
    /// A reply delivered as separate chunks when streamed.
    Chunks(Vec<String>),
    /// Some chunks followed by a mid-stream failure.
    ChunksThenFail(Vec<String>, CallFailure),
    /// An immediate failure.
    Fail(CallFailure),
}

impl ScriptedReply {
    /// Reply as a non-streaming call sees it.
    fn into_complete(self) -> Result<String, CallFailure> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Chunks(chunks) => Ok(chunks.concat()),
            Self::ChunksThenFail(_, failure) | Self::Fail(failure) => Err(failure),
        }
    }

    /// Reply as a streaming call sees it.
    fn into_stream(self) -> Result<ChunkStream, CallFailure> {
        let items: Vec<Result<String, CallFailure>> = match self {
            Self::Text(text) => text
                .split_inclusive(' ')
                .map(|piece| Ok(piece.to_owned()))
                .collect(),
            Self::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            Self::ChunksThenFail(chunks, failure) => chunks
                .into_iter()
                .map(Ok)
                .chain([Err(failure)])
                .collect(),
            Self::Fail(failure) => return Err(failure),
        };
        Ok(stream::iter(items).boxed())
    }
}

/// Shared bookkeeping behind a [`ScriptedBackend`].
#[derive(Default)]
struct Script {
    /// Replies consumed in order before anything else.
    queue: Mutex<VecDeque<ScriptedReply>>,
    /// `(pattern, reply)` pairs, checked in insertion order.
    patterns: Mutex<Vec<(String, ScriptedReply)>>,
    /// Reply when nothing else matches.
    default_reply: Mutex<Option<ScriptedReply>>,
    /// Every request received.
    calls: Mutex<Vec<ModelCallRequest>>,
    /// Simulated latency of each call.
    delay: Mutex<Duration>,
    /// Calls currently inside `complete`.
    in_flight: AtomicUsize,
    /// Highest value `in_flight` reached.
    peak: AtomicUsize,
}

/// Decrements the in-flight counter when a call finishes or is cancelled.
struct InFlight<'script> {
    script: &'script Script,
}

impl<'script> InFlight<'script> {
    fn enter(script: &'script Script) -> Self {
        let now = script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        script.peak.fetch_max(now, Ordering::SeqCst);
        Self { script }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.script.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Backend returning pre-defined replies without any network access.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Script>,
}

impl ScriptedBackend {
    /// Creates a backend with no replies configured.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers with `response` when the last user message contains `pattern`.
    #[must_use]
    pub fn with_response(self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.with_reply(pattern, ScriptedReply::Text(response.into()))
    }

    /// Answers with `reply` when the last user message contains `pattern`.
    #[must_use]
    pub fn with_reply(self, pattern: impl Into<String>, reply: ScriptedReply) -> Self {
        self.script
            .patterns
            .with_lock(|patterns| patterns.push((pattern.into(), reply)));
        self
    }

    /// Queues a reply consumed by the next call, ahead of patterns.
    #[must_use]
    pub fn then_reply(self, reply: ScriptedReply) -> Self {
        self.script.queue.with_lock(|queue| queue.push_back(reply));
        self
    }

    /// Sets the text returned when nothing else matches.
    #[must_use]
    pub fn with_default_response(self, response: impl Into<String>) -> Self {
        self.with_default_reply(ScriptedReply::Text(response.into()))
    }

    /// Sets the reply returned when nothing else matches.
    #[must_use]
    pub fn with_default_reply(self, reply: ScriptedReply) -> Self {
        *self.script.default_reply.lock_ignore_poison() = Some(reply);
        self
    }

    /// Makes every call take `delay` before answering.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.script.delay.lock_ignore_poison() = delay;
        self
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<ModelCallRequest> {
        self.script.calls.lock_ignore_poison().clone()
    }

    /// Number of requests received.
    pub fn call_count(&self) -> usize {
        self.script.calls.lock_ignore_poison().len()
    }

    /// Forgets recorded requests.
    pub fn clear_history(&self) {
        self.script.calls.lock_ignore_poison().clear();
    }

    /// Highest number of calls that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.script.peak.load(Ordering::SeqCst)
    }

    /// Records the request and picks its reply.
    fn next_reply(&self, request: &ModelCallRequest) -> ScriptedReply {
        self.script
            .calls
            .with_lock(|calls| calls.push(request.clone()));

        if let Some(reply) = self.script.queue.with_lock(VecDeque::pop_front) {
            return reply;
        }

        let prompt = request
            .messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map_or("", |message| message.content.as_str());

        let matched = self.script.patterns.with_lock(|patterns| {
            patterns
                .iter()
                .find(|(pattern, _)| prompt.contains(pattern.as_str()))
                .map(|(_, reply)| reply.clone())
        });
        if let Some(reply) = matched {
            return reply;
        }

        self.script
            .default_reply
            .lock_ignore_poison()
            .clone()
            .unwrap_or_else(|| ScriptedReply::Text(format!("Scripted response to: {prompt}")))
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, request: &ModelCallRequest) -> Result<String, CallFailure> {
        let _running = InFlight::enter(&self.script);
        let reply = self.next_reply(request);
        let delay = *self.script.delay.lock_ignore_poison();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        reply.into_complete()
    }

    async fn open_stream(&self, request: &ModelCallRequest) -> Result<ChunkStream, CallFailure> {
        self.next_reply(request).into_stream()
    }
}
