//! Model gateway and content fetching for the crucible refinement loop.
//!
//! Every model call goes through [`ModelGateway`], which owns the process-wide
//! [`ConcurrencyGate`] and a [`ChatBackend`]. The production backend speaks the
//! OpenAI-compatible `/chat/completions` wire format; [`ScriptedBackend`] is an
//! in-memory stand-in for tests.

/// Backend seam between the gateway and a concrete transport.
pub mod backend;
/// HTTP implementation of the content fetcher.
pub mod fetch;
/// Bounded admission for model calls.
pub mod gate;
/// The model gateway itself.
pub mod gateway;
/// Scripted backend for tests.
pub mod mock;
/// OpenAI-compatible chat-completion client.
pub mod openai;

pub use backend::{ChatBackend, ChunkStream};
pub use fetch::HttpContentFetcher;
pub use gate::ConcurrencyGate;
pub use gateway::{ModelCallOutcome, ModelGateway, TextStream};
pub use mock::{ScriptedBackend, ScriptedReply};
pub use openai::OpenAiCompatibleClient;
