use async_trait::async_trait;

use crucible_core::{CallFailure, ChatMessage, EvaluationVerdict, Rubric};

/// Produces candidate answers for a task.
#[async_trait]
pub trait TaskWorker: Send + Sync {
    /// Answers `task_prompt` given the prior conversation.
    ///
    /// # Errors
    /// Returns the failure of the underlying model call; nothing is retried.
    async fn respond(
        &self,
        task_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, CallFailure>;
}

/// Judges candidate answers against a rubric.
#[async_trait]
pub trait TaskEvaluator: Send + Sync {
    /// Model identifier recorded in evaluation log entries.
    fn model_id(&self) -> &str;

    /// Judges `worker_response` as an answer to `original_prompt`.
    ///
    /// Never fails: problems obtaining a judgement yield an `error` verdict.
    async fn evaluate(
        &self,
        original_prompt: &str,
        worker_response: &str,
        rubric: &Rubric,
    ) -> EvaluationVerdict;
}
