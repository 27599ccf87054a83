use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crucible_core::{CallFailure, CallOptions, ChatMessage};
use crucible_providers::ModelGateway;

use crate::augment::PromptAugmenter;
use crate::traits::TaskWorker;

/// Worker role: augments the prompt and asks the worker model for an answer.
pub struct Worker {
    gateway: Arc<ModelGateway>,
    augmenter: PromptAugmenter,
    model_id: String,
}

impl Worker {
    /// Creates a worker using `model_id` through `gateway`.
    pub fn new(
        gateway: Arc<ModelGateway>,
        augmenter: PromptAugmenter,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            augmenter,
            model_id: model_id.into(),
        }
    }
}

#[async_trait]
impl TaskWorker for Worker {
    async fn respond(
        &self,
        task_prompt: &str,
        history: &[ChatMessage],
    ) -> Result<String, CallFailure> {
        let effective_prompt = self.augmenter.augment(task_prompt).await;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(effective_prompt));

        debug!(
            model = %self.model_id,
            history = history.len(),
            "Worker requesting response"
        );
        self.gateway
            .complete(&self.model_id, messages, CallOptions::default())
            .await
    }
}
