//! Shared fixtures for agent integration tests.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use std::sync::Arc;

use async_trait::async_trait;
use crucible_agent::{Evaluator, PromptAugmenter, RefinementOrchestrator, Worker};
use crucible_core::{CallDefaults, ContentFetcher, FetchError, Rubric};
use crucible_providers::{ConcurrencyGate, ModelGateway, ScriptedBackend};
use serde_json::{Map, Value, json};

/// Fetcher that serves a fixed body for every URL.
pub struct StaticFetcher(pub Result<String, FetchError>);

#[async_trait]
impl ContentFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        self.0.clone()
    }
}

/// Everything needed to drive the real worker and evaluator through scripted backends.
pub struct Harness {
    pub worker_backend: ScriptedBackend,
    pub evaluator_backend: ScriptedBackend,
    pub gate: ConcurrencyGate,
    pub orchestrator: Arc<RefinementOrchestrator>,
}

impl Harness {
    /// Builds a harness whose two gateways share one gate.
    pub fn new(
        worker_backend: ScriptedBackend,
        evaluator_backend: ScriptedBackend,
        capacity: usize,
        max_iterations: u32,
    ) -> Self {
        Self::with_fetcher(
            worker_backend,
            evaluator_backend,
            capacity,
            max_iterations,
            Arc::new(StaticFetcher(Ok("fetched page".to_owned()))),
        )
    }

    /// Same as [`Harness::new`] with a custom content fetcher.
    pub fn with_fetcher(
        worker_backend: ScriptedBackend,
        evaluator_backend: ScriptedBackend,
        capacity: usize,
        max_iterations: u32,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        let gate = ConcurrencyGate::new(capacity);
        let worker_gateway = Arc::new(ModelGateway::new(
            Arc::new(worker_backend.clone()),
            gate.clone(),
            CallDefaults::default(),
        ));
        let evaluator_gateway = Arc::new(ModelGateway::new(
            Arc::new(evaluator_backend.clone()),
            gate.clone(),
            CallDefaults::default(),
        ));

        let worker = Worker::new(
            worker_gateway,
            PromptAugmenter::new(fetcher, 4000),
            "worker-model",
        );
        let evaluator = Evaluator::new(evaluator_gateway, "evaluator-model");
        let orchestrator = RefinementOrchestrator::new(
            Arc::new(worker),
            Arc::new(evaluator),
            Arc::new(Rubric::default()),
            max_iterations,
        )
        .expect("orchestrator should build");

        Self {
            worker_backend,
            evaluator_backend,
            gate,
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Evaluator reply passing every default criterion.
pub fn approval_json() -> String {
    verdict_json(true, "approved", "")
}

/// Evaluator reply failing one criterion with the given feedback.
pub fn rejection_json(feedback: &str) -> String {
    verdict_json(false, "rejected", feedback)
}

fn verdict_json(all_pass: bool, status: &str, feedback: &str) -> String {
    let mut assessments = Map::new();
    for (index, id) in Rubric::default().ids().enumerate() {
        let passed = all_pass || index > 0;
        assessments.insert(
            id.to_owned(),
            json!({"passed": passed, "reasoning": "checked"}),
        );
    }
    let reply = json!({
        "assessments": Value::Object(assessments),
        "status": status,
        "feedback": feedback,
    });
    format!("```json\n{reply}\n```")
}
